//! Grouping of flat evaluation records into per-policy aggregates
//!
//! The policy engine reports one record per (policy, attestation) pair.
//! Reports are organised per policy, failing policies first, so records are
//! grouped by policy URI, given an aggregate status and sorted.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::labels::{self, LabelMatcherSet};
use super::types::PolicyEvaluation;
use crate::error::{Error, Result};
use crate::report::last_segment;
use crate::statement;

/// Outcome of evaluating a policy.
///
/// Variant order is the display order: failures sort first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EvaluationStatus {
    Unsatisfied,
    Satisfied,
    NotApplicable,
}

impl EvaluationStatus {
    pub fn icon(self) -> &'static str {
        match self {
            EvaluationStatus::Satisfied => "✅",
            EvaluationStatus::Unsatisfied => "❌",
            EvaluationStatus::NotApplicable => "N/A",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EvaluationStatus::Satisfied => "SATISFIED",
            EvaluationStatus::Unsatisfied => "UNSATISFIED",
            EvaluationStatus::NotApplicable => "NOT_APPLICABLE",
        }
    }
}

impl fmt::Display for EvaluationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvaluationStatus {
    type Err = Error;

    /// Case-insensitive; anything unknown is a contract breach by the engine
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "satisfied" => Ok(EvaluationStatus::Satisfied),
            "unsatisfied" => Ok(EvaluationStatus::Unsatisfied),
            "not-applicable" | "not_applicable" => Ok(EvaluationStatus::NotApplicable),
            _ => Err(Error::UnknownEvaluationStatus(s.to_string())),
        }
    }
}

/// Policy identity shared by every record of a group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    pub uri: String,

    /// Last path segment of the URI
    pub name: String,

    /// Second-to-last path segment of the URI
    pub type_: String,

    pub description: Option<String>,
    pub remediation: Option<String>,
    pub labels: BTreeMap<String, String>,
}

/// One record after normalization
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationResult {
    pub status: EvaluationStatus,
    pub attestation_uri: Option<String>,
    pub predicate_type: Option<String>,
    pub build_scan_uri: Option<String>,

    /// Details without the description/remediation keys
    pub details: serde_json::Map<String, serde_json::Value>,

    pub envelope: Option<serde_json::Value>,
}

impl EvaluationResult {
    /// Trailing segment of the attestation URI, or `N/A`
    pub fn attestation_name(&self) -> &str {
        self.attestation_uri
            .as_deref()
            .filter(|uri| !uri.is_empty())
            .map(last_segment)
            .unwrap_or("N/A")
    }
}

/// All evaluations of one policy
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyAggregate {
    pub policy: Policy,
    pub evaluations: Vec<EvaluationResult>,
    pub status: EvaluationStatus,

    /// Set when the policy's labels match an ignore set
    pub ignored: bool,
}

impl PolicyAggregate {
    fn new(policy: Policy, evaluations: Vec<EvaluationResult>) -> Self {
        let status = evaluations
            .iter()
            .map(|e| e.status)
            .min()
            .unwrap_or(EvaluationStatus::NotApplicable);
        Self {
            policy,
            evaluations,
            status,
            ignored: false,
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &EvaluationResult> {
        self.with_status(EvaluationStatus::Unsatisfied)
    }

    pub fn successes(&self) -> impl Iterator<Item = &EvaluationResult> {
        self.with_status(EvaluationStatus::Satisfied)
    }

    fn with_status(&self, status: EvaluationStatus) -> impl Iterator<Item = &EvaluationResult> {
        self.evaluations.iter().filter(move |e| e.status == status)
    }

    /// Satisfied evaluations
    pub fn passed(&self) -> usize {
        self.successes().count()
    }

    /// Evaluations that applied; not-applicable ones are left out
    pub fn evaluated(&self) -> usize {
        self.passed() + self.failures().count()
    }

    /// Failing and not ignored
    pub fn is_blocking(&self) -> bool {
        self.status == EvaluationStatus::Unsatisfied && !self.ignored
    }
}

/// Accumulates one group while records are read
struct Group {
    uri: String,
    policy_type: Option<String>,
    labels: BTreeMap<String, String>,
    description: Option<String>,
    remediation: Option<String>,
    failing_description: Option<String>,
    failing_remediation: Option<String>,
    evaluations: Vec<EvaluationResult>,
}

impl Group {
    fn new(record: &PolicyEvaluation) -> Self {
        Self {
            uri: record.policy_uri.clone(),
            policy_type: record.policy_type.clone(),
            labels: record.labels.clone(),
            description: None,
            remediation: None,
            failing_description: None,
            failing_remediation: None,
            evaluations: Vec::new(),
        }
    }

    fn push(&mut self, record: &PolicyEvaluation, status: EvaluationStatus) {
        let description = text_field(record.policy_description.as_ref(), &record.details, "description");
        let remediation = text_field(record.policy_remediation.as_ref(), &record.details, "remediation");

        if status == EvaluationStatus::Unsatisfied {
            // the last failing record that carries a value wins
            if description.is_some() {
                self.failing_description = description.clone();
            }
            if remediation.is_some() {
                self.failing_remediation = remediation.clone();
            }
        }
        if self.description.is_none() {
            self.description = description;
        }
        if self.remediation.is_none() {
            self.remediation = remediation;
        }

        let mut details = record.details.clone();
        details.remove("description");
        details.remove("remediation");

        let build_scan_uri = record
            .sourced_from_uri
            .clone()
            .filter(|uri| !uri.is_empty())
            .or_else(|| {
                record
                    .envelope
                    .as_ref()
                    .and_then(statement::decode)
                    .and_then(|s| s.build_scan_uri().map(str::to_string))
            });

        self.evaluations.push(EvaluationResult {
            status,
            attestation_uri: record.attestation_store_uri.clone(),
            predicate_type: record.predicate_type.clone(),
            build_scan_uri,
            details,
            envelope: record.envelope.clone(),
        });
    }

    fn finish(self) -> PolicyAggregate {
        let segments: Vec<&str> = self.uri.split('/').collect();
        let name = segments.last().copied().unwrap_or_default().to_string();
        let type_ = segments
            .len()
            .checked_sub(2)
            .and_then(|i| segments.get(i))
            .map(|s| s.to_string())
            .or(self.policy_type)
            .unwrap_or_else(|| "N/A".to_string());

        let policy = Policy {
            name,
            type_,
            description: self.failing_description.or(self.description),
            remediation: self.failing_remediation.or(self.remediation),
            labels: self.labels,
            uri: self.uri,
        };
        PolicyAggregate::new(policy, self.evaluations)
    }
}

fn text_field(
    explicit: Option<&String>,
    details: &serde_json::Map<String, serde_json::Value>,
    key: &str,
) -> Option<String> {
    explicit
        .filter(|s| !s.is_empty())
        .cloned()
        .or_else(|| details.get(key).and_then(|v| v.as_str()).map(str::to_string))
        .filter(|s| !s.is_empty())
}

/// Group records by policy URI and sort the groups failures first, then by
/// URI. Fails on the first record with an unknown status.
pub fn aggregate(records: &[PolicyEvaluation]) -> Result<Vec<PolicyAggregate>> {
    let mut groups: Vec<Group> = Vec::new();
    let mut index: BTreeMap<&str, usize> = BTreeMap::new();

    for record in records {
        let status: EvaluationStatus = record.status.parse()?;

        let slot = *index.entry(record.policy_uri.as_str()).or_insert_with(|| {
            groups.push(Group::new(record));
            groups.len() - 1
        });
        groups[slot].push(record, status);
    }

    let mut aggregates: Vec<PolicyAggregate> = groups.into_iter().map(Group::finish).collect();
    sort(&mut aggregates);
    Ok(aggregates)
}

/// Stable sort by (status, policy URI)
pub fn sort(aggregates: &mut [PolicyAggregate]) {
    aggregates.sort_by(|a, b| {
        a.status
            .cmp(&b.status)
            .then_with(|| a.policy.uri.cmp(&b.policy.uri))
    });
}

/// Flag aggregates whose labels match any ignore set
pub fn apply_ignores(aggregates: &mut [PolicyAggregate], ignore: &[LabelMatcherSet]) {
    for aggregate in aggregates.iter_mut() {
        aggregate.ignored = labels::any_matches(ignore, &aggregate.policy.labels);
    }
}

/// Overall verdict: unsatisfied iff some non-ignored policy failed
pub fn verdict(aggregates: &[PolicyAggregate]) -> EvaluationStatus {
    if aggregates.iter().any(PolicyAggregate::is_blocking) {
        EvaluationStatus::Unsatisfied
    } else {
        EvaluationStatus::Satisfied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(policy_uri: &str, status: &str, attestation: &str) -> PolicyEvaluation {
        serde_json::from_value(json!({
            "policyUri": policy_uri,
            "attestationStoreUri": format!("https://store/attestations/{}", attestation),
            "status": status,
        }))
        .unwrap()
    }

    fn with_text(mut r: PolicyEvaluation, description: &str, remediation: &str) -> PolicyEvaluation {
        r.policy_description = Some(description.into());
        r.policy_remediation = Some(remediation.into());
        r
    }

    #[test]
    fn test_status_parsing_is_case_insensitive() {
        assert_eq!("Unsatisfied".parse::<EvaluationStatus>().unwrap(), EvaluationStatus::Unsatisfied);
        assert_eq!("SATISFIED".parse::<EvaluationStatus>().unwrap(), EvaluationStatus::Satisfied);
        assert_eq!("Not-Applicable".parse::<EvaluationStatus>().unwrap(), EvaluationStatus::NotApplicable);
    }

    #[test]
    fn test_unknown_status_aborts() {
        let records = vec![record("p/a", "satisfied", "1"), record("p/b", "MAYBE", "2")];
        match aggregate(&records) {
            Err(Error::UnknownEvaluationStatus(s)) => assert_eq!(s, "MAYBE"),
            other => panic!("expected unknown status error, got {:?}", other),
        }
    }

    #[test]
    fn test_mixed_outcomes_make_a_failed_policy() {
        let records = vec![
            record("https://x/policies/slsa/require-tests", "satisfied", "a.json"),
            record("https://x/policies/slsa/require-tests", "unsatisfied", "b.json"),
        ];
        let aggregates = aggregate(&records).unwrap();

        assert_eq!(aggregates.len(), 1);
        let agg = &aggregates[0];
        assert_eq!(agg.status, EvaluationStatus::Unsatisfied);
        assert_eq!((agg.passed(), agg.evaluated()), (1, 2));
        assert_eq!(agg.policy.name, "require-tests");
        assert_eq!(agg.policy.type_, "slsa");
    }

    #[test]
    fn test_status_priority() {
        let records = vec![
            record("p/na", "not-applicable", "1"),
            record("p/na", "not-applicable", "2"),
            record("p/ok", "not-applicable", "1"),
            record("p/ok", "satisfied", "2"),
        ];
        let aggregates = aggregate(&records).unwrap();
        let na = aggregates.iter().find(|a| a.policy.uri == "p/na").unwrap();
        let ok = aggregates.iter().find(|a| a.policy.uri == "p/ok").unwrap();

        assert_eq!(na.status, EvaluationStatus::NotApplicable);
        assert_eq!(na.evaluated(), 0);
        assert_eq!(ok.status, EvaluationStatus::Satisfied);
        assert_eq!((ok.passed(), ok.evaluated()), (1, 1));

        // not-applicable never fails the verdict
        assert_eq!(verdict(&aggregates), EvaluationStatus::Satisfied);
    }

    #[test]
    fn test_every_record_lands_in_its_own_policy() {
        let records = vec![
            record("p/b", "satisfied", "1"),
            record("p/a", "satisfied", "1"),
            record("p/b", "unsatisfied", "2"),
            record("p/c", "not-applicable", "1"),
            record("p/a", "satisfied", "3"),
        ];
        let aggregates = aggregate(&records).unwrap();

        let total: usize = aggregates.iter().map(|a| a.evaluations.len()).sum();
        assert_eq!(total, records.len());
        for agg in &aggregates {
            let expected = records.iter().filter(|r| r.policy_uri == agg.policy.uri).count();
            assert_eq!(agg.evaluations.len(), expected);
        }
    }

    #[test]
    fn test_failures_first_then_uri() {
        let records = vec![
            record("p/z-ok", "satisfied", "1"),
            record("p/na", "not-applicable", "1"),
            record("p/b-fail", "unsatisfied", "1"),
            record("p/a-ok", "satisfied", "1"),
            record("p/c-fail", "unsatisfied", "1"),
        ];
        let mut aggregates = aggregate(&records).unwrap();
        let order: Vec<&str> = aggregates.iter().map(|a| a.policy.uri.as_str()).collect();
        assert_eq!(order, ["p/b-fail", "p/c-fail", "p/a-ok", "p/z-ok", "p/na"]);

        let before = aggregates.clone();
        sort(&mut aggregates);
        assert_eq!(aggregates, before);
    }

    #[test]
    fn test_empty_input_is_satisfied() {
        let aggregates = aggregate(&[]).unwrap();
        assert!(aggregates.is_empty());
        assert_eq!(verdict(&aggregates), EvaluationStatus::Satisfied);
    }

    #[test]
    fn test_failing_record_text_is_preferred() {
        let records = vec![
            with_text(record("p/a", "satisfied", "1"), "generic", "none"),
            with_text(record("p/a", "unsatisfied", "2"), "first failure", "fix one"),
            record("p/a", "unsatisfied", "3"),
            with_text(record("p/a", "unsatisfied", "4"), "last failure", "fix four"),
        ];
        let agg = &aggregate(&records).unwrap()[0];
        assert_eq!(agg.policy.description.as_deref(), Some("last failure"));
        assert_eq!(agg.policy.remediation.as_deref(), Some("fix four"));
    }

    #[test]
    fn test_first_description_when_nothing_failed() {
        let mut second = record("p/a", "satisfied", "2");
        second.details.insert("description".into(), json!("from details"));
        let records = vec![record("p/a", "satisfied", "1"), second];

        let agg = &aggregate(&records).unwrap()[0];
        assert_eq!(agg.policy.description.as_deref(), Some("from details"));
        assert!(agg.evaluations[1].details.is_empty());
    }

    #[test]
    fn test_ignored_policies_do_not_fail_the_verdict() {
        let mut failing = record("p/a", "unsatisfied", "1");
        failing.labels.insert("tier".into(), "experimental".into());
        let mut aggregates = aggregate(&[failing]).unwrap();
        assert_eq!(verdict(&aggregates), EvaluationStatus::Unsatisfied);

        let ignore = labels::parse_ignore_labels("tier=experimental").unwrap();
        apply_ignores(&mut aggregates, &ignore);
        assert!(aggregates[0].ignored);
        assert_eq!(aggregates[0].status, EvaluationStatus::Unsatisfied);
        assert_eq!(verdict(&aggregates), EvaluationStatus::Satisfied);
    }

    #[test]
    fn test_attestation_name() {
        let agg = &aggregate(&[record("p/a", "satisfied", "build.json")]).unwrap()[0];
        assert_eq!(agg.evaluations[0].attestation_name(), "build.json");

        let mut bare = record("p/a", "satisfied", "x");
        bare.attestation_store_uri = None;
        let agg = &aggregate(&[bare]).unwrap()[0];
        assert_eq!(agg.evaluations[0].attestation_name(), "N/A");
    }
}
