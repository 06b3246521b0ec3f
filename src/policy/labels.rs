//! Label matchers used to ignore policies when deciding the verdict
//!
//! Input text holds one matcher set per paragraph. Each non-blank line is a
//! comma-separated list of `key=value` clauses; all clauses of a set must
//! match, and any matching set excludes the policy.

use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// A single exact `key=value` requirement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMatcher {
    pub key: String,
    pub value: String,
}

impl LabelMatcher {
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        labels.get(&self.key) == Some(&self.value)
    }
}

/// Conjunction of matchers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMatcherSet {
    pub matchers: Vec<LabelMatcher>,
}

impl LabelMatcherSet {
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.matchers.iter().all(|m| m.matches(labels))
    }
}

/// True when any set matches the labels
pub fn any_matches(sets: &[LabelMatcherSet], labels: &BTreeMap<String, String>) -> bool {
    sets.iter().any(|set| set.matches(labels))
}

/// Parse the `ignore-policies-with-labels` input
pub fn parse_ignore_labels(text: &str) -> Result<Vec<LabelMatcherSet>> {
    let mut sets = Vec::new();
    let mut matchers = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !matchers.is_empty() {
                sets.push(LabelMatcherSet {
                    matchers: std::mem::take(&mut matchers),
                });
            }
            continue;
        }

        for clause in line.split(',') {
            matchers.push(parse_clause(clause)?);
        }
    }

    if !matchers.is_empty() {
        sets.push(LabelMatcherSet { matchers });
    }
    Ok(sets)
}

fn parse_clause(clause: &str) -> Result<LabelMatcher> {
    let parts: Vec<&str> = clause
        .trim()
        .split('=')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();

    match parts.as_slice() {
        [key, value] => Ok(LabelMatcher {
            key: key.to_string(),
            value: value.to_string(),
        }),
        _ => Err(Error::InvalidLabelMatcher(clause.trim().to_string())),
    }
}
