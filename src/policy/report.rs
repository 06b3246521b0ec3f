//! Step summary for policy scan evaluations
//!
//! Layout of a successful evaluation:
//! - header with the verdict, scan, optional enforcement point and subject
//! - one summary row per policy, failing policies linking to their details
//! - a "Failed Policies" section with every contributing evaluation
//! - a collapsed appendix listing all evaluation records

use tracing::warn;

use super::aggregate::{self, EvaluationResult, EvaluationStatus, PolicyAggregate};
use super::labels::LabelMatcherSet;
use super::types::{PolicyErrorResponse, PolicySubject, PolicySuccessResponse};
use crate::error::Result;
use crate::report::{self, ProblemDetails, ReportContext, Reporter, Verdict};
use crate::summary::{self, Cell, Row, Summary};

const HEADER_IMAGE: &str = "https://raw.githubusercontent.com/gradle/develocity-provenance-governor-actions/cf78bf3e54d43cf9806a3ee3bbc7e2a4683ff786/src/policy/policy-header.svg";

/// Renders policy scan responses into the step summary
#[derive(Debug, Default, Clone)]
pub struct PolicyReporter {
    ignore: Vec<LabelMatcherSet>,
}

impl PolicyReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Policies matching any of these sets never fail the step
    pub fn with_ignored_labels(ignore: Vec<LabelMatcherSet>) -> Self {
        Self { ignore }
    }
}

impl Reporter for PolicyReporter {
    type Subject = PolicySubject;
    type Success = PolicySuccessResponse;

    fn report_success(
        &self,
        subject: &PolicySubject,
        result: &PolicySuccessResponse,
        ctx: &mut ReportContext<'_>,
    ) -> Result<Verdict> {
        let mut policies = match aggregate::aggregate(&result.results) {
            Ok(policies) => policies,
            Err(e) => {
                // still leave an error report behind before giving up
                let problem = ProblemDetails {
                    title: Some("Unexpected response".into()),
                    detail: Some(e.to_string()),
                    ..ProblemDetails::default()
                };
                self.report_error(subject, &serde_json::to_value(problem)?, ctx)?;
                return Err(e);
            }
        };
        aggregate::apply_ignores(&mut policies, &self.ignore);

        let verdict = aggregate::verdict(&policies);
        let result_text = format!("{} {}", verdict.icon(), verdict);

        header(ctx.summary, &format!("Policy Scan Evaluated - {}", result_text));
        subject_info(ctx.summary, subject);

        ctx.summary
            .add_raw("**Result:** ")
            .add_raw(&result_text)
            .add_eol()
            .add_eol();

        policy_table(ctx.summary, &policies);

        for ignored in policies.iter().filter(|p| p.ignored && p.status == EvaluationStatus::Unsatisfied) {
            warn!(
                "Policy {} evaluated to UNSATISFIED but is ignored by label",
                ignored.policy.name
            );
        }

        if verdict == EvaluationStatus::Unsatisfied {
            if ctx.strict {
                ctx.step.set_failed(format!(
                    "Policy scan {} evaluated to UNSATISFIED for {}",
                    subject.scan_name, subject.subject_name
                ));
            }
            failed_policy_details(ctx, &policies);
        }

        all_results(ctx.summary, &policies);

        Ok(match verdict {
            EvaluationStatus::Unsatisfied => Verdict::Failed,
            _ => Verdict::Passed,
        })
    }

    fn report_error(
        &self,
        subject: &PolicySubject,
        payload: &serde_json::Value,
        ctx: &mut ReportContext<'_>,
    ) -> Result<Verdict> {
        let result: PolicyErrorResponse = report::decode_error(payload);

        header(ctx.summary, "Policy Scan Evaluation - ⛔ Error");

        if ctx.strict {
            let mut message = format!(
                "Policy scan {} evaluation errored for {}",
                subject.scan_name, subject.subject_name
            );
            if let Some(title) = result.problem.title.as_deref().filter(|t| !t.is_empty()) {
                message.push_str(": ");
                message.push_str(title);
            }
            ctx.step.set_failed(message);
            ctx.step.error(format!(
                "Error response: {}",
                serde_json::to_string_pretty(payload)?
            ));
        }

        subject_info(ctx.summary, subject);
        report::report_problem_details(ctx.summary, &result.problem);

        Ok(Verdict::Failed)
    }
}

fn header(summary: &mut Summary, heading: &str) {
    report::header(summary, HEADER_IMAGE, "Policy Evaluator", heading);
}

fn code_span(summary: &mut Summary, label: &str, value: &str) {
    summary
        .add_raw(label)
        .add_raw(" `")
        .add_raw(value)
        .add_raw("`")
        .add_eol()
        .add_eol();
}

fn subject_info(summary: &mut Summary, subject: &PolicySubject) {
    code_span(summary, "**Policy Scan:**", &subject.scan_name);
    if let Some(enforcement_point) = &subject.enforcement_point {
        code_span(summary, "**Enforcement Point:**", enforcement_point);
    }
    code_span(summary, "**Subject:**", &subject.subject_name);
    code_span(summary, "**Digest:**", &subject.digest.sha256);
    summary.add_eol();
}

fn detail_anchor(index: usize) -> String {
    format!("policy-detail-{}", index)
}

fn policy_table(summary: &mut Summary, policies: &[PolicyAggregate]) {
    let mut rows: Vec<Row> = vec![vec![
        Cell::header("Policy"),
        Cell::header("Type"),
        Cell::header("Status"),
        Cell::header("Attestations Passed / Evaluated"),
        Cell::header("Description"),
        Cell::header("Remediation"),
        Cell::header("Failure Details"),
    ]];

    for (index, policy) in policies.iter().enumerate() {
        let failed = policy.status == EvaluationStatus::Unsatisfied;

        let status = if failed && policy.ignored {
            format!("{} (ignored)", policy.status.icon())
        } else {
            policy.status.icon().to_string()
        };
        let remediation = if failed {
            policy.policy.remediation.clone().unwrap_or_default()
        } else {
            String::new()
        };
        let link = if policy.is_blocking() {
            format!("\n\n[Link](#user-content-{})\n", detail_anchor(index))
        } else {
            String::new()
        };

        rows.push(vec![
            Cell::new(format!("\n\n`{}`\n", policy.policy.name)),
            Cell::new(format!("\n\n`{}`\n", policy.policy.type_)),
            Cell::new(status),
            Cell::new(format!("{} / {}", policy.passed(), policy.evaluated())),
            Cell::new(policy.policy.description.clone().unwrap_or_default()),
            Cell::new(remediation),
            Cell::new(link),
        ]);
    }

    summary.add_table(&rows).add_eol().add_eol();
}

fn json_details(label: &str, json: &str) -> String {
    format!(
        "\n\n<details>\n\n<summary>{}</summary>\n\n```json\n{}\n```\n\n</details>\n",
        label, json
    )
}

fn evaluation_row(evaluation: &EvaluationResult) -> Row {
    let details = if evaluation.details.is_empty() {
        String::new()
    } else {
        serde_json::to_string_pretty(&evaluation.details)
            .map(|json| json_details("Details", &json))
            .unwrap_or_default()
    };
    let build_scan = evaluation
        .build_scan_uri
        .as_ref()
        .map(|uri| format!("\n\n[Build Scan]({})\n", uri))
        .unwrap_or_default();
    let envelope = evaluation
        .envelope
        .as_ref()
        .and_then(|envelope| serde_json::to_string_pretty(envelope).ok())
        .map(|json| json_details("Envelope", &json))
        .unwrap_or_default();

    vec![
        Cell::new(format!("\n\n`{}`\n", evaluation.attestation_name())),
        Cell::new(evaluation.status.icon()),
        Cell::new(details),
        Cell::new(build_scan),
        Cell::new(envelope),
    ]
}

fn failed_policy_details(ctx: &mut ReportContext<'_>, policies: &[PolicyAggregate]) {
    ctx.summary.add_raw("# Failed Policies").add_eol().add_eol();

    for (index, policy) in policies.iter().enumerate() {
        if !policy.is_blocking() {
            continue;
        }
        let info = &policy.policy;

        ctx.summary
            .add_raw(&format!("## <a name=\"{}\"></a> Policy ", detail_anchor(index)))
            .add_raw("`")
            .add_raw(&info.name)
            .add_raw("`")
            .add_eol()
            .add_eol();
        ctx.summary
            .add_raw("**Type:** `")
            .add_raw(&info.type_)
            .add_raw("`")
            .add_eol()
            .add_eol();

        if let Some(description) = &info.description {
            ctx.summary
                .add_raw("**Description:** ")
                .add_raw(description)
                .add_eol()
                .add_eol();
        }
        if let Some(remediation) = &info.remediation {
            ctx.summary
                .add_raw("**Remediation:** ")
                .add_raw(remediation)
                .add_eol()
                .add_eol();
        }

        if !info.labels.is_empty() {
            ctx.summary.add_raw("**Labels:**").add_eol().add_eol();
            for (key, value) in &info.labels {
                ctx.summary
                    .add_raw(&format!("- `{}` = `{}`", key, value))
                    .add_eol();
            }
            ctx.summary.add_eol().add_eol();
        }

        let mut rows: Vec<Row> = vec![vec![
            Cell::header("Attestation"),
            Cell::header("Status"),
            Cell::header("Details"),
            Cell::header("Build Scan"),
            Cell::header("Envelope"),
        ]];
        for evaluation in policy.failures().chain(policy.successes()) {
            if ctx.strict && evaluation.status == EvaluationStatus::Unsatisfied {
                ctx.step.error(format!(
                    "Policy {} on attestation {} evaluated to UNSATISFIED",
                    info.name,
                    evaluation.attestation_name()
                ));
            }
            rows.push(evaluation_row(evaluation));
        }
        ctx.summary.add_table(&rows).add_eol().add_eol();
    }
}

/// Collapsed list of every record, in aggregate order
fn all_results(summary: &mut Summary, policies: &[PolicyAggregate]) {
    if policies.iter().all(|p| p.evaluations.is_empty()) {
        return;
    }

    let mut rows: Vec<Row> = vec![vec![
        Cell::header("Policy"),
        Cell::header("Attestation"),
        Cell::header("Predicate Type"),
        Cell::header("Status"),
    ]];
    for policy in policies {
        let mut evaluations: Vec<&EvaluationResult> = policy.evaluations.iter().collect();
        evaluations.sort_by_key(|e| e.status);
        for evaluation in evaluations {
            rows.push(vec![
                Cell::new(format!("`{}`", policy.policy.name)),
                Cell::new(format!("`{}`", evaluation.attestation_name())),
                Cell::new(evaluation.predicate_type.clone().unwrap_or_default()),
                Cell::new(evaluation.status.icon()),
            ]);
        }
    }

    let table = summary::table_markup(&rows);
    summary.add_details("All Results", &format!("\n\n{}\n\n", table));
}
