//! Policy scan evaluation step
//!
//! - [`types`]: evaluator request and response shapes
//! - [`aggregate`]: grouping records per policy and computing the verdict
//! - [`labels`]: ignore-by-label matchers
//! - [`report`]: the step summary renderer

pub mod aggregate;
pub mod labels;
pub mod report;
pub mod types;

use tracing::info;

pub use aggregate::{EvaluationStatus, PolicyAggregate};
pub use labels::{parse_ignore_labels, LabelMatcherSet};
pub use report::PolicyReporter;
pub use types::{
    PolicyErrorResponse, PolicyEvaluation, PolicyRequestBody, PolicySubject,
    PolicySuccessResponse,
};

use crate::client::Client;
use crate::error::Result;
use crate::report::{ReportContext, Reporter, Verdict};
use crate::subject::{Digest, PackageUrl};

/// Inputs of the evaluate step after parsing
#[derive(Debug, Clone)]
pub struct PolicyInputs {
    pub tenant: String,
    pub policy_scan: String,
    pub enforcement_point: Option<String>,
    pub purl: PackageUrl,
    pub digest: Digest,
    pub repository_url: String,

    /// Parsed `ignore-policies-with-labels` matchers
    pub ignore_labels: Vec<LabelMatcherSet>,
}

/// Run the evaluate step against `client`
pub async fn run<C: Client>(
    client: &C,
    evaluator_url: &str,
    inputs: &PolicyInputs,
    ctx: &mut ReportContext<'_>,
) -> Result<Verdict> {
    ctx.step.start_group(&format!(
        "Evaluating policy for subject: {} from: {}",
        inputs.digest.sha256, inputs.repository_url
    ));
    info!(
        "Policy Evaluation URL: {} - for policy: {}",
        evaluator_url, inputs.policy_scan
    );
    ctx.step.end_group();

    let response = client
        .evaluate_policy(
            &inputs.tenant,
            &inputs.policy_scan,
            &inputs.purl,
            &inputs.digest,
            &inputs.repository_url,
        )
        .await;

    let subject = PolicySubject::new(
        inputs.policy_scan.clone(),
        inputs.enforcement_point.clone(),
        inputs.purl.to_string(),
        inputs.digest.clone(),
    );
    PolicyReporter::with_ignored_labels(inputs.ignore_labels.clone())
        .report_response(&subject, response, ctx)
}
