//! Attestation publishing step
//!
//! Asks the publisher to derive attestations for a subject from build scans,
//! then renders the stored attestations into the step summary.

pub mod report;
pub mod types;

use tracing::info;

pub use report::PublishReporter;
pub use types::{
    BuildScanCriteria, EchoedRequest, PublishErrorResponse, PublishFailedItem,
    PublishRequestBody, PublishSubject, PublishSuccessItem, PublishSuccessResponse,
};

use crate::client::Client;
use crate::error::{Error, Result};
use crate::report::{ReportContext, Reporter, Verdict};
use crate::step::StepStatus;
use crate::subject::{Digest, PackageUrl};

/// Inputs of the publish step after parsing
#[derive(Debug, Clone)]
pub struct PublishInputs {
    pub tenant: String,
    pub purl: PackageUrl,
    pub digest: Digest,
    pub repository_url: String,
    pub build_scan: BuildScanCriteria,
}

/// Fail the step when no build scan id or query was given
pub fn ensure_build_scans(inputs: &PublishInputs, step: &mut StepStatus) -> bool {
    if inputs.build_scan.is_empty() {
        step.error(Error::MissingBuildScanCriteria.to_string());
        step.set_failed("Action failed due to missing build scan information.");
        return false;
    }
    true
}

/// Run the publish step against `client`.
///
/// Without any build scan id or query the step fails before calling the
/// publisher.
pub async fn run<C: Client>(
    client: &C,
    publisher_url: &str,
    inputs: &PublishInputs,
    ctx: &mut ReportContext<'_>,
) -> Result<Verdict> {
    if !ensure_build_scans(inputs, ctx.step) {
        return Ok(Verdict::Failed);
    }

    ctx.step.start_group(&format!(
        "Publishing attestation for subject: {} - {}",
        inputs.purl, inputs.digest.sha256
    ));
    info!("Subject Repository URL: {}", inputs.repository_url);
    info!("Publisher URL: {} - in tenant: {}", publisher_url, inputs.tenant);
    ctx.step.end_group();

    let response = client
        .publish_attestation(
            &inputs.tenant,
            &inputs.purl,
            &inputs.digest,
            &inputs.repository_url,
            &inputs.build_scan,
        )
        .await;

    let subject = PublishSubject::new(inputs.purl.to_string(), inputs.digest.clone());
    PublishReporter.report_response(&subject, response, ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientResult;
    use crate::summary::Summary;
    use serde_json::json;
    use std::cell::Cell;

    /// Client answering every call with one canned result
    struct CannedClient {
        result: ClientResult,
        calls: Cell<usize>,
    }

    impl CannedClient {
        fn new(result: ClientResult) -> Self {
            Self {
                result,
                calls: Cell::new(0),
            }
        }
    }

    impl Client for CannedClient {
        async fn publish_attestation(
            &self,
            _tenant: &str,
            _purl: &PackageUrl,
            _digest: &Digest,
            _repository_url: &str,
            _build_scan: &BuildScanCriteria,
        ) -> ClientResult {
            self.calls.set(self.calls.get() + 1);
            self.result.clone()
        }

        async fn evaluate_policy(
            &self,
            _tenant: &str,
            _policy_scan: &str,
            _purl: &PackageUrl,
            _digest: &Digest,
            _repository_url: &str,
        ) -> ClientResult {
            unreachable!("publish step never evaluates policies")
        }
    }

    fn inputs(ids: &[&str]) -> PublishInputs {
        PublishInputs {
            tenant: "acme".into(),
            purl: PackageUrl::new("maven", Some("com.example".into()), "app", "1.0.0"),
            digest: Digest::unchecked("ab".repeat(32)),
            repository_url: "https://repo.example.com/releases".into(),
            build_scan: BuildScanCriteria {
                ids: ids.iter().map(|s| s.to_string()).collect(),
                queries: Vec::new(),
            },
        }
    }

    #[tokio::test]
    async fn test_missing_build_scans_fail_without_a_call() {
        let client = CannedClient::new(ClientResult::new(200, Some(json!({"successes": []}))));
        let mut summary = Summary::new();
        let mut step = StepStatus::recording();

        let verdict = {
            let mut ctx = ReportContext::new(&mut summary, &mut step, true);
            run(&client, "https://pub.example.com", &inputs(&[]), &mut ctx)
                .await
                .unwrap()
        };

        assert_eq!(verdict, Verdict::Failed);
        assert_eq!(client.calls.get(), 0);
        assert_eq!(
            step.failure(),
            Some("Action failed due to missing build scan information.")
        );
        assert_eq!(
            step.errors(),
            ["No build scan IDs or queries provided. At least one is required.".to_string()]
        );
        assert!(summary.is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_renders_error_report() {
        let client = CannedClient::new(ClientResult::transport_failure("connection refused"));
        let mut summary = Summary::new();
        let mut step = StepStatus::recording();

        let verdict = {
            let mut ctx = ReportContext::new(&mut summary, &mut step, true);
            run(&client, "https://pub.example.com", &inputs(&["abc123"]), &mut ctx)
                .await
                .unwrap()
        };

        assert_eq!(verdict, Verdict::Failed);
        assert_eq!(client.calls.get(), 1);
        assert!(step.is_failed());
        assert!(summary.stringify().contains("Attestations Publishing Failed"));
        assert!(summary.stringify().contains("> connection refused\n\n"));
    }

    #[tokio::test]
    async fn test_malformed_success_renders_error_report() {
        let mut result = ClientResult::new(
            200,
            Some(json!({"detail": "Invalid JSON response: expected value at line 1 column 1"})),
        );
        result.malformed = true;
        let client = CannedClient::new(result);
        let mut summary = Summary::new();
        let mut step = StepStatus::recording();

        let verdict = {
            let mut ctx = ReportContext::new(&mut summary, &mut step, false);
            run(&client, "https://pub.example.com", &inputs(&["abc123"]), &mut ctx)
                .await
                .unwrap()
        };

        assert_eq!(verdict, Verdict::Failed);
        assert!(!step.is_failed());
        assert!(summary.stringify().contains("> Invalid JSON response"));
    }
}
