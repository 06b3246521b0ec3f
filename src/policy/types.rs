//! Policy evaluator request and response types

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::report::ProblemDetails;
use crate::subject::Digest;

/// What a policy report is about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicySubject {
    pub scan_name: String,

    /// Only rendered when present and non-empty
    pub enforcement_point: Option<String>,

    /// Package URL string of the subject
    pub subject_name: String,
    pub digest: Digest,
}

impl PolicySubject {
    pub fn new(
        scan_name: impl Into<String>,
        enforcement_point: Option<String>,
        subject_name: impl Into<String>,
        digest: Digest,
    ) -> Self {
        Self {
            scan_name: scan_name.into(),
            enforcement_point: enforcement_point.filter(|ep| !ep.is_empty()),
            subject_name: subject_name.into(),
            digest,
        }
    }
}

/// Request body of `POST .../policy-scans/{name}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRequestBody {
    pub repository_url: String,
    pub sha256: String,
}

/// One evaluation of one policy against one attestation, as sent by the
/// policy engine. The status is kept as text until aggregation normalizes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyEvaluation {
    pub policy_uri: String,

    #[serde(default)]
    pub policy_type: Option<String>,

    #[serde(default)]
    pub policy_description: Option<String>,

    #[serde(default)]
    pub policy_remediation: Option<String>,

    #[serde(default)]
    pub attestation_store_instance: Option<String>,

    #[serde(default, alias = "attestationUri")]
    pub attestation_store_uri: Option<String>,

    #[serde(default)]
    pub predicate_type: Option<String>,

    #[serde(default)]
    pub sourced_from_instance: Option<String>,

    /// Build scan the attestation was sourced from
    #[serde(default)]
    pub sourced_from_uri: Option<String>,

    /// Signed envelope of the evaluated attestation, shown verbatim
    #[serde(default)]
    pub envelope: Option<serde_json::Value>,

    pub status: String,

    #[serde(default)]
    pub details: serde_json::Map<String, serde_json::Value>,

    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// Body of a 200 response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicySuccessResponse {
    #[serde(default)]
    pub request: Option<serde_json::Value>,

    #[serde(default, alias = "evaluations")]
    pub results: Vec<PolicyEvaluation>,
}

/// Body of any other response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyErrorResponse {
    #[serde(flatten)]
    pub problem: ProblemDetails,
}

impl From<ProblemDetails> for PolicyErrorResponse {
    fn from(problem: ProblemDetails) -> Self {
        Self { problem }
    }
}
