//! Attestation publisher request and response types

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use crate::report::ProblemDetails;
use crate::statement::{Envelope, Statement};
use crate::subject::{Digest, PackageUrl};

/// What a publish report is about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishSubject {
    /// Package URL string of the subject
    pub name: String,
    pub digest: Digest,
}

impl PublishSubject {
    pub fn new(name: impl Into<String>, digest: Digest) -> Self {
        Self {
            name: name.into(),
            digest,
        }
    }
}

/// Build scans the publisher should derive attestations from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildScanCriteria {
    #[serde(default)]
    pub ids: Vec<String>,

    #[serde(default)]
    pub queries: Vec<String>,
}

impl BuildScanCriteria {
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty() && self.queries.is_empty()
    }
}

/// Request body of `POST .../attestations`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishRequestBody {
    pub repository_url: String,
    pub sha256: String,
    pub build_scan: BuildScanCriteria,
}

/// Selection criteria echoed back by the publisher
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestCriteria {
    #[serde(default)]
    pub repository_url: String,

    #[serde(default)]
    pub sha256: Option<String>,

    #[serde(default)]
    pub build_scan: Option<BuildScanCriteria>,
}

/// The original request as echoed back in every response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EchoedRequest {
    #[serde(default)]
    pub tenant: Option<String>,

    pub pkg: PackageUrl,

    #[serde(default)]
    pub criteria: RequestCriteria,
}

/// Write request sent to one attestation store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreRequest {
    #[serde(default)]
    pub uri: String,

    #[serde(default)]
    pub body: Option<Envelope>,
}

impl StoreRequest {
    /// Statement inside the request envelope, if it decodes
    pub fn statement(&self) -> Option<Statement> {
        self.body.as_ref().and_then(Envelope::statement)
    }
}

/// Store answer for a successful write
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreResponse {
    #[serde(default)]
    pub repository: String,

    #[serde(default)]
    pub path: String,

    #[serde(default)]
    pub name: String,

    /// Download path relative to the store's download API
    pub uri: String,

    #[serde(default)]
    pub sha256: String,

    #[serde(default)]
    pub predicate_category: String,

    pub predicate_type: String,

    #[serde(default)]
    pub predicate_slug: String,

    #[serde(default)]
    pub created_at: String,

    #[serde(default)]
    pub created_by: String,

    #[serde(default)]
    pub verified: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreErrorMessage {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreErrorBody {
    #[serde(default)]
    pub errors: Vec<StoreErrorMessage>,
}

/// Store answer for a failed write
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreErrorResponse {
    #[serde(default)]
    pub status: u16,

    #[serde(default)]
    pub message: String,

    #[serde(default)]
    pub body: Option<StoreErrorBody>,
}

/// One attestation written to a store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishSuccessItem {
    pub store_type: String,
    pub store_uri: String,

    #[serde(default)]
    pub store_request: StoreRequest,

    pub store_response: StoreResponse,
}

impl PublishSuccessItem {
    /// Link to the stored attestation in the store UI
    pub fn download_uri(&self) -> String {
        format!(
            "{}/ui/api/v1/download/{}",
            self.store_uri, self.store_response.uri
        )
    }
}

/// One attestation a store refused
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishFailedItem {
    #[serde(default)]
    pub store_type: String,

    #[serde(default)]
    pub store_uri: String,

    #[serde(default)]
    pub store_request: StoreRequest,

    #[serde(default)]
    pub store_response: StoreErrorResponse,
}

/// Body of a 200 response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishSuccessResponse {
    pub request: Option<EchoedRequest>,

    #[serde(default)]
    pub successes: Vec<PublishSuccessItem>,
}

/// Body of any other response; partial publishes carry both item lists.
///
/// The echoed request and every list item are decoded on their own, so one
/// malformed entry is dropped instead of hiding the rest of the response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublishErrorResponse {
    #[serde(flatten)]
    pub problem: ProblemDetails,

    #[serde(default, deserialize_with = "lenient")]
    pub request: Option<EchoedRequest>,

    #[serde(default, deserialize_with = "lenient_items")]
    pub successes: Option<Vec<PublishSuccessItem>>,

    #[serde(default, deserialize_with = "lenient_items")]
    pub errors: Option<Vec<PublishFailedItem>>,
}

fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(decode_item))
}

fn lenient_items<'de, D, T>(deserializer: D) -> std::result::Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let items = Option::<Vec<serde_json::Value>>::deserialize(deserializer)?;
    Ok(items.map(|items| items.into_iter().filter_map(decode_item).collect()))
}

fn decode_item<T: DeserializeOwned>(value: serde_json::Value) -> Option<T> {
    serde_json::from_value(value)
        .map_err(|e| warn!("Skipping malformed entry in publish response: {}", e))
        .ok()
}

impl From<ProblemDetails> for PublishErrorResponse {
    fn from(problem: ProblemDetails) -> Self {
        Self {
            problem,
            ..Self::default()
        }
    }
}

impl PublishErrorResponse {
    /// Whether any store was reached at all
    pub fn has_items(&self) -> bool {
        self.successes.is_some() || self.errors.is_some()
    }
}
