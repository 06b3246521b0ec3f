//! HTTP client for the attestation publisher and the policy evaluator
//!
//! Both services share one URL scheme:
//! `{base}{tenant}/packages/{type}/[{namespace}/]{name}/{version}/...`.
//! Responses are never turned into errors here. Every call yields a
//! [`ClientResult`] that the step hands to a reporter, including transport
//! failures, which come back with status `0`.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::publish::{BuildScanCriteria, PublishRequestBody};
use crate::policy::PolicyRequestBody;
use crate::subject::{Digest, PackageUrl};

/// How requests authenticate
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Bearer token, usually the CI identity token
    Token(String),
    Basic { username: String, password: String },
}

impl Credentials {
    /// Value of the `Authorization` header
    pub fn authorization(&self) -> String {
        match self {
            Credentials::Token(token) => format!("Bearer {}", token),
            Credentials::Basic { username, password } => {
                format!("Basic {}", BASE64.encode(format!("{}:{}", username, password)))
            }
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Token(_) => f.write_str("Token(***)"),
            Credentials::Basic { username, .. } => write!(f, "Basic({}:***)", username),
        }
    }
}

/// Status and body of one API call
#[derive(Debug, Clone, PartialEq)]
pub struct ClientResult {
    /// HTTP status, `0` when the request never got a response
    pub status: u16,

    pub payload: Option<serde_json::Value>,

    /// Set when the body was not JSON; such a result always renders as an error
    pub malformed: bool,
}

impl ClientResult {
    pub fn new(status: u16, payload: Option<serde_json::Value>) -> Self {
        Self {
            status,
            payload,
            malformed: false,
        }
    }

    /// Result for a request that failed before any response arrived
    pub fn transport_failure(message: impl Into<String>) -> Self {
        Self::new(0, Some(json!({ "detail": message.into() })))
    }
}

/// Calls the steps make; implemented by [`ApiClient`] and by canned clients
/// in tests.
#[allow(async_fn_in_trait)]
pub trait Client {
    async fn publish_attestation(
        &self,
        tenant: &str,
        purl: &PackageUrl,
        digest: &Digest,
        repository_url: &str,
        build_scan: &BuildScanCriteria,
    ) -> ClientResult;

    async fn evaluate_policy(
        &self,
        tenant: &str,
        policy_scan: &str,
        purl: &PackageUrl,
        digest: &Digest,
        repository_url: &str,
    ) -> ClientResult;
}

/// `reqwest`-backed client for one service base URL
pub struct ApiClient {
    /// Base URL, always ending in `/`
    base_url: String,

    credentials: Credentials,

    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, credentials: Credentials) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self {
            base_url,
            credentials,
            http: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn packages_url(&self, tenant: &str, purl: &PackageUrl) -> String {
        format!("{}{}/packages/{}", self.base_url, tenant, purl.api_path())
    }

    /// Publisher endpoint for a subject
    pub fn attestations_url(&self, tenant: &str, purl: &PackageUrl) -> String {
        format!("{}/attestations", self.packages_url(tenant, purl))
    }

    /// Evaluator endpoint for a subject and scan
    pub fn policy_scan_url(&self, tenant: &str, purl: &PackageUrl, policy_scan: &str) -> String {
        format!(
            "{}/policy-scans/{}",
            self.packages_url(tenant, purl),
            policy_scan
        )
    }

    async fn post<B: serde::Serialize>(&self, url: &str, body: &B) -> ClientResult {
        let response = self
            .http
            .post(url)
            .header("Authorization", self.credentials.authorization())
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => return ClientResult::transport_failure(e.to_string()),
        };

        let status = response.status().as_u16();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => return ClientResult::transport_failure(e.to_string()),
        };
        debug!("Response status {} with {} bytes", status, text.len());

        parse_body(status, &text)
    }
}

/// Turn a response body into a result. An empty body has no payload; a body
/// that is not JSON becomes a detail message.
fn parse_body(status: u16, text: &str) -> ClientResult {
    if text.trim().is_empty() {
        return ClientResult::new(status, None);
    }
    match serde_json::from_str(text) {
        Ok(payload) => ClientResult::new(status, Some(payload)),
        Err(e) => ClientResult {
            status,
            payload: Some(json!({ "detail": format!("Invalid JSON response: {}", e) })),
            malformed: true,
        },
    }
}

impl Client for ApiClient {
    async fn publish_attestation(
        &self,
        tenant: &str,
        purl: &PackageUrl,
        digest: &Digest,
        repository_url: &str,
        build_scan: &BuildScanCriteria,
    ) -> ClientResult {
        let url = self.attestations_url(tenant, purl);
        let body = PublishRequestBody {
            repository_url: repository_url.to_string(),
            sha256: digest.sha256.clone(),
            build_scan: build_scan.clone(),
        };

        info!("Calling publisher: {}", url);
        debug!(
            "Calling publisher with payload: {}",
            serde_json::to_string(&body).unwrap_or_default()
        );

        self.post(&url, &body).await
    }

    async fn evaluate_policy(
        &self,
        tenant: &str,
        policy_scan: &str,
        purl: &PackageUrl,
        digest: &Digest,
        repository_url: &str,
    ) -> ClientResult {
        let url = self.policy_scan_url(tenant, purl, policy_scan);
        let body = PolicyRequestBody {
            repository_url: repository_url.to_string(),
            sha256: digest.sha256.clone(),
        };

        info!("Calling policy evaluator: {}", url);
        debug!(
            "Calling evaluator with payload: {}",
            serde_json::to_string(&body).unwrap_or_default()
        );

        self.post(&url, &body).await
    }
}

#[derive(Deserialize)]
struct IdTokenResponse {
    value: Option<String>,
}

/// Request an identity token from the CI platform.
///
/// The platform exposes a token endpoint and a request token to every job
/// that is allowed to mint identity tokens.
pub async fn fetch_id_token(request_url: Option<&str>, request_token: Option<&str>) -> Result<String> {
    let url = request_url
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::IdToken("ACTIONS_ID_TOKEN_REQUEST_URL is not set".into()))?;
    let token = request_token
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::IdToken("ACTIONS_ID_TOKEN_REQUEST_TOKEN is not set".into()))?;

    let response = reqwest::Client::new()
        .get(url)
        .header("Authorization", format!("Bearer {}", token))
        .header("Accept", "application/json")
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(Error::IdToken(format!("HTTP {}: {}", status, body)));
    }

    let body: IdTokenResponse = response.json().await?;
    body.value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::IdToken("response did not contain a token".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn purl(namespace: Option<&str>) -> PackageUrl {
        PackageUrl::new("maven", namespace.map(str::to_string), "app", "1.0.0")
    }

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let client = ApiClient::new("https://gov.example.com/api", Credentials::Token("t".into()));
        assert_eq!(client.base_url(), "https://gov.example.com/api/");

        let client = ApiClient::new("https://gov.example.com/api/", Credentials::Token("t".into()));
        assert_eq!(client.base_url(), "https://gov.example.com/api/");
    }

    #[test]
    fn test_endpoint_urls() {
        let client = ApiClient::new("https://gov.example.com", Credentials::Token("t".into()));
        assert_eq!(
            client.attestations_url("acme", &purl(Some("com.example"))),
            "https://gov.example.com/acme/packages/maven/com.example/app/1.0.0/attestations"
        );
        assert_eq!(
            client.attestations_url("acme", &purl(None)),
            "https://gov.example.com/acme/packages/maven/app/1.0.0/attestations"
        );
        assert_eq!(
            client.policy_scan_url("acme", &purl(None), "release"),
            "https://gov.example.com/acme/packages/maven/app/1.0.0/policy-scans/release"
        );
    }

    #[test]
    fn test_authorization_header() {
        assert_eq!(Credentials::Token("abc".into()).authorization(), "Bearer abc");
        let basic = Credentials::Basic {
            username: "user".into(),
            password: "pass".into(),
        };
        assert_eq!(basic.authorization(), "Basic dXNlcjpwYXNz");
        assert_eq!(format!("{:?}", basic), "Basic(user:***)");
    }

    #[test]
    fn test_parse_body() {
        let ok = parse_body(200, r#"{"results": []}"#);
        assert_eq!(ok, ClientResult::new(200, Some(json!({"results": []}))));

        assert_eq!(parse_body(204, "").payload, None);

        let bad = parse_body(502, "<html>Bad Gateway</html>");
        assert!(bad.malformed);
        assert_eq!(bad.status, 502);
        let detail = bad.payload.unwrap()["detail"].as_str().unwrap().to_string();
        assert!(detail.starts_with("Invalid JSON response: "));
    }

    #[test]
    fn test_malformed_200_keeps_its_status() {
        let result = parse_body(200, "not json");
        assert_eq!(result.status, 200);
        assert!(result.malformed);
        assert!(!parse_body(200, "{}").malformed);
    }

    #[tokio::test]
    async fn test_connection_refused_is_status_zero() {
        let client = ApiClient::new("http://127.0.0.1:1", Credentials::Token("t".into()));
        let result = client
            .evaluate_policy(
                "acme",
                "release",
                &purl(None),
                &Digest::unchecked("ab".repeat(32)),
                "https://repo.example.com/releases",
            )
            .await;

        assert_eq!(result.status, 0);
        assert!(result.payload.unwrap()["detail"].is_string());
    }

    #[tokio::test]
    async fn test_id_token_requires_platform_variables() {
        let err = fetch_id_token(None, Some("t")).await.unwrap_err();
        assert!(matches!(err, Error::IdToken(_)));

        let err = fetch_id_token(Some("https://token.example.com"), Some("")).await.unwrap_err();
        assert!(matches!(err, Error::IdToken(_)));
    }
}
