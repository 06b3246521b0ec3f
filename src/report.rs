//! Response classification and the reporter seam shared by both step kinds
//!
//! Every API call ends in a `(status, payload)` pair. [`classify`] decides
//! which side of a [`Reporter`] renders it; the reporter writes into the
//! step [`Summary`] and, in strict mode, fails the step through
//! [`StepStatus`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::client::ClientResult;
use crate::error::Result;
use crate::step::StepStatus;
use crate::summary::Summary;

/// RFC 7807 problem details returned by the remote API
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemDetails {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
}

impl ProblemDetails {
    /// Problem carrying only a detail message
    pub fn detail(detail: impl Into<String>) -> Self {
        Self {
            detail: Some(detail.into()),
            ..Self::default()
        }
    }
}

/// Which renderer a response goes to
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(serde_json::Value),
    Error(serde_json::Value),
}

/// Classify a response: only a 200 with a non-empty body is a success.
///
/// A missing or empty body (`null`, `{}`, `""`) always goes to the error side
/// as a problem carrying only a detail message, so error renderers have
/// something to show.
pub fn classify(status: u16, payload: Option<serde_json::Value>) -> Outcome {
    match payload.filter(|payload| !is_empty(payload)) {
        Some(payload) if status == 200 => Outcome::Success(payload),
        Some(payload) => Outcome::Error(payload),
        None => Outcome::Error(
            serde_json::to_value(ProblemDetails::detail(format!(
                "Empty response body (HTTP status {})",
                status
            )))
            .unwrap_or_default(),
        ),
    }
}

fn is_empty(payload: &serde_json::Value) -> bool {
    match payload {
        serde_json::Value::Null => true,
        serde_json::Value::Object(map) => map.is_empty(),
        serde_json::Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Pass/fail signal a report hands back to the step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Passed,
    Failed,
}

impl Verdict {
    pub fn is_failed(self) -> bool {
        self == Verdict::Failed
    }
}

/// Everything a renderer writes to
pub struct ReportContext<'a> {
    pub summary: &'a mut Summary,
    pub step: &'a mut StepStatus,

    /// When set, failures mark the step as failed
    pub strict: bool,
}

impl<'a> ReportContext<'a> {
    pub fn new(summary: &'a mut Summary, step: &'a mut StepStatus, strict: bool) -> Self {
        Self {
            summary,
            step,
            strict,
        }
    }
}

/// One report family: a success renderer and an error renderer
pub trait Reporter {
    type Subject;
    type Success: DeserializeOwned;

    fn report_success(
        &self,
        subject: &Self::Subject,
        result: &Self::Success,
        ctx: &mut ReportContext<'_>,
    ) -> Result<Verdict>;

    /// Render an error payload. The raw JSON is kept so it can be logged
    /// untouched.
    fn report_error(
        &self,
        subject: &Self::Subject,
        payload: &serde_json::Value,
        ctx: &mut ReportContext<'_>,
    ) -> Result<Verdict>;

    /// Classify the response and dispatch to the matching renderer
    fn report(
        &self,
        status: u16,
        subject: &Self::Subject,
        payload: Option<serde_json::Value>,
        ctx: &mut ReportContext<'_>,
    ) -> Result<Verdict> {
        match classify(status, payload) {
            Outcome::Success(payload) => {
                match serde_json::from_value::<Self::Success>(payload) {
                    Ok(result) => self.report_success(subject, &result, ctx),
                    Err(e) => {
                        // A 200 we cannot read is rendered like any other failure
                        let problem = ProblemDetails {
                            title: Some("Unexpected response".into()),
                            detail: Some(e.to_string()),
                            ..ProblemDetails::default()
                        };
                        let payload = serde_json::to_value(problem)?;
                        self.report_error(subject, &payload, ctx)
                    }
                }
            }
            Outcome::Error(payload) => self.report_error(subject, &payload, ctx),
        }
    }

    /// Render a client result. A body that was not JSON goes to the error
    /// renderer whatever its status.
    fn report_response(
        &self,
        subject: &Self::Subject,
        response: ClientResult,
        ctx: &mut ReportContext<'_>,
    ) -> Result<Verdict> {
        match response {
            ClientResult {
                malformed: true,
                payload: Some(payload),
                ..
            } => self.report_error(subject, &payload, ctx),
            ClientResult {
                status, payload, ..
            } => self.report(status, subject, payload, ctx),
        }
    }
}

/// Decode an error payload, falling back to a detail-only problem when the
/// payload does not have the expected shape.
pub fn decode_error<T>(payload: &serde_json::Value) -> T
where
    T: DeserializeOwned + From<ProblemDetails>,
{
    serde_json::from_value(payload.clone()).unwrap_or_else(|_| {
        let detail = match payload {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        T::from(ProblemDetails::detail(detail))
    })
}

/// Banner, image and top-level heading of a report
pub(crate) fn header(summary: &mut Summary, image: &str, alt: &str, heading: &str) {
    summary
        .add_break()
        .add_eol()
        .add_image(image, alt, "100%", "auto")
        .add_eol()
        .add_raw(&format!("# {}", heading))
        .add_eol()
        .add_eol();
}

pub(crate) fn report_problem_details(summary: &mut Summary, problem: &ProblemDetails) {
    if let Some(title) = problem.title.as_deref().filter(|s| !s.is_empty()) {
        summary.add_raw("**Error:** ").add_raw(title).add_eol().add_eol();
    }
    if let Some(detail) = problem.detail.as_deref().filter(|s| !s.is_empty()) {
        summary.add_raw("> ").add_raw(detail).add_eol().add_eol();
    }
    if let Some(type_) = problem.type_.as_deref().filter(|s| !s.is_empty()) {
        summary.add_raw("**Type:** ").add_raw(type_).add_eol().add_eol();
    }
}

/// Last path segment of a URI, ignoring a trailing slash
pub(crate) fn last_segment(uri: &str) -> &str {
    let trimmed = uri.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_success() {
        let outcome = classify(200, Some(json!({"request": {}, "successes": []})));
        assert!(matches!(outcome, Outcome::Success(_)));
    }

    #[test]
    fn test_classify_non_200_with_body_is_error() {
        let payload = json!({"title": "Not Found"});
        assert_eq!(classify(404, Some(payload.clone())), Outcome::Error(payload));

        // 2xx other than 200 is not a success either
        assert!(matches!(classify(201, Some(json!({"a": 1}))), Outcome::Error(_)));
    }

    #[test]
    fn test_classify_empty_200_is_error() {
        for payload in [None, Some(json!(null)), Some(json!({})), Some(json!(""))] {
            match classify(200, payload) {
                Outcome::Error(p) => assert_eq!(
                    p.get("detail").and_then(|d| d.as_str()),
                    Some("Empty response body (HTTP status 200)")
                ),
                other => panic!("expected error, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_classify_empty_error_body_gets_detail() {
        assert_eq!(
            classify(502, Some(json!({}))),
            Outcome::Error(json!({"detail": "Empty response body (HTTP status 502)"}))
        );
    }

    #[test]
    fn test_classify_transport_failure() {
        let payload = json!({"detail": "connection refused"});
        assert_eq!(classify(0, Some(payload.clone())), Outcome::Error(payload));
    }

    #[test]
    fn test_decode_error_falls_back_to_detail() {
        let problem: ProblemDetails = decode_error(&json!("gateway exploded"));
        assert_eq!(problem.detail.as_deref(), Some("gateway exploded"));

        let problem: ProblemDetails = decode_error(&json!({"title": "Bad", "status": 400}));
        assert_eq!(problem.title.as_deref(), Some("Bad"));
    }

    #[test]
    fn test_problem_details_rendering() {
        let mut summary = Summary::new();
        report_problem_details(
            &mut summary,
            &ProblemDetails {
                type_: Some("urn:problem:not-found".into()),
                title: Some("Not Found".into()),
                detail: None,
                instance: None,
            },
        );
        assert_eq!(
            summary.stringify(),
            "**Error:** Not Found\n\n**Type:** urn:problem:not-found\n\n"
        );
    }

    #[test]
    fn test_last_segment() {
        assert_eq!(last_segment("https://x/policies/slsa/require-tests"), "require-tests");
        assert_eq!(last_segment("https://x/a/"), "a");
        assert_eq!(last_segment("plain"), "plain");
    }
}
