//! Error types for the governor steps

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Base64 decoding failed: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The policy engine answered with a status outside the known vocabulary.
    #[error("Unknown status in response: {0}")]
    UnknownEvaluationStatus(String),

    #[error("Invalid label matcher format. Expected '{{key}}={{value}}'. Got: {0}")]
    InvalidLabelMatcher(String),

    #[error("No build scan IDs or queries provided. At least one is required.")]
    MissingBuildScanCriteria,

    #[error("Input required and not supplied: {0}")]
    MissingInput(String),

    #[error("Invalid subject digest: {0}")]
    InvalidDigest(String),

    #[error("Unable to obtain identity token: {0}")]
    IdToken(String),
}

pub type Result<T> = std::result::Result<T, Error>;
