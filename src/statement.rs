//! in-toto statements carried inside DSSE envelopes
//!
//! Store requests and policy evaluations both carry the signed envelope that
//! was written to an attestation store. Reports only ever need to look inside
//! it, so decoding is lenient: anything that is not a base64 encoded JSON
//! statement simply yields `None`.

use std::collections::BTreeMap;

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// DSSE envelope as sent to an attestation store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(default)]
    pub payload_type: String,

    /// Base64-encoded statement
    #[serde(default)]
    pub payload: String,

    #[serde(default)]
    pub signatures: Vec<serde_json::Value>,
}

/// Resource the statement is about
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,

    #[serde(default)]
    pub digest: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_location: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

/// in-toto Statement v1
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statement {
    #[serde(rename = "_type", default)]
    pub type_: String,

    #[serde(default)]
    pub subject: Vec<ResourceDescriptor>,

    pub predicate_type: String,

    #[serde(default)]
    pub predicate: serde_json::Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
}

impl Statement {
    /// Pretty-printed predicate, two-space indented, keys in payload order
    pub fn predicate_json(&self) -> Option<String> {
        serde_json::to_string_pretty(&self.predicate).ok()
    }

    /// Build scan link recorded by the predicate, if any
    pub fn build_scan_uri(&self) -> Option<&str> {
        ["buildScanUri", "buildScanUrl"]
            .iter()
            .find_map(|key| self.predicate.get(*key))
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }
}

impl Envelope {
    /// Decode the payload into a statement
    pub fn try_statement(&self) -> Result<Statement> {
        let bytes = base64::engine::general_purpose::STANDARD.decode(self.payload.trim())?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Decode the payload, degrading to `None` on any failure
    pub fn statement(&self) -> Option<Statement> {
        if self.payload.is_empty() {
            return None;
        }
        match self.try_statement() {
            Ok(statement) => Some(statement),
            Err(e) => {
                tracing::debug!("Unable to decode envelope payload: {}", e);
                None
            }
        }
    }
}

/// Decode a statement from an envelope held as loose JSON
pub fn decode(envelope: &serde_json::Value) -> Option<Statement> {
    let envelope: Envelope = serde_json::from_value(envelope.clone()).ok()?;
    envelope.statement()
}
