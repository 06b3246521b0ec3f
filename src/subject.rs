//! Subject coordinates: the package URL and content digest a step acts upon

use std::fmt;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Left as-is in purl components: the URI component set plus `:`
const PURL_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b':');

/// Package coordinate in package-URL form (`pkg:type/namespace/name@version`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageUrl {
    #[serde(rename = "type")]
    pub ty: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    pub name: String,
    pub version: String,
}

impl PackageUrl {
    /// Build a package URL; an empty namespace is treated as absent
    pub fn new(
        ty: impl Into<String>,
        namespace: Option<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            ty: ty.into().to_lowercase(),
            namespace: namespace.filter(|ns| !ns.is_empty()),
            name: name.into(),
            version: version.into(),
        }
    }

    /// Path segments used by the remote API: `type/[namespace/]name/version`.
    /// Components go into the path unencoded.
    pub fn api_path(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}/{}/{}/{}", self.ty, ns, self.name, self.version),
            None => format!("{}/{}/{}", self.ty, self.name, self.version),
        }
    }
}

/// Canonical `pkg:` string; namespace segments, name and version are
/// percent-encoded
impl fmt::Display for PackageUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pkg:{}/", self.ty)?;
        if let Some(ns) = &self.namespace {
            for segment in ns.split('/').filter(|s| !s.is_empty()) {
                write!(f, "{}/", utf8_percent_encode(segment, PURL_COMPONENT))?;
            }
        }
        write!(
            f,
            "{}@{}",
            utf8_percent_encode(&self.name, PURL_COMPONENT),
            utf8_percent_encode(&self.version, PURL_COMPONENT)
        )
    }
}

/// SHA-256 content digest of a subject, stored as lower-case hex
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Digest {
    pub sha256: String,
}

impl Digest {
    /// Parse a digest, accepting an optional `sha256:` prefix
    pub fn parse(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        let hex_part = trimmed.strip_prefix("sha256:").unwrap_or(trimmed);

        let bytes = hex::decode(hex_part)
            .map_err(|e| Error::InvalidDigest(format!("{}: {}", value, e)))?;
        if bytes.len() != 32 {
            return Err(Error::InvalidDigest(format!(
                "{}: expected 32 bytes, got {}",
                value,
                bytes.len()
            )));
        }

        Ok(Self {
            sha256: hex::encode(bytes),
        })
    }

    /// Wrap an already validated value without re-checking it
    pub fn unchecked(sha256: impl Into<String>) -> Self {
        Self {
            sha256: sha256.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIGEST: &str = "c8d8f52ac5cd63188e705ac55dd01ee3a22f419a6b311175f84d965573af563b";

    #[test]
    fn test_purl_without_namespace() {
        let purl = PackageUrl::new("oci", Some(String::new()), "java-payment-calculator", "1.0.0");
        assert_eq!(purl.to_string(), "pkg:oci/java-payment-calculator@1.0.0");
        assert_eq!(purl.api_path(), "oci/java-payment-calculator/1.0.0");
    }

    #[test]
    fn test_purl_with_namespace() {
        let purl = PackageUrl::new("Maven", Some("com.example".into()), "app", "2.1");
        assert_eq!(purl.to_string(), "pkg:maven/com.example/app@2.1");
        assert_eq!(purl.api_path(), "maven/com.example/app/2.1");
    }

    #[test]
    fn test_purl_components_are_percent_encoded() {
        let purl = PackageUrl::new("npm", Some("@angular/core".into()), "core ui", "1.0.0+build");
        assert_eq!(purl.to_string(), "pkg:npm/%40angular/core/core%20ui@1.0.0%2Bbuild");
        assert_eq!(purl.api_path(), "npm/@angular/core/core ui/1.0.0+build");

        // digests used as versions keep their colon
        let purl = PackageUrl::new("oci", None, "app", "sha256:abc");
        assert_eq!(purl.to_string(), "pkg:oci/app@sha256:abc");
    }

    #[test]
    fn test_digest_prefix_is_stripped() {
        let digest = Digest::parse(&format!("sha256:{}", DIGEST)).unwrap();
        assert_eq!(digest.sha256, DIGEST);
    }

    #[test]
    fn test_digest_is_normalized_to_lowercase() {
        let digest = Digest::parse(&DIGEST.to_uppercase()).unwrap();
        assert_eq!(digest.sha256, DIGEST);
    }

    #[test]
    fn test_digest_rejects_bad_input() {
        assert!(Digest::parse("not-hex").is_err());
        assert!(Digest::parse("abcd").is_err());
    }
}
