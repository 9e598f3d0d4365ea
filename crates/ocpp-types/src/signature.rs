//! Signatures carried in a payload's `signatures` array.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the payload member that carries signatures.
pub const SIGNATURES_FIELD: &str = "signatures";

/// Which half of an exchange a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageDirection {
    Request,
    Response,
}

impl fmt::Display for MessageDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageDirection::Request => f.write_str("request"),
            MessageDirection::Response => f.write_str("response"),
        }
    }
}

/// Algorithm used to produce a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SigningMethod {
    /// Ed25519 over the canonical bytes.
    Ed25519,
    /// HMAC-SHA256 over the canonical bytes with a shared secret.
    HmacSha256,
}

impl fmt::Display for SigningMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SigningMethod::Ed25519 => f.write_str("Ed25519"),
            SigningMethod::HmacSha256 => f.write_str("HmacSha256"),
        }
    }
}

/// One signature over a message's canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signature {
    /// Identifies the verification key (hex public key or key-store name).
    pub key_id: String,
    /// Hex-encoded signature bytes.
    pub value: String,
    /// Algorithm.
    pub signing_method: SigningMethod,
    /// Encoding of `value`.
    #[serde(default = "default_encoding")]
    pub encoding_method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

fn default_encoding() -> String {
    "hex".to_string()
}

impl Signature {
    /// Create a hex-encoded signature.
    pub fn new(key_id: impl Into<String>, value: impl Into<String>, method: SigningMethod) -> Self {
        Self {
            key_id: key_id.into(),
            value: value.into(),
            signing_method: method,
            encoding_method: default_encoding(),
            name: None,
            description: None,
            timestamp: None,
        }
    }

    /// Stamp with a signing time.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}
