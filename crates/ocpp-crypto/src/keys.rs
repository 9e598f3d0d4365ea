//! # Keys
//!
//! Signing keys held by the local node and verification keys looked up by
//! the `keyId` a signature names.

use crate::hmac_sha256::{sign_hmac, verify_hmac};
use crate::signatures::{Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};
use crate::CryptoError;
use chrono::Utc;
use ocpp_types::{Signature, SigningMethod};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use zeroize::Zeroizing;

// =============================================================================
// SIGNING KEY
// =============================================================================

/// A key this node signs outbound messages with.
#[derive(Clone)]
pub enum SigningKey {
    /// Ed25519 key pair; the key id is the hex public key unless overridden.
    Ed25519 {
        key_id: String,
        keypair: Arc<Ed25519KeyPair>,
    },
    /// Shared HMAC secret.
    HmacSha256 {
        key_id: String,
        secret: Zeroizing<Vec<u8>>,
    },
}

impl SigningKey {
    /// Ed25519 key identified by its hex public key.
    #[must_use]
    pub fn ed25519(keypair: Ed25519KeyPair) -> Self {
        let key_id = keypair.public_key().to_hex();
        Self::Ed25519 {
            key_id,
            keypair: Arc::new(keypair),
        }
    }

    /// Ed25519 key with an explicit key id.
    pub fn ed25519_named(key_id: impl Into<String>, keypair: Ed25519KeyPair) -> Self {
        Self::Ed25519 {
            key_id: key_id.into(),
            keypair: Arc::new(keypair),
        }
    }

    /// HMAC-SHA256 key.
    pub fn hmac(key_id: impl Into<String>, secret: impl Into<Vec<u8>>) -> Self {
        Self::HmacSha256 {
            key_id: key_id.into(),
            secret: Zeroizing::new(secret.into()),
        }
    }

    #[must_use]
    pub fn key_id(&self) -> &str {
        match self {
            SigningKey::Ed25519 { key_id, .. } | SigningKey::HmacSha256 { key_id, .. } => key_id,
        }
    }

    #[must_use]
    pub fn method(&self) -> SigningMethod {
        match self {
            SigningKey::Ed25519 { .. } => SigningMethod::Ed25519,
            SigningKey::HmacSha256 { .. } => SigningMethod::HmacSha256,
        }
    }

    /// The matching verification key.
    #[must_use]
    pub fn verification_key(&self) -> VerificationKey {
        match self {
            SigningKey::Ed25519 { keypair, .. } => VerificationKey::Ed25519(keypair.public_key()),
            SigningKey::HmacSha256 { secret, .. } => VerificationKey::HmacSha256(secret.clone()),
        }
    }

    /// Sign canonical bytes.
    pub fn sign(&self, canonical: &[u8]) -> Result<Signature, CryptoError> {
        let value = match self {
            SigningKey::Ed25519 { keypair, .. } => keypair.sign(canonical).to_hex(),
            SigningKey::HmacSha256 { secret, .. } => hex::encode(sign_hmac(canonical, secret)?),
        };
        Ok(Signature::new(self.key_id(), value, self.method()).with_timestamp(Utc::now()))
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("key_id", &self.key_id())
            .field("method", &self.method())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// VERIFICATION KEY
// =============================================================================

/// A key a signature can be checked against.
#[derive(Clone)]
pub enum VerificationKey {
    Ed25519(Ed25519PublicKey),
    HmacSha256(Zeroizing<Vec<u8>>),
}

impl VerificationKey {
    #[must_use]
    pub fn method(&self) -> SigningMethod {
        match self {
            VerificationKey::Ed25519(_) => SigningMethod::Ed25519,
            VerificationKey::HmacSha256(_) => SigningMethod::HmacSha256,
        }
    }

    /// Check `signature` over `canonical`.
    pub fn verify(&self, canonical: &[u8], signature: &Signature) -> Result<(), CryptoError> {
        if signature.signing_method != self.method() {
            return Err(CryptoError::MethodMismatch {
                expected: self.method().to_string(),
                actual: signature.signing_method.to_string(),
            });
        }
        if !signature.encoding_method.eq_ignore_ascii_case("hex") {
            return Err(CryptoError::UnsupportedEncoding(
                signature.encoding_method.clone(),
            ));
        }

        match self {
            VerificationKey::Ed25519(public_key) => {
                let sig = Ed25519Signature::from_hex(&signature.value)?;
                public_key.verify(canonical, &sig)
            }
            VerificationKey::HmacSha256(secret) => {
                let tag = hex::decode(&signature.value)
                    .map_err(|e| CryptoError::InvalidHex(e.to_string()))?;
                verify_hmac(canonical, &tag, secret)
            }
        }
    }
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationKey::Ed25519(key) => write!(f, "Ed25519({})", key.to_hex()),
            VerificationKey::HmacSha256(_) => f.write_str("HmacSha256(<redacted>)"),
        }
    }
}

// =============================================================================
// KEY PROVIDER
// =============================================================================

/// Trait for retrieving verification keys by key id.
///
/// Implementations might read a configuration file, derive keys from a
/// master secret or query a certificate store.
pub trait KeyProvider: Send + Sync {
    /// Returns the key for `key_id`, or `None` if it is unknown.
    fn verification_key(&self, key_id: &str) -> Option<VerificationKey>;
}

/// Thread-safe in-memory key store.
#[derive(Debug, Default)]
pub struct InMemoryKeyStore {
    keys: RwLock<HashMap<String, VerificationKey>>,
}

impl InMemoryKeyStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a key.
    pub fn insert(&self, key_id: impl Into<String>, key: VerificationKey) {
        self.keys.write().insert(key_id.into(), key);
    }

    /// Trust the verification half of a signing key under its key id.
    pub fn trust(&self, signing_key: &SigningKey) {
        self.insert(signing_key.key_id(), signing_key.verification_key());
    }

    /// Remove a key. Returns true if it was present.
    pub fn remove(&self, key_id: &str) -> bool {
        self.keys.write().remove(key_id).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.read().is_empty()
    }
}

impl KeyProvider for InMemoryKeyStore {
    fn verification_key(&self, key_id: &str) -> Option<VerificationKey> {
        self.keys.read().get(key_id).cloned()
    }
}
