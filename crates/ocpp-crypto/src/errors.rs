//! Crypto error types.

use thiserror::Error;

/// Cryptographic operation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Invalid key length
    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected key length in bytes
        expected: usize,
        /// Actual key length in bytes
        actual: usize,
    },

    /// Value is not valid hex
    #[error("Invalid hex encoding: {0}")]
    InvalidHex(String),

    /// Signature verification failed
    #[error("Signature verification failed")]
    SignatureVerificationFailed,

    /// Invalid signature format
    #[error("Invalid signature format")]
    InvalidSignatureFormat,

    /// Invalid public key
    #[error("Invalid public key")]
    InvalidPublicKey,

    /// Signature was produced with a different algorithm than the key
    #[error("Signing method {actual} does not match key type {expected}")]
    MethodMismatch {
        /// Algorithm of the key
        expected: String,
        /// Algorithm named by the signature
        actual: String,
    },

    /// Unsupported encoding of a signature value
    #[error("Unsupported signature encoding: {0}")]
    UnsupportedEncoding(String),
}
