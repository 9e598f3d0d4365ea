//! # HMAC-SHA256
//!
//! Shared-secret signatures for deployments without per-node key pairs.

use crate::CryptoError;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Length of an HMAC-SHA256 tag in bytes.
pub const HMAC_TAG_LEN: usize = 32;

/// Compute the HMAC-SHA256 tag of `message`.
pub fn sign_hmac(message: &[u8], shared_secret: &[u8]) -> Result<[u8; HMAC_TAG_LEN], CryptoError> {
    let mut mac = HmacSha256::new_from_slice(shared_secret).map_err(|_| {
        CryptoError::InvalidKeyLength {
            expected: HMAC_TAG_LEN,
            actual: shared_secret.len(),
        }
    })?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().into())
}

/// Verify an HMAC-SHA256 tag.
///
/// Uses constant-time comparison.
pub fn verify_hmac(message: &[u8], tag: &[u8], shared_secret: &[u8]) -> Result<(), CryptoError> {
    if tag.len() != HMAC_TAG_LEN {
        return Err(CryptoError::InvalidSignatureFormat);
    }
    let mut mac = HmacSha256::new_from_slice(shared_secret).map_err(|_| {
        CryptoError::InvalidKeyLength {
            expected: HMAC_TAG_LEN,
            actual: shared_secret.len(),
        }
    })?;
    mac.update(message);
    mac.verify_slice(tag)
        .map_err(|_| CryptoError::SignatureVerificationFailed)
}
