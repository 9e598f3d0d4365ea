//! # OCPP Crypto - Signature Primitives and Policy
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `signatures` | Ed25519 | Per-node message signatures |
//! | `hmac_sha256` | HMAC-SHA256 | Shared-secret message signatures |
//! | `keys` | - | Signing keys, verification key lookup |
//! | `policy` | - | Which messages must be signed and by whom |
//!
//! ## Security Properties
//!
//! - **Ed25519**: Deterministic nonces, no RNG dependency
//! - **HMAC**: Constant-time tag comparison
//! - **Secrets**: Zeroized on drop, redacted in `Debug` output

#![warn(clippy::all)]

pub mod errors;
pub mod hmac_sha256;
pub mod keys;
pub mod policy;
pub mod signatures;

// Re-exports
pub use errors::CryptoError;
pub use hmac_sha256::{sign_hmac, verify_hmac};
pub use keys::{InMemoryKeyStore, KeyProvider, SigningKey, VerificationKey};
pub use ocpp_types::MessageDirection;
pub use policy::{
    ActionMatch, NoSignatures, PolicyEntry, RuleBasedPolicy, SignaturePolicy,
    SignaturePolicyError, VerificationRule,
};
pub use signatures::{Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};
