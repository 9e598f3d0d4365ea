//! # Signature Policy
//!
//! Decides which inbound signatures are required and valid, and which keys
//! sign outbound messages. Policies are stateless per call: the same
//! canonical bytes and signatures always produce the same verdict.
//!
//! ## Rules
//!
//! | Rule | No signatures | Some invalid | All valid |
//! |------|---------------|--------------|-----------|
//! | `Ignore` | ok | ok | ok |
//! | `VerifyIfPresent` | ok | reject | ok |
//! | `RequireOne` | reject | ok if one is valid | ok |
//! | `RequireAll` | reject | reject | ok |

use crate::keys::{KeyProvider, SigningKey, VerificationKey};
use crate::signatures::Ed25519PublicKey;
use crate::CryptoError;
use async_trait::async_trait;
use ocpp_types::{MessageDirection, Signature, SigningMethod};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors from verifying or producing signatures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignaturePolicyError {
    /// No signature present but the policy requires one.
    #[error("{action} {direction} must be signed")]
    Missing {
        action: String,
        direction: MessageDirection,
    },

    /// A signature names a key this node does not know.
    #[error("Unknown verification key '{key_id}'")]
    UnknownKey { key_id: String },

    /// A signature did not verify.
    #[error("Invalid signature by '{key_id}': {reason}")]
    Invalid { key_id: String, reason: CryptoError },

    /// None of the present signatures verified.
    #[error("None of {count} signature(s) on {action} {direction} is valid")]
    NoneValid {
        action: String,
        direction: MessageDirection,
        count: usize,
    },

    /// The configured signing key failed.
    #[error("Signing {action} {direction} with '{key_id}' failed: {reason}")]
    SigningFailed {
        action: String,
        direction: MessageDirection,
        key_id: String,
        reason: CryptoError,
    },
}

/// Pluggable signature rules.
#[async_trait]
pub trait SignaturePolicy: Send + Sync {
    /// Check the signatures of an inbound message.
    async fn verify(
        &self,
        direction: MessageDirection,
        action: &str,
        canonical: &[u8],
        signatures: &[Signature],
    ) -> Result<(), SignaturePolicyError>;

    /// Produce signatures for an outbound message. May return none.
    async fn sign(
        &self,
        direction: MessageDirection,
        action: &str,
        canonical: &[u8],
    ) -> Result<Vec<Signature>, SignaturePolicyError>;
}

// =============================================================================
// NO SIGNATURES
// =============================================================================

/// Accepts everything, signs nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSignatures;

#[async_trait]
impl SignaturePolicy for NoSignatures {
    async fn verify(
        &self,
        _direction: MessageDirection,
        _action: &str,
        _canonical: &[u8],
        _signatures: &[Signature],
    ) -> Result<(), SignaturePolicyError> {
        Ok(())
    }

    async fn sign(
        &self,
        _direction: MessageDirection,
        _action: &str,
        _canonical: &[u8],
    ) -> Result<Vec<Signature>, SignaturePolicyError> {
        Ok(Vec::new())
    }
}

// =============================================================================
// RULE BASED POLICY
// =============================================================================

/// How inbound signatures are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerificationRule {
    /// Do not look at signatures.
    Ignore,
    /// Every present signature must verify; none are required.
    #[default]
    VerifyIfPresent,
    /// At least one signature must verify.
    RequireOne,
    /// At least one signature, and every signature must verify.
    RequireAll,
}

/// Which actions an entry applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionMatch {
    Any,
    Action(String),
}

impl ActionMatch {
    fn matches(&self, action: &str) -> bool {
        match self {
            ActionMatch::Any => true,
            ActionMatch::Action(name) => name == action,
        }
    }
}

/// One rule of a [`RuleBasedPolicy`].
#[derive(Debug, Clone)]
pub struct PolicyEntry {
    pub direction: MessageDirection,
    pub action: ActionMatch,
    pub signer: Option<SigningKey>,
    pub rule: VerificationRule,
}

impl PolicyEntry {
    /// Entry for every action in `direction`.
    #[must_use]
    pub fn any(direction: MessageDirection) -> Self {
        Self {
            direction,
            action: ActionMatch::Any,
            signer: None,
            rule: VerificationRule::default(),
        }
    }

    /// Entry for one action in `direction`.
    pub fn action(direction: MessageDirection, action: impl Into<String>) -> Self {
        Self {
            action: ActionMatch::Action(action.into()),
            ..Self::any(direction)
        }
    }

    #[must_use]
    pub fn with_signer(mut self, signer: SigningKey) -> Self {
        self.signer = Some(signer);
        self
    }

    #[must_use]
    pub fn with_rule(mut self, rule: VerificationRule) -> Self {
        self.rule = rule;
        self
    }
}

/// Ordered entries, first match wins.
///
/// A message no entry matches is neither verified nor signed.
pub struct RuleBasedPolicy {
    entries: Vec<PolicyEntry>,
    keys: Arc<dyn KeyProvider>,
    trust_embedded_keys: bool,
}

impl RuleBasedPolicy {
    /// Create an empty policy resolving keys through `keys`.
    pub fn new(keys: Arc<dyn KeyProvider>) -> Self {
        Self {
            entries: Vec::new(),
            keys,
            trust_embedded_keys: false,
        }
    }

    /// Append an entry.
    #[must_use]
    pub fn with_entry(mut self, entry: PolicyEntry) -> Self {
        self.entries.push(entry);
        self
    }

    /// Accept Ed25519 signatures whose key id is itself a hex public key.
    #[must_use]
    pub fn trust_embedded_keys(mut self, trust: bool) -> Self {
        self.trust_embedded_keys = trust;
        self
    }

    fn entry(&self, direction: MessageDirection, action: &str) -> Option<&PolicyEntry> {
        self.entries
            .iter()
            .find(|entry| entry.direction == direction && entry.action.matches(action))
    }

    fn resolve_key(&self, signature: &Signature) -> Option<VerificationKey> {
        if let Some(key) = self.keys.verification_key(&signature.key_id) {
            return Some(key);
        }
        if self.trust_embedded_keys && signature.signing_method == SigningMethod::Ed25519 {
            return Ed25519PublicKey::from_hex(&signature.key_id)
                .ok()
                .map(VerificationKey::Ed25519);
        }
        None
    }

    fn check(&self, canonical: &[u8], signature: &Signature) -> Result<(), SignaturePolicyError> {
        let key = self
            .resolve_key(signature)
            .ok_or_else(|| SignaturePolicyError::UnknownKey {
                key_id: signature.key_id.clone(),
            })?;
        key.verify(canonical, signature)
            .map_err(|reason| SignaturePolicyError::Invalid {
                key_id: signature.key_id.clone(),
                reason,
            })
    }
}

impl fmt::Debug for RuleBasedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleBasedPolicy")
            .field("entries", &self.entries)
            .field("trust_embedded_keys", &self.trust_embedded_keys)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SignaturePolicy for RuleBasedPolicy {
    async fn verify(
        &self,
        direction: MessageDirection,
        action: &str,
        canonical: &[u8],
        signatures: &[Signature],
    ) -> Result<(), SignaturePolicyError> {
        let rule = self
            .entry(direction, action)
            .map_or(VerificationRule::Ignore, |entry| entry.rule);

        let missing = || SignaturePolicyError::Missing {
            action: action.to_string(),
            direction,
        };

        let verdict = match rule {
            VerificationRule::Ignore => Ok(()),
            VerificationRule::VerifyIfPresent => signatures
                .iter()
                .try_for_each(|signature| self.check(canonical, signature)),
            VerificationRule::RequireOne => {
                if signatures.is_empty() {
                    Err(missing())
                } else if signatures
                    .iter()
                    .any(|signature| self.check(canonical, signature).is_ok())
                {
                    Ok(())
                } else {
                    Err(SignaturePolicyError::NoneValid {
                        action: action.to_string(),
                        direction,
                        count: signatures.len(),
                    })
                }
            }
            VerificationRule::RequireAll => {
                if signatures.is_empty() {
                    Err(missing())
                } else {
                    signatures
                        .iter()
                        .try_for_each(|signature| self.check(canonical, signature))
                }
            }
        };

        match &verdict {
            Ok(()) => debug!(
                action,
                %direction,
                ?rule,
                signatures = signatures.len(),
                "Signatures accepted"
            ),
            Err(e) => warn!(action, %direction, ?rule, error = %e, "Signatures rejected"),
        }
        verdict
    }

    async fn sign(
        &self,
        direction: MessageDirection,
        action: &str,
        canonical: &[u8],
    ) -> Result<Vec<Signature>, SignaturePolicyError> {
        let Some(signer) = self
            .entry(direction, action)
            .and_then(|entry| entry.signer.as_ref())
        else {
            return Ok(Vec::new());
        };

        let signature =
            signer
                .sign(canonical)
                .map_err(|reason| SignaturePolicyError::SigningFailed {
                    action: action.to_string(),
                    direction,
                    key_id: signer.key_id().to_string(),
                    reason,
                })?;
        debug!(action, %direction, key_id = signer.key_id(), "Message signed");
        Ok(vec![signature])
    }
}
