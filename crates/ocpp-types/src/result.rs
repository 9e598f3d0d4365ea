//! # Result Taxonomy
//!
//! Every response, whether a handler produced it or the dispatch core
//! substituted it for a failure, carries a [`DispatchResult`]. Callers tell
//! real answers from substitutes only by inspecting [`ResultCode`]; the
//! response type is the same either way.

use crate::error_code::ErrorCode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome kind of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResultCode {
    /// A handler (or the peer) answered normally.
    Ok,
    /// No handler registered, or the authoritative handler returned nothing.
    Failed,
    /// Signature verification or signing failed.
    SignatureError,
    /// A received response could not be parsed (requester side only).
    FormationViolation,
    /// A handler or the pipeline faulted.
    ExceptionOccurred,
    /// The peer answered a request with a CALLERROR.
    RequestError,
    /// The peer rejected a response with a CALLRESULTERROR.
    ResponseError,
    /// No response arrived within the request timeout.
    Timeout,
}

impl ResultCode {
    /// Stable label for logs and metrics.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultCode::Ok => "ok",
            ResultCode::Failed => "failed",
            ResultCode::SignatureError => "signature_error",
            ResultCode::FormationViolation => "formation_violation",
            ResultCode::ExceptionOccurred => "exception_occurred",
            ResultCode::RequestError => "request_error",
            ResultCode::ResponseError => "response_error",
            ResultCode::Timeout => "timeout",
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result attached to every response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchResult {
    /// Outcome kind.
    pub code: ResultCode,
    /// Human-readable description.
    pub description: Option<String>,
    /// Structured details (peer error details, offending payload, ...).
    pub details: Option<serde_json::Value>,
    /// The RPC error code, when the outcome came from or maps to an error envelope.
    pub error_code: Option<ErrorCode>,
}

impl DispatchResult {
    /// A successful result.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            code: ResultCode::Ok,
            description: None,
            details: None,
            error_code: None,
        }
    }

    /// A result of the given kind with a description.
    pub fn new(code: ResultCode, description: impl Into<String>) -> Self {
        Self {
            code,
            description: Some(description.into()),
            details: None,
            error_code: None,
        }
    }

    /// Attach structured details.
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Attach an RPC error code.
    #[must_use]
    pub fn with_error_code(mut self, code: ErrorCode) -> Self {
        self.error_code = Some(code);
        self
    }

    /// Returns true for [`ResultCode::Ok`].
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.code == ResultCode::Ok
    }
}

impl Default for DispatchResult {
    fn default() -> Self {
        Self::ok()
    }
}
