//! OCPP-J RPC framework error codes carried by CALLERROR and CALLRESULTERROR frames.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// RPC framework error code.
///
/// Codes a peer sends that are not in this list are preserved verbatim in
/// [`ErrorCode::Other`] so they can be reported back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Payload is syntactically incorrect.
    FormatViolation,
    /// Payload is syntactically correct but not conform the message schema.
    FormationViolation,
    /// Any other error not covered by the more specific codes.
    GenericError,
    /// Internal error prevented the receiver from processing the action.
    InternalError,
    /// Message type id is not supported.
    MessageTypeNotSupported,
    /// Requested action is not known by the receiver.
    NotImplemented,
    /// Requested action is recognized but not supported.
    NotSupported,
    /// A required field is missing or a field occurs too often.
    OccurrenceConstraintViolation,
    /// A field contains an invalid value.
    PropertyConstraintViolation,
    /// Payload is incomplete.
    ProtocolError,
    /// Content of the call is not a valid RPC request.
    RpcFrameworkError,
    /// Security issue prevented the receiver from completing the action.
    SecurityError,
    /// A field violates its data type constraint.
    TypeConstraintViolation,
    /// A code outside the known set.
    Other(String),
}

impl ErrorCode {
    /// Wire representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            ErrorCode::FormatViolation => "FormatViolation",
            ErrorCode::FormationViolation => "FormationViolation",
            ErrorCode::GenericError => "GenericError",
            ErrorCode::InternalError => "InternalError",
            ErrorCode::MessageTypeNotSupported => "MessageTypeNotSupported",
            ErrorCode::NotImplemented => "NotImplemented",
            ErrorCode::NotSupported => "NotSupported",
            ErrorCode::OccurrenceConstraintViolation => "OccurrenceConstraintViolation",
            ErrorCode::PropertyConstraintViolation => "PropertyConstraintViolation",
            ErrorCode::ProtocolError => "ProtocolError",
            ErrorCode::RpcFrameworkError => "RpcFrameworkError",
            ErrorCode::SecurityError => "SecurityError",
            ErrorCode::TypeConstraintViolation => "TypeConstraintViolation",
            ErrorCode::Other(code) => code,
        }
    }

    /// Parse a wire code. Never fails; unknown codes become [`ErrorCode::Other`].
    #[must_use]
    pub fn parse(text: &str) -> Self {
        match text {
            "FormatViolation" => ErrorCode::FormatViolation,
            // OCPP 1.6 spelled it this way
            "FormationViolation" => ErrorCode::FormationViolation,
            "GenericError" => ErrorCode::GenericError,
            "InternalError" => ErrorCode::InternalError,
            "MessageTypeNotSupported" => ErrorCode::MessageTypeNotSupported,
            "NotImplemented" => ErrorCode::NotImplemented,
            "NotSupported" => ErrorCode::NotSupported,
            "OccurrenceConstraintViolation" | "OccurenceConstraintViolation" => {
                ErrorCode::OccurrenceConstraintViolation
            }
            "PropertyConstraintViolation" => ErrorCode::PropertyConstraintViolation,
            "ProtocolError" => ErrorCode::ProtocolError,
            "RpcFrameworkError" => ErrorCode::RpcFrameworkError,
            "SecurityError" => ErrorCode::SecurityError,
            "TypeConstraintViolation" => ErrorCode::TypeConstraintViolation,
            other => ErrorCode::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Ok(ErrorCode::parse(&text))
    }
}
