//! # Error Types
//!
//! Structural errors raised while parsing identifiers, frames and payloads.
//! None of these ever escape the dispatch core: each is turned into a
//! well-formed reply by the pipeline that observed it.

use crate::error_code::ErrorCode;
use thiserror::Error;

/// Errors from identifier parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    /// A networking node id was empty.
    #[error("Networking node id must not be empty")]
    EmptyNodeId,

    /// A request id was empty.
    #[error("Request id must not be empty")]
    EmptyRequestId,
}

/// Errors from the addressing model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressingError {
    /// A relayed message arrived without any hops (protocol violation).
    #[error("Network path is empty; cannot compute a reply route")]
    EmptyNetworkPath,
}

/// Errors from OCPP-J frame parsing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FrameError {
    /// Frame exceeds the configured size limit.
    #[error("Frame of {size} bytes exceeds the limit of {max} bytes")]
    TooLarge { size: usize, max: usize },

    /// Text is not valid JSON.
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    /// JSON is valid but not an array.
    #[error("Frame is not a JSON array")]
    NotAnArray,

    /// First element is missing or not an integer.
    #[error("Frame has no message type id")]
    MissingMessageType,

    /// Message type id is not one of 2, 3, 4, 5.
    #[error("Unknown message type id {0}")]
    UnknownMessageType(u64),

    /// Array has the wrong number of elements for its message type.
    #[error("Message type {message_type} expects {expected} elements, got {actual}")]
    WrongElementCount {
        message_type: u8,
        expected: usize,
        actual: usize,
    },

    /// An element has the wrong JSON type or an invalid value.
    #[error("Invalid {element}: {reason}")]
    InvalidElement {
        element: &'static str,
        reason: String,
    },

    /// Overlay frame carried an empty network path.
    #[error("Overlay frame carries an empty network path")]
    EmptyNetworkPath,
}

impl FrameError {
    /// The RPC framework error code a peer receives for this failure.
    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        match self {
            FrameError::TooLarge { .. } | FrameError::InvalidJson(_) => ErrorCode::FormatViolation,
            FrameError::UnknownMessageType(_) => ErrorCode::MessageTypeNotSupported,
            FrameError::EmptyNetworkPath => ErrorCode::ProtocolError,
            _ => ErrorCode::RpcFrameworkError,
        }
    }
}

/// Errors from parsing a payload through the message contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Payload is not a JSON object.
    #[error("{action} payload must be a JSON object")]
    NotAnObject { action: String },

    /// Payload does not match the message schema.
    #[error("Could not parse {action} payload: {reason}")]
    InvalidPayload { action: String, reason: String },

    /// The `signatures` member is malformed.
    #[error("Invalid signatures in {action} payload: {reason}")]
    InvalidSignatures { action: String, reason: String },

    /// Payload decoded but violates a constraint of the message type.
    #[error("{action} payload violates a constraint: {reason}")]
    ConstraintViolation { action: String, reason: String },

    /// Payload could not be serialized.
    #[error("Could not serialize {action} payload: {reason}")]
    Serialization { action: String, reason: String },
}

impl ParseError {
    /// The RPC framework error code a peer receives for this failure.
    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        match self {
            ParseError::ConstraintViolation { .. } => ErrorCode::PropertyConstraintViolation,
            ParseError::Serialization { .. } => ErrorCode::InternalError,
            _ => ErrorCode::FormationViolation,
        }
    }
}
