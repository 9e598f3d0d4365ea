//! # OCPP-J Frames
//!
//! The array envelopes exchanged over a connection:
//!
//! | Kind | Standard | Overlay network |
//! |------|----------|-----------------|
//! | CALL | `[2, id, action, payload]` | `[2, destination, path, id, action, payload]` |
//! | CALLRESULT | `[3, id, payload]` | `[3, destination, path, id, payload]` |
//! | CALLERROR | `[4, id, code, description, details]` | `[4, destination, path, id, code, description, details]` |
//! | CALLRESULTERROR | `[5, id, code, description, details]` | `[5, destination, path, id, code, description, details]` |
//!
//! Parsing is structural only. Payload decoding belongs to the message
//! contract, so a frame with a malformed payload still parses here.

use crate::addressing::{NetworkPath, SourceRouting};
use crate::error_code::ErrorCode;
use crate::errors::FrameError;
use crate::identifiers::RequestId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// OCPP-J message type id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageTypeId {
    Call = 2,
    CallResult = 3,
    CallError = 4,
    CallResultError = 5,
}

impl MessageTypeId {
    fn from_u64(value: u64) -> Result<Self, FrameError> {
        match value {
            2 => Ok(Self::Call),
            3 => Ok(Self::CallResult),
            4 => Ok(Self::CallError),
            5 => Ok(Self::CallResultError),
            other => Err(FrameError::UnknownMessageType(other)),
        }
    }

    /// Element count in standard mode.
    fn standard_len(self) -> usize {
        match self {
            Self::Call => 4,
            Self::CallResult => 3,
            Self::CallError | Self::CallResultError => 5,
        }
    }
}

/// How a connection lays out frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkingMode {
    /// Plain OCPP-J; addressing is implied by the connection.
    #[default]
    Standard,
    /// Frames carry explicit destination and network path.
    OverlayNetwork,
}

impl fmt::Display for NetworkingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkingMode::Standard => f.write_str("standard"),
            NetworkingMode::OverlayNetwork => f.write_str("overlay_network"),
        }
    }
}

/// Explicit addressing carried by overlay-network frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRouting {
    pub destination: SourceRouting,
    pub network_path: NetworkPath,
}

/// A CALL frame.
#[derive(Debug, Clone, PartialEq)]
pub struct CallFrame {
    pub routing: Option<FrameRouting>,
    pub request_id: RequestId,
    pub action: String,
    pub payload: Value,
}

/// A CALLRESULT frame.
#[derive(Debug, Clone, PartialEq)]
pub struct CallResultFrame {
    pub routing: Option<FrameRouting>,
    pub request_id: RequestId,
    pub payload: Value,
}

/// A protocol-level error envelope (CALLERROR or CALLRESULTERROR).
///
/// Never handed to application handlers directly; the dispatch core maps it
/// to a typed response.
#[derive(Debug, Clone, PartialEq)]
pub struct OcppErrorMessage {
    pub routing: Option<FrameRouting>,
    pub request_id: RequestId,
    pub error_code: ErrorCode,
    pub description: String,
    pub details: Value,
    /// Creation time at the sender, or receive time for parsed frames.
    pub timestamp: DateTime<Utc>,
}

impl OcppErrorMessage {
    /// Create an error envelope with empty details.
    pub fn new(request_id: RequestId, error_code: ErrorCode, description: impl Into<String>) -> Self {
        Self {
            routing: None,
            request_id,
            error_code,
            description: description.into(),
            details: json!({}),
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    #[must_use]
    pub fn with_routing(mut self, routing: Option<FrameRouting>) -> Self {
        self.routing = routing;
        self
    }
}

/// Any OCPP-J frame.
#[derive(Debug, Clone, PartialEq)]
pub enum OcppFrame {
    Call(CallFrame),
    CallResult(CallResultFrame),
    CallError(OcppErrorMessage),
    CallResultError(OcppErrorMessage),
}

/// A frame that could not be parsed, with the request id if one was recoverable.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameRejection {
    pub request_id: Option<RequestId>,
    pub message_type: Option<MessageTypeId>,
    pub error: FrameError,
}

impl FrameRejection {
    fn new(error: FrameError) -> Self {
        Self {
            request_id: None,
            message_type: None,
            error,
        }
    }

    /// The id to reference in a wire-level error reply.
    #[must_use]
    pub fn reply_id(&self) -> RequestId {
        self.request_id.clone().unwrap_or_else(RequestId::unknown)
    }
}

impl fmt::Display for FrameRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl OcppFrame {
    /// The frame's message type id.
    #[must_use]
    pub fn message_type(&self) -> MessageTypeId {
        match self {
            OcppFrame::Call(_) => MessageTypeId::Call,
            OcppFrame::CallResult(_) => MessageTypeId::CallResult,
            OcppFrame::CallError(_) => MessageTypeId::CallError,
            OcppFrame::CallResultError(_) => MessageTypeId::CallResultError,
        }
    }

    /// The correlating request id.
    #[must_use]
    pub fn request_id(&self) -> &RequestId {
        match self {
            OcppFrame::Call(frame) => &frame.request_id,
            OcppFrame::CallResult(frame) => &frame.request_id,
            OcppFrame::CallError(error) | OcppFrame::CallResultError(error) => &error.request_id,
        }
    }

    /// Explicit addressing, present on overlay-network frames.
    #[must_use]
    pub fn routing(&self) -> Option<&FrameRouting> {
        match self {
            OcppFrame::Call(frame) => frame.routing.as_ref(),
            OcppFrame::CallResult(frame) => frame.routing.as_ref(),
            OcppFrame::CallError(error) | OcppFrame::CallResultError(error) => {
                error.routing.as_ref()
            }
        }
    }

    /// Parse a text frame laid out according to `mode`.
    pub fn parse(text: &str, mode: NetworkingMode, max_size: usize) -> Result<Self, FrameRejection> {
        if text.len() > max_size {
            return Err(FrameRejection::new(FrameError::TooLarge {
                size: text.len(),
                max: max_size,
            }));
        }

        let value: Value = serde_json::from_str(text)
            .map_err(|e| FrameRejection::new(FrameError::InvalidJson(e.to_string())))?;
        let Value::Array(elements) = value else {
            return Err(FrameRejection::new(FrameError::NotAnArray));
        };

        let message_type = elements
            .first()
            .and_then(Value::as_u64)
            .ok_or_else(|| FrameRejection::new(FrameError::MissingMessageType))
            .and_then(|id| MessageTypeId::from_u64(id).map_err(FrameRejection::new))?;

        let offset = match mode {
            NetworkingMode::Standard => 1,
            NetworkingMode::OverlayNetwork => 3,
        };

        let mut reader = FrameReader {
            elements,
            offset,
            message_type,
            request_id: None,
        };
        reader.read(mode).map_err(|error| FrameRejection {
            request_id: reader.request_id.clone(),
            message_type: Some(message_type),
            error,
        })
    }

    /// Render the frame as text. Frames with routing use the overlay layout.
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut elements = vec![json!(self.message_type() as u8)];
        if let Some(routing) = self.routing() {
            elements.push(json!(routing.destination));
            elements.push(json!(routing.network_path));
        }
        elements.push(json!(self.request_id()));
        match self {
            OcppFrame::Call(frame) => {
                elements.push(json!(frame.action));
                elements.push(frame.payload.clone());
            }
            OcppFrame::CallResult(frame) => elements.push(frame.payload.clone()),
            OcppFrame::CallError(error) | OcppFrame::CallResultError(error) => {
                elements.push(json!(error.error_code));
                elements.push(json!(error.description));
                elements.push(error.details.clone());
            }
        }
        Value::Array(elements).to_string()
    }
}

// =============================================================================
// PARSING
// =============================================================================

struct FrameReader {
    elements: Vec<Value>,
    /// Index of the request id.
    offset: usize,
    message_type: MessageTypeId,
    request_id: Option<RequestId>,
}

impl FrameReader {
    fn read(&mut self, mode: NetworkingMode) -> Result<OcppFrame, FrameError> {
        // Recover the id first so length errors can still be answered.
        self.request_id = self
            .elements
            .get(self.offset)
            .and_then(Value::as_str)
            .and_then(|id| RequestId::parse(id).ok());

        let expected = self.message_type.standard_len() + self.offset - 1;
        let actual = self.elements.len();
        let details_optional = matches!(
            self.message_type,
            MessageTypeId::CallError | MessageTypeId::CallResultError
        );
        if actual != expected && !(details_optional && actual + 1 == expected) {
            return Err(FrameError::WrongElementCount {
                message_type: self.message_type as u8,
                expected,
                actual,
            });
        }

        let routing = match mode {
            NetworkingMode::Standard => None,
            NetworkingMode::OverlayNetwork => Some(self.routing()?),
        };
        let request_id = self.request_id.clone().ok_or_else(|| FrameError::InvalidElement {
            element: "request id",
            reason: "expected a non-empty string".into(),
        })?;

        let frame = match self.message_type {
            MessageTypeId::Call => {
                let action = self
                    .element(self.offset + 1)
                    .as_str()
                    .filter(|action| !action.is_empty())
                    .ok_or_else(|| FrameError::InvalidElement {
                        element: "action",
                        reason: "expected a non-empty string".into(),
                    })?
                    .to_string();
                OcppFrame::Call(CallFrame {
                    routing,
                    request_id,
                    action,
                    payload: self.element(self.offset + 2),
                })
            }
            MessageTypeId::CallResult => OcppFrame::CallResult(CallResultFrame {
                routing,
                request_id,
                payload: self.element(self.offset + 1),
            }),
            MessageTypeId::CallError | MessageTypeId::CallResultError => {
                let error = self.error_message(routing, request_id)?;
                if self.message_type == MessageTypeId::CallError {
                    OcppFrame::CallError(error)
                } else {
                    OcppFrame::CallResultError(error)
                }
            }
        };
        Ok(frame)
    }

    fn element(&self, index: usize) -> Value {
        self.elements.get(index).cloned().unwrap_or(Value::Null)
    }

    fn routing(&self) -> Result<FrameRouting, FrameError> {
        let destination: SourceRouting =
            serde_json::from_value(self.element(1)).map_err(|e| FrameError::InvalidElement {
                element: "destination",
                reason: e.to_string(),
            })?;
        let network_path: NetworkPath =
            serde_json::from_value(self.element(2)).map_err(|e| FrameError::InvalidElement {
                element: "network path",
                reason: e.to_string(),
            })?;
        if network_path.is_empty() {
            return Err(FrameError::EmptyNetworkPath);
        }
        Ok(FrameRouting {
            destination,
            network_path,
        })
    }

    fn error_message(
        &self,
        routing: Option<FrameRouting>,
        request_id: RequestId,
    ) -> Result<OcppErrorMessage, FrameError> {
        let error_code = self
            .element(self.offset + 1)
            .as_str()
            .map(ErrorCode::parse)
            .ok_or_else(|| FrameError::InvalidElement {
                element: "error code",
                reason: "expected a string".into(),
            })?;
        let description = match self.element(self.offset + 2) {
            Value::String(text) => text,
            Value::Null => String::new(),
            _ => {
                return Err(FrameError::InvalidElement {
                    element: "error description",
                    reason: "expected a string".into(),
                })
            }
        };
        let details = match self.element(self.offset + 3) {
            Value::Null => json!({}),
            other => other,
        };
        Ok(OcppErrorMessage {
            routing,
            request_id,
            error_code,
            description,
            details,
            timestamp: Utc::now(),
        })
    }
}
