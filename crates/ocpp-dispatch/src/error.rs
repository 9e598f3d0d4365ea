//! Dispatch and transport error types.
//!
//! None of these ever reach a peer directly. Protocol-visible failures are
//! expressed as taxonomy responses or error frames; these errors cover
//! misconfiguration and local delivery problems.

use crate::config::ConfigError;
use ocpp_types::{NetworkingNodeId, RequestId};
use thiserror::Error;

/// Errors from building or driving a dispatcher.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("no transport configured")]
    MissingTransport,

    /// Two payload types claim the same action name.
    #[error("action {action} is already registered with a different payload type")]
    ActionTypeMismatch { action: &'static str },

    #[error("request {0} is already awaiting a response")]
    DuplicateRequestId(RequestId),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Errors from handing a frame to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// No connection leads to the next hop.
    #[error("no route to {0}")]
    NoRoute(NetworkingNodeId),

    /// The connection to the next hop is gone.
    #[error("connection to {0} closed")]
    Closed(NetworkingNodeId),

    #[error("send failed: {0}")]
    Send(String),
}
