//! Typed lifecycle events delivered to per-action observer sets.
//!
//! These carry the full request and response. The untyped summaries that go
//! to the telemetry bus are [`ocpp_bus::DispatchEvent`].

use chrono::{DateTime, Utc};
use ocpp_types::{
    ConnectionId, EventTrackingId, NetworkingNodeId, OcppErrorMessage, Request, RequestId,
    RequestPayload, Response,
};
use serde_json::Value;
use std::time::Duration;

/// A parsed and verified request is about to reach handlers.
#[derive(Debug, Clone)]
pub struct RequestReceivedEvent<P> {
    pub timestamp: DateTime<Utc>,
    pub connection: Option<ConnectionId>,
    pub sender: Option<NetworkingNodeId>,
    pub request: Request<P>,
}

/// The response to a received request was handed to the transport.
#[derive(Debug, Clone)]
pub struct ResponseSentEvent<P: RequestPayload> {
    pub timestamp: DateTime<Utc>,
    pub connection: Option<ConnectionId>,
    pub request: Request<P>,
    pub response: Response<P::Response>,
    pub runtime: Duration,
}

/// The outcome of a request this node sent.
///
/// Fired exactly once per sent request, whether the peer answered, answered
/// with a CALLERROR, or never answered.
#[derive(Debug, Clone)]
pub struct ResponseReceivedEvent<P: RequestPayload> {
    pub timestamp: DateTime<Utc>,
    pub request: Request<P>,
    pub response: Response<P::Response>,
    pub runtime: Duration,
}

/// The peer answered a request this node sent with a CALLERROR.
#[derive(Debug, Clone)]
pub struct RequestErrorReceivedEvent<P> {
    pub timestamp: DateTime<Utc>,
    pub request: Request<P>,
    pub error: OcppErrorMessage,
}

/// The peer rejected a response this node sent with a CALLRESULTERROR.
#[derive(Debug, Clone)]
pub struct ResponseErrorReceivedEvent {
    pub timestamp: DateTime<Utc>,
    pub connection: Option<ConnectionId>,
    pub error: OcppErrorMessage,
    /// The rejected response's wire payload, while still cached.
    pub original_response: Option<Value>,
    /// From sending the response to receiving the error, while still cached.
    pub runtime: Option<Duration>,
}

/// A handler fault or pipeline panic.
#[derive(Debug, Clone)]
pub struct ExceptionEvent {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub request_id: RequestId,
    pub event_tracking_id: Option<EventTrackingId>,
    pub fault: String,
}
