//! # Dispatch Events
//!
//! Untyped summaries of protocol lifecycle events. Typed observers see the
//! full request and response; the bus carries these so that metrics, audit
//! logs and dashboards can watch every action without knowing its schema.

use ocpp_types::{
    ConnectionId, ErrorCode, EventTrackingId, MessageDirection, MessageTypeId, NetworkingNodeId,
    RequestId, ResultCode,
};
use serde::{Deserialize, Serialize};

/// All events that can be published to the event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DispatchEvent {
    // =========================================================================
    // REQUEST SIDE
    // =========================================================================
    /// A request was parsed and verified and is about to reach handlers.
    RequestReceived {
        action: String,
        request_id: RequestId,
        event_tracking_id: EventTrackingId,
        sender: Option<NetworkingNodeId>,
        connection: Option<ConnectionId>,
    },

    /// A response to a received request was handed to the transport.
    ResponseSent {
        action: String,
        request_id: RequestId,
        event_tracking_id: EventTrackingId,
        result: ResultCode,
        runtime_ms: u64,
        destination: Option<NetworkingNodeId>,
    },

    /// A response arrived for a request sent by this node.
    ResponseReceived {
        action: String,
        request_id: RequestId,
        event_tracking_id: EventTrackingId,
        result: ResultCode,
        runtime_ms: u64,
    },

    // =========================================================================
    // ERROR ENVELOPES
    // =========================================================================
    /// The peer answered a request with a CALLERROR.
    RequestErrorReceived {
        action: String,
        request_id: RequestId,
        error_code: ErrorCode,
        description: String,
    },

    /// The peer rejected one of our responses with a CALLRESULTERROR.
    ResponseErrorReceived {
        /// Known when the rejected response is still cached.
        action: Option<String>,
        request_id: RequestId,
        error_code: ErrorCode,
        description: String,
        runtime_ms: Option<u64>,
    },

    // =========================================================================
    // REJECTIONS AND FAULTS
    // =========================================================================
    /// An inbound frame could not be parsed or routed.
    FrameRejected {
        request_id: RequestId,
        error_code: ErrorCode,
        reason: String,
        connection: Option<ConnectionId>,
    },

    /// An inbound signature failed verification.
    SignatureRejected {
        action: String,
        request_id: RequestId,
        direction: MessageDirection,
        reason: String,
    },

    /// An outbound message could not be signed.
    SigningFailed {
        action: String,
        request_id: RequestId,
        direction: MessageDirection,
        reason: String,
    },

    /// A handler returned an error or panicked.
    HandlerFault {
        action: String,
        request_id: RequestId,
        event_tracking_id: EventTrackingId,
        reason: String,
    },

    // =========================================================================
    // RELAY
    // =========================================================================
    /// A frame addressed to another node was passed on.
    Forwarded {
        message_type: MessageTypeId,
        request_id: RequestId,
        next_hop: NetworkingNodeId,
        final_destination: NetworkingNodeId,
    },

    /// A frame addressed to another node was refused by the forwarding policy.
    ForwardRejected {
        message_type: MessageTypeId,
        request_id: RequestId,
        reason: String,
    },
}

impl DispatchEvent {
    /// Get the topic for this event (for filtering).
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::RequestReceived { .. } | Self::ResponseSent { .. } => EventTopic::Requests,
            Self::ResponseReceived { .. } => EventTopic::Responses,
            Self::RequestErrorReceived { .. } | Self::ResponseErrorReceived { .. } => {
                EventTopic::ErrorEnvelopes
            }
            Self::FrameRejected { .. } | Self::HandlerFault { .. } => EventTopic::Faults,
            Self::SignatureRejected { .. } | Self::SigningFailed { .. } => EventTopic::Security,
            Self::Forwarded { .. } | Self::ForwardRejected { .. } => EventTopic::Relay,
        }
    }

    /// The action this event concerns, when known.
    #[must_use]
    pub fn action(&self) -> Option<&str> {
        match self {
            Self::RequestReceived { action, .. }
            | Self::ResponseSent { action, .. }
            | Self::ResponseReceived { action, .. }
            | Self::RequestErrorReceived { action, .. }
            | Self::SignatureRejected { action, .. }
            | Self::SigningFailed { action, .. }
            | Self::HandlerFault { action, .. } => Some(action),
            Self::ResponseErrorReceived { action, .. } => action.as_deref(),
            Self::FrameRejected { .. } | Self::Forwarded { .. } | Self::ForwardRejected { .. } => {
                None
            }
        }
    }

    /// The request id this event concerns.
    #[must_use]
    pub fn request_id(&self) -> &RequestId {
        match self {
            Self::RequestReceived { request_id, .. }
            | Self::ResponseSent { request_id, .. }
            | Self::ResponseReceived { request_id, .. }
            | Self::RequestErrorReceived { request_id, .. }
            | Self::ResponseErrorReceived { request_id, .. }
            | Self::FrameRejected { request_id, .. }
            | Self::SignatureRejected { request_id, .. }
            | Self::SigningFailed { request_id, .. }
            | Self::HandlerFault { request_id, .. }
            | Self::Forwarded { request_id, .. }
            | Self::ForwardRejected { request_id, .. } => request_id,
        }
    }
}

/// Event topics for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    /// Requests received and the responses sent for them.
    Requests,
    /// Responses to requests this node sent.
    Responses,
    /// CALLERROR and CALLRESULTERROR envelopes.
    ErrorEnvelopes,
    /// Rejected frames and handler faults.
    Faults,
    /// Signature verification and signing failures.
    Security,
    /// Forwarded and refused relay traffic.
    Relay,
    /// All events (no filtering).
    All,
}

/// Filter for subscribing to specific events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topics to include. Empty means all topics.
    pub topics: Vec<EventTopic>,
    /// Actions to include. Empty means all actions; events without an
    /// action only pass an empty action list.
    pub actions: Vec<String>,
}

impl EventFilter {
    /// Create a filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific topics.
    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self {
            topics,
            actions: Vec::new(),
        }
    }

    /// Create a filter for events about specific actions.
    #[must_use]
    pub fn actions(actions: Vec<String>) -> Self {
        Self {
            topics: Vec::new(),
            actions,
        }
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &DispatchEvent) -> bool {
        let topic_match = self.topics.is_empty()
            || self.topics.contains(&EventTopic::All)
            || self.topics.contains(&event.topic());

        let action_match = self.actions.is_empty()
            || event
                .action()
                .is_some_and(|action| self.actions.iter().any(|a| a == action));

        topic_match && action_match
    }
}
