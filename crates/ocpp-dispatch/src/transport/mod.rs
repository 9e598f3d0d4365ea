//! # Transport Seam
//!
//! The dispatcher never touches sockets. A transport delivers inbound text
//! frames through [`crate::Dispatcher::receive`] and accepts outbound frames
//! through [`Transport::send`]. WebSocket framing, handshakes and
//! reconnection live entirely behind this trait.

pub mod channel;

use crate::error::TransportError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ocpp_types::{ConnectionId, EventTrackingId, NetworkingMode, NetworkingNodeId, OcppFrame};

/// A text frame received on a connection.
#[derive(Debug, Clone)]
pub struct InboundFrame {
    pub connection: ConnectionId,
    /// The neighbour at the other end of the connection.
    pub peer: NetworkingNodeId,
    /// Frame layout negotiated for the connection.
    pub mode: NetworkingMode,
    pub text: String,
    /// Supplied by transports that already track operations; generated otherwise.
    pub event_tracking_id: Option<EventTrackingId>,
    pub received_at: DateTime<Utc>,
}

impl InboundFrame {
    /// A frame received now, with no event tracking id.
    pub fn new(
        connection: ConnectionId,
        peer: NetworkingNodeId,
        mode: NetworkingMode,
        text: impl Into<String>,
    ) -> Self {
        Self {
            connection,
            peer,
            mode,
            text: text.into(),
            event_tracking_id: None,
            received_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_event_tracking_id(mut self, id: EventTrackingId) -> Self {
        self.event_tracking_id = Some(id);
        self
    }
}

/// A frame the dispatcher wants delivered.
#[derive(Debug, Clone)]
pub struct OutboundFrame {
    /// Set for replies: the connection the answered frame arrived on.
    pub connection: Option<ConnectionId>,
    /// The neighbour to hand the frame to.
    pub next_hop: NetworkingNodeId,
    pub frame: OcppFrame,
}

/// Outbound half of a connection-oriented transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver a frame. Returning `Ok` means the frame was handed to the
    /// connection, not that the peer processed it.
    async fn send(&self, outbound: OutboundFrame) -> Result<(), TransportError>;
}
