//! In-memory transport over `tokio::sync::mpsc`.
//!
//! Wires dispatchers together without sockets. Each node owns one
//! [`ChannelTransport`] and one [`Inbox`]; [`ChannelTransport::link`]
//! connects two nodes in both directions and [`serve`] feeds an inbox into a
//! dispatcher.

use super::{InboundFrame, OutboundFrame, Transport};
use crate::dispatcher::Dispatcher;
use crate::error::TransportError;
use async_trait::async_trait;
use ocpp_types::{ConnectionId, NetworkingMode, NetworkingNodeId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Default inbox depth.
pub const DEFAULT_INBOX_CAPACITY: usize = 256;

/// A serialized frame in flight between two nodes.
#[derive(Debug, Clone)]
pub struct WireMessage {
    pub from: NetworkingNodeId,
    pub connection: ConnectionId,
    pub text: String,
}

/// Receiving end of a node's channel transport.
#[derive(Debug)]
pub struct Inbox {
    receiver: mpsc::Receiver<WireMessage>,
}

impl Inbox {
    /// Next frame, or `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<WireMessage> {
        self.receiver.recv().await
    }
}

#[derive(Debug, Clone)]
struct Route {
    connection: ConnectionId,
    sender: mpsc::Sender<WireMessage>,
}

/// Routes outbound frames to linked neighbours by node id.
#[derive(Debug)]
pub struct ChannelTransport {
    local: NetworkingNodeId,
    inbox: mpsc::Sender<WireMessage>,
    routes: RwLock<HashMap<NetworkingNodeId, Route>>,
}

impl ChannelTransport {
    /// Create the transport for `local` and its inbox.
    #[must_use]
    pub fn new(local: NetworkingNodeId, capacity: usize) -> (Arc<Self>, Inbox) {
        let (sender, receiver) = mpsc::channel(capacity);
        let transport = Arc::new(Self {
            local,
            inbox: sender,
            routes: RwLock::new(HashMap::new()),
        });
        (transport, Inbox { receiver })
    }

    /// Connect two nodes with one logical connection.
    pub fn link(a: &Self, b: &Self) -> ConnectionId {
        let connection = ConnectionId::new();
        a.routes.write().insert(
            b.local.clone(),
            Route {
                connection,
                sender: b.inbox.clone(),
            },
        );
        b.routes.write().insert(
            a.local.clone(),
            Route {
                connection,
                sender: a.inbox.clone(),
            },
        );
        debug!(a = %a.local, b = %b.local, connection = %connection, "Channel link established");
        connection
    }

    /// Drop the route to `peer`. Frames for it then fail with `NoRoute`.
    pub fn unlink(&self, peer: &NetworkingNodeId) -> bool {
        self.routes.write().remove(peer).is_some()
    }

    #[must_use]
    pub fn local(&self) -> &NetworkingNodeId {
        &self.local
    }

    #[must_use]
    pub fn neighbours(&self) -> Vec<NetworkingNodeId> {
        let mut peers: Vec<_> = self.routes.read().keys().cloned().collect();
        peers.sort();
        peers
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, outbound: OutboundFrame) -> Result<(), TransportError> {
        let route = self
            .routes
            .read()
            .get(&outbound.next_hop)
            .cloned()
            .ok_or_else(|| TransportError::NoRoute(outbound.next_hop.clone()))?;

        let text = outbound.frame.to_text();
        trace!(from = %self.local, to = %outbound.next_hop, frame = %text, "Channel send");

        route
            .sender
            .send(WireMessage {
                from: self.local.clone(),
                connection: route.connection,
                text,
            })
            .await
            .map_err(|_| TransportError::Closed(outbound.next_hop))
    }
}

/// Feed every frame arriving in `inbox` to `dispatcher`, each on its own task.
///
/// Stops when the dispatcher shuts down or the inbox closes.
pub fn serve(mut inbox: Inbox, dispatcher: Dispatcher, mode: NetworkingMode) -> JoinHandle<()> {
    let shutdown = dispatcher.shutdown_token();
    tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                _ = shutdown.cancelled() => break,
                message = inbox.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };

            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                let frame =
                    InboundFrame::new(message.connection, message.from, mode, message.text);
                dispatcher.receive(frame).await;
            });
        }
        debug!(node = %dispatcher.node_id(), "Channel inbox closed");
    })
}
