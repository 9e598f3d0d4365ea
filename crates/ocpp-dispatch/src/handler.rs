//! # Processing Handlers
//!
//! Application code answers requests by registering handlers against an
//! action. Every registered handler for an action runs for every request,
//! each on its own task with an identical [`HandlerContext`].
//!
//! A handler returns:
//! - `Ok(Some(payload))` to answer,
//! - `Ok(None)` to decline (it may still have had side effects),
//! - `Err(_)` to report a fault, which turns the response into
//!   `ExceptionOccurred` regardless of what other handlers returned.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ocpp_types::{ConnectionId, EventTrackingId, NetworkingNodeId, Request, RequestPayload};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Identical arguments handed to every handler of one request.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    /// When the request was received.
    pub timestamp: DateTime<Utc>,
    /// The node that originated the request, if known.
    pub sender: Option<NetworkingNodeId>,
    /// The connection the request arrived on.
    pub connection: Option<ConnectionId>,
    pub event_tracking_id: EventTrackingId,
    /// Cancelled when the dispatcher shuts down.
    pub cancellation: CancellationToken,
}

impl HandlerContext {
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// Handles requests of one action.
#[async_trait]
pub trait Handler<P: RequestPayload>: Send + Sync {
    async fn handle(
        &self,
        ctx: HandlerContext,
        request: Arc<Request<P>>,
    ) -> anyhow::Result<Option<P::Response>>;
}

#[async_trait]
impl<P, F, Fut> Handler<P> for F
where
    P: RequestPayload,
    F: Fn(HandlerContext, Arc<Request<P>>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Option<P::Response>>> + Send,
{
    async fn handle(
        &self,
        ctx: HandlerContext,
        request: Arc<Request<P>>,
    ) -> anyhow::Result<Option<P::Response>> {
        (self)(ctx, request).await
    }
}

/// Handle returned when a handler is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(pub(crate) u64);
