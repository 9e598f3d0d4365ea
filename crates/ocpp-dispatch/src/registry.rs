//! # Action Registry
//!
//! Explicit table from action name to that action's handler and observer
//! slots, built at startup. Every action runs through the same generic
//! pipelines; the registry only supplies the typed slots.
//!
//! ## Concurrency
//!
//! Handlers and observers may be added or removed at any time. Lists are
//! guarded by `parking_lot::RwLock`; the pipelines take a snapshot under the
//! read lock and release it before the first `.await`.

use crate::dispatcher::Core;
use crate::error::DispatchError;
use crate::events::{
    RequestErrorReceivedEvent, RequestReceivedEvent, ResponseErrorReceivedEvent,
    ResponseReceivedEvent, ResponseSentEvent,
};
use crate::handler::{Handler, HandlerId};
use crate::pipeline::request::{self, InboundCall};
use async_trait::async_trait;
use ocpp_bus::ObserverSet;
use ocpp_types::RequestPayload;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

// =============================================================================
// ACTION SLOTS
// =============================================================================

/// Handlers and observers for one action.
pub struct ActionSlots<P: RequestPayload> {
    handlers: RwLock<Vec<(HandlerId, Arc<dyn Handler<P>>)>>,
    next_handler: AtomicU64,

    /// A request passed parsing and verification.
    pub request_received: ObserverSet<RequestReceivedEvent<P>>,
    /// A response to a received request was emitted.
    pub response_sent: ObserverSet<ResponseSentEvent<P>>,
    /// A request this node sent has its outcome.
    pub response_received: ObserverSet<ResponseReceivedEvent<P>>,
    /// A request this node sent was answered with a CALLERROR.
    pub request_error_received: ObserverSet<RequestErrorReceivedEvent<P>>,
    /// A response this node sent was rejected with a CALLRESULTERROR.
    pub response_error_received: ObserverSet<ResponseErrorReceivedEvent>,
}

impl<P: RequestPayload> ActionSlots<P> {
    fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
            next_handler: AtomicU64::new(1),
            request_received: ObserverSet::new(P::ACTION),
            response_sent: ObserverSet::new(P::ACTION),
            response_received: ObserverSet::new(P::ACTION),
            request_error_received: ObserverSet::new(P::ACTION),
            response_error_received: ObserverSet::new(P::ACTION),
        }
    }

    /// Append a handler. Registration order decides which result is authoritative.
    pub fn add_handler(&self, handler: impl Handler<P> + 'static) -> HandlerId {
        let id = HandlerId(self.next_handler.fetch_add(1, Ordering::Relaxed));
        self.handlers.write().push((id, Arc::new(handler)));
        debug!(action = P::ACTION, handler = id.0, "Handler registered");
        id
    }

    /// Remove a handler. Returns true if it was registered.
    pub fn remove_handler(&self, id: HandlerId) -> bool {
        let mut handlers = self.handlers.write();
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        before != handlers.len()
    }

    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }

    /// Handlers in registration order.
    pub(crate) fn handlers(&self) -> Vec<Arc<dyn Handler<P>>> {
        self.handlers
            .read()
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect()
    }
}

impl<P: RequestPayload> fmt::Debug for ActionSlots<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionSlots")
            .field("action", &P::ACTION)
            .field("handlers", &self.handler_count())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// TYPE ERASURE
// =============================================================================

/// What the dispatcher needs from an action without knowing its payload type.
#[async_trait]
pub(crate) trait ActionEntry: Send + Sync {
    fn action(&self) -> &'static str;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    /// Run the inbound request pipeline.
    async fn process_call(&self, core: &Core, call: InboundCall);

    async fn notify_response_error(&self, event: ResponseErrorReceivedEvent);
}

#[async_trait]
impl<P: RequestPayload> ActionEntry for ActionSlots<P> {
    fn action(&self) -> &'static str {
        P::ACTION
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    async fn process_call(&self, core: &Core, call: InboundCall) {
        request::process::<P>(core, self, call).await;
    }

    async fn notify_response_error(&self, event: ResponseErrorReceivedEvent) {
        self.response_error_received.notify(event).await;
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Map from action name to typed slots.
#[derive(Default)]
pub struct ActionRegistry {
    actions: RwLock<HashMap<&'static str, Arc<dyn ActionEntry>>>,
}

impl ActionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `P`'s action, or return its existing slots.
    ///
    /// # Errors
    ///
    /// `ActionTypeMismatch` if another payload type already owns the action name.
    pub fn register<P: RequestPayload>(&self) -> Result<Arc<ActionSlots<P>>, DispatchError> {
        let existing = self.actions.read().get(P::ACTION).cloned();
        let entry = match existing {
            Some(entry) => entry,
            None => self
                .actions
                .write()
                .entry(P::ACTION)
                .or_insert_with(|| {
                    debug!(action = P::ACTION, "Action registered");
                    let slots: Arc<dyn ActionEntry> = Arc::new(ActionSlots::<P>::new());
                    slots
                })
                .clone(),
        };

        entry
            .into_any()
            .downcast::<ActionSlots<P>>()
            .map_err(|_| DispatchError::ActionTypeMismatch { action: P::ACTION })
    }

    /// Slots for `P`, if registered with that payload type.
    #[must_use]
    pub fn slots<P: RequestPayload>(&self) -> Option<Arc<ActionSlots<P>>> {
        let entry = self.actions.read().get(P::ACTION).cloned()?;
        entry.into_any().downcast::<ActionSlots<P>>().ok()
    }

    pub(crate) fn entry(&self, action: &str) -> Option<Arc<dyn ActionEntry>> {
        self.actions.read().get(action).cloned()
    }

    #[must_use]
    pub fn contains(&self, action: &str) -> bool {
        self.actions.read().contains_key(action)
    }

    /// Registered action names, sorted.
    #[must_use]
    pub fn actions(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.actions.read().keys().copied().collect();
        names.sort_unstable();
        names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.read().is_empty()
    }
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("actions", &self.actions())
            .finish()
    }
}
