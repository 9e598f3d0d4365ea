//! # Dispatcher
//!
//! Entry point of the dispatch core. A transport hands every inbound text
//! frame to [`Dispatcher::receive`]; application code registers handlers and
//! observers per action and sends requests with [`Dispatcher::send_request`].
//!
//! ## Frame routing
//!
//! | Frame            | Addressed here                    | Addressed elsewhere |
//! |------------------|-----------------------------------|---------------------|
//! | CALL             | request pipeline of the action    | relay               |
//! | CALLRESULT       | pending request, response pipeline| relay               |
//! | CALLERROR        | pending request, error pipeline   | relay               |
//! | CALLRESULTERROR  | response-error pipeline           | relay               |
//!
//! Standard-mode frames carry no addressing; they are treated as addressed
//! to this node and as originating at the connection's peer.

use crate::config::DispatcherConfig;
use crate::error::DispatchError;
use crate::events::{ExceptionEvent, ResponseErrorReceivedEvent};
use crate::handler::{Handler, HandlerId};
use crate::pending::{PendingReply, PendingRequestStore};
use crate::pipeline;
use crate::pipeline::request::InboundCall;
use crate::registry::{ActionRegistry, ActionSlots};
use crate::relay::{self, ForwardAll, ForwardingPolicy};
use crate::requester;
use crate::response_cache::SentResponseCache;
use crate::transport::{InboundFrame, OutboundFrame, Transport};
use chrono::Utc;
use ocpp_bus::{DispatchEvent, EventPublisher, InMemoryEventBus, ObserverSet};
use ocpp_crypto::{NoSignatures, SignaturePolicy};
use ocpp_types::{
    reply_route, ConnectionId, ErrorCode, FrameRejection, FrameRouting, InboundRequestMeta,
    MessageTypeId, NetworkPath, NetworkingMode, NetworkingNodeId, OcppErrorMessage, OcppFrame,
    Request, RequestId, RequestPayload, Response, SourceRouting,
};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Shortest period accepted by [`Dispatcher::spawn_maintenance`].
pub const MIN_MAINTENANCE_INTERVAL: Duration = Duration::from_millis(10);

// =============================================================================
// CORE
// =============================================================================

/// Shared state behind every clone of a [`Dispatcher`].
pub(crate) struct Core {
    pub config: DispatcherConfig,
    pub node_id: NetworkingNodeId,
    pub registry: ActionRegistry,
    pub policy: Arc<dyn SignaturePolicy>,
    pub transport: Arc<dyn Transport>,
    pub bus: Arc<InMemoryEventBus>,
    pub forwarding: Arc<dyn ForwardingPolicy>,
    pub pending: PendingRequestStore,
    pub sent_responses: SentResponseCache,
    pub exceptions: ObserverSet<ExceptionEvent>,
    pub unattributed_response_errors: ObserverSet<ResponseErrorReceivedEvent>,
    pub shutdown: CancellationToken,
}

impl Core {
    pub async fn publish(&self, event: DispatchEvent) {
        self.bus.publish(event).await;
    }

    /// Frame addressing for an outgoing frame. Standard-mode frames carry none.
    pub fn routing_for(
        &self,
        mode: NetworkingMode,
        destination: &SourceRouting,
        network_path: &NetworkPath,
    ) -> Option<FrameRouting> {
        match mode {
            NetworkingMode::Standard => None,
            NetworkingMode::OverlayNetwork => Some(FrameRouting {
                destination: destination.clone(),
                network_path: network_path.clone(),
            }),
        }
    }

    /// Send an error envelope back along `inbound_path`.
    pub async fn reply_error(
        &self,
        wrap: fn(OcppErrorMessage) -> OcppFrame,
        mode: NetworkingMode,
        connection: Option<ConnectionId>,
        inbound_path: &NetworkPath,
        error: OcppErrorMessage,
    ) {
        let route = match reply_route(inbound_path, &self.node_id) {
            Ok(route) => route,
            Err(e) => {
                warn!(
                    request_id = %error.request_id,
                    error = %e,
                    "Cannot address error reply"
                );
                return;
            }
        };

        let error_code = error.error_code.clone();
        let request_id = error.request_id.clone();
        let frame = wrap(error.with_routing(self.routing_for(
            mode,
            &route.destination,
            &route.network_path,
        )));
        let outbound = OutboundFrame {
            connection,
            next_hop: route.destination.next_hop().clone(),
            frame,
        };

        match self.transport.send(outbound).await {
            Ok(()) => debug!(
                request_id = %request_id,
                error_code = %error_code,
                destination = %route.destination,
                "Error reply sent"
            ),
            Err(e) => warn!(
                request_id = %request_id,
                error_code = %error_code,
                error = %e,
                "Failed to send error reply"
            ),
        }
    }

    /// Notify exception observers and the event bus of a fault.
    pub async fn report_exception(&self, event: ExceptionEvent) {
        self.publish(DispatchEvent::HandlerFault {
            action: event.action.clone(),
            request_id: event.request_id.clone(),
            event_tracking_id: event.event_tracking_id.unwrap_or_default(),
            reason: event.fault.clone(),
        })
        .await;
        self.exceptions.notify(event).await;
    }
}

/// Human-readable reason a spawned task did not finish.
pub(crate) fn panic_message(error: JoinError) -> String {
    if error.is_cancelled() {
        return "task cancelled".to_string();
    }
    match error.try_into_panic() {
        Ok(payload) => {
            if let Some(message) = payload.downcast_ref::<&str>() {
                (*message).to_string()
            } else if let Some(message) = payload.downcast_ref::<String>() {
                message.clone()
            } else {
                "unknown panic".to_string()
            }
        }
        Err(_) => "task failed".to_string(),
    }
}

// =============================================================================
// BUILDER
// =============================================================================

/// Assembles a [`Dispatcher`]. A transport is required.
pub struct DispatcherBuilder {
    config: DispatcherConfig,
    transport: Option<Arc<dyn Transport>>,
    policy: Arc<dyn SignaturePolicy>,
    bus: Option<Arc<InMemoryEventBus>>,
    forwarding: Arc<dyn ForwardingPolicy>,
}

impl DispatcherBuilder {
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Defaults to [`NoSignatures`].
    #[must_use]
    pub fn signature_policy(mut self, policy: Arc<dyn SignaturePolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Share an event bus with other components. A private one is created otherwise.
    #[must_use]
    pub fn event_bus(mut self, bus: Arc<InMemoryEventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Defaults to [`ForwardAll`]. Only consulted when relaying is enabled.
    #[must_use]
    pub fn forwarding_policy(mut self, policy: Arc<dyn ForwardingPolicy>) -> Self {
        self.forwarding = policy;
        self
    }

    /// # Errors
    ///
    /// `Config` if the configuration is invalid, `MissingTransport` if no
    /// transport was supplied.
    pub fn build(self) -> Result<Dispatcher, DispatchError> {
        self.config.validate()?;
        let node_id = self.config.node_id()?;
        let transport = self.transport.ok_or(DispatchError::MissingTransport)?;

        info!(
            node_id = %node_id,
            mode = ?self.config.default_networking_mode,
            relay = self.config.relay_enabled,
            "Dispatcher created"
        );

        let sent_responses = SentResponseCache::new(self.config.sent_response_ttl());
        Ok(Dispatcher {
            core: Arc::new(Core {
                node_id,
                registry: ActionRegistry::new(),
                policy: self.policy,
                transport,
                bus: self.bus.unwrap_or_default(),
                forwarding: self.forwarding,
                pending: PendingRequestStore::new(),
                sent_responses,
                exceptions: ObserverSet::new("exceptions"),
                unattributed_response_errors: ObserverSet::new("unattributed_response_errors"),
                shutdown: CancellationToken::new(),
                config: self.config,
            }),
        })
    }
}

// =============================================================================
// DISPATCHER
// =============================================================================

/// Cheaply cloneable handle to one node's dispatch core.
#[derive(Clone)]
pub struct Dispatcher {
    core: Arc<Core>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("node_id", &self.core.node_id)
            .field("actions", &self.core.registry.actions())
            .field("pending", &self.core.pending.pending_count())
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    #[must_use]
    pub fn builder(config: DispatcherConfig) -> DispatcherBuilder {
        DispatcherBuilder {
            config,
            transport: None,
            policy: Arc::new(NoSignatures),
            bus: None,
            forwarding: Arc::new(ForwardAll),
        }
    }

    #[must_use]
    pub fn node_id(&self) -> &NetworkingNodeId {
        &self.core.node_id
    }

    #[must_use]
    pub fn config(&self) -> &DispatcherConfig {
        &self.core.config
    }

    #[must_use]
    pub fn registry(&self) -> &ActionRegistry {
        &self.core.registry
    }

    /// Handler and observer slots for `P`, registering the action if needed.
    ///
    /// # Errors
    ///
    /// `ActionTypeMismatch` if another payload type owns the action name.
    pub fn register<P: RequestPayload>(&self) -> Result<Arc<ActionSlots<P>>, DispatchError> {
        self.core.registry.register::<P>()
    }

    /// Register a handler for `P`.
    pub fn on<P: RequestPayload>(
        &self,
        handler: impl Handler<P> + 'static,
    ) -> Result<HandlerId, DispatchError> {
        Ok(self.register::<P>()?.add_handler(handler))
    }

    /// Remove a handler registered with [`Dispatcher::on`].
    pub fn off<P: RequestPayload>(&self, id: HandlerId) -> bool {
        self.core
            .registry
            .slots::<P>()
            .is_some_and(|slots| slots.remove_handler(id))
    }

    /// Observers of handler faults and pipeline panics, across all actions.
    #[must_use]
    pub fn exceptions(&self) -> &ObserverSet<ExceptionEvent> {
        &self.core.exceptions
    }

    /// Observers of CALLRESULTERRORs whose response is no longer cached.
    ///
    /// The frame names no action, so these cannot reach the per-action
    /// `response_error_received` slot.
    #[must_use]
    pub fn unattributed_response_errors(&self) -> &ObserverSet<ResponseErrorReceivedEvent> {
        &self.core.unattributed_response_errors
    }

    /// Untyped lifecycle events for telemetry.
    #[must_use]
    pub fn events(&self) -> &Arc<InMemoryEventBus> {
        &self.core.bus
    }

    /// A request to `destination` with the configured default timeout.
    pub fn new_request<P: RequestPayload>(
        &self,
        destination: SourceRouting,
        payload: P,
    ) -> Request<P> {
        Request::new(destination, payload).with_timeout(self.core.config.default_request_timeout())
    }

    /// Send a request and wait for its outcome.
    ///
    /// Never fails: every failure is expressed in the response's result code.
    pub async fn send_request<P: RequestPayload>(
        &self,
        request: Request<P>,
    ) -> Response<P::Response> {
        requester::send(&self.core, request).await
    }

    /// Process one inbound text frame.
    pub async fn receive(&self, inbound: InboundFrame) {
        let core = &self.core;
        let frame = match OcppFrame::parse(&inbound.text, inbound.mode, core.config.max_frame_size)
        {
            Ok(frame) => frame,
            Err(rejection) => {
                self.reject(&inbound, rejection).await;
                return;
            }
        };

        let routing = match frame.routing() {
            Some(routing) => routing.clone(),
            None => FrameRouting {
                destination: SourceRouting::to(core.node_id.clone()),
                network_path: NetworkPath::from(inbound.peer.clone()),
            },
        };

        if !routing.destination.is_addressed_to(&core.node_id) {
            relay::forward(core, frame, routing, &inbound).await;
            return;
        }

        match frame {
            OcppFrame::Call(call) => {
                let Some(entry) = core.registry.entry(&call.action) else {
                    warn!(
                        action = %call.action,
                        request_id = %call.request_id,
                        peer = %inbound.peer,
                        "Action not implemented"
                    );
                    core.publish(DispatchEvent::FrameRejected {
                        request_id: call.request_id.clone(),
                        error_code: ErrorCode::NotImplemented,
                        reason: format!("unknown action {}", call.action),
                        connection: Some(inbound.connection),
                    })
                    .await;
                    core.reply_error(
                        OcppFrame::CallError,
                        inbound.mode,
                        Some(inbound.connection),
                        &routing.network_path,
                        OcppErrorMessage::new(
                            call.request_id,
                            ErrorCode::NotImplemented,
                            format!("Action {} is not implemented", call.action),
                        ),
                    )
                    .await;
                    return;
                };

                let request_id = call.request_id.clone();
                let event_tracking_id = inbound.event_tracking_id.unwrap_or_default();
                let inbound_path = routing.network_path.clone();
                let pipeline_call = InboundCall {
                    connection: inbound.connection,
                    mode: inbound.mode,
                    meta: InboundRequestMeta {
                        request_id: call.request_id,
                        destination: routing.destination,
                        network_path: routing.network_path,
                        event_tracking_id,
                        received_at: inbound.received_at,
                    },
                    payload: call.payload,
                };

                let task_core = Arc::clone(&self.core);
                let task_entry = Arc::clone(&entry);
                let outcome = tokio::spawn(async move {
                    task_entry.process_call(&task_core, pipeline_call).await;
                })
                .await;

                if let Err(join) = outcome {
                    let fault = panic_message(join);
                    error!(
                        action = entry.action(),
                        request_id = %request_id,
                        fault = %fault,
                        "Request pipeline panicked"
                    );
                    core.report_exception(ExceptionEvent {
                        timestamp: Utc::now(),
                        action: entry.action().to_string(),
                        request_id: request_id.clone(),
                        event_tracking_id: Some(event_tracking_id),
                        fault: fault.clone(),
                    })
                    .await;
                    core.reply_error(
                        OcppFrame::CallError,
                        inbound.mode,
                        Some(inbound.connection),
                        &inbound_path,
                        OcppErrorMessage::new(request_id, ErrorCode::InternalError, fault),
                    )
                    .await;
                }
            }
            OcppFrame::CallResult(result) => {
                let reply = PendingReply::Result {
                    payload: result.payload,
                    routing,
                    connection: inbound.connection,
                    mode: inbound.mode,
                };
                if !core.pending.complete(&result.request_id, reply) {
                    self.unmatched(&inbound, MessageTypeId::CallResult, result.request_id)
                        .await;
                }
            }
            OcppFrame::CallError(message) => {
                let request_id = message.request_id.clone();
                if !core.pending.complete(&request_id, PendingReply::Error(message)) {
                    self.unmatched(&inbound, MessageTypeId::CallError, request_id)
                        .await;
                }
            }
            OcppFrame::CallResultError(message) => {
                pipeline::error::response_error(core, Some(inbound.connection), message).await;
            }
        }
    }

    /// Answer a frame that did not parse, where the protocol allows an answer.
    async fn reject(&self, inbound: &InboundFrame, rejection: FrameRejection) {
        let core = &self.core;
        let error_code = rejection.error.error_code();
        warn!(
            peer = %inbound.peer,
            connection = %inbound.connection,
            request_id = ?rejection.request_id,
            message_type = ?rejection.message_type,
            error = %rejection,
            "Frame rejected"
        );
        core.publish(DispatchEvent::FrameRejected {
            request_id: rejection.reply_id(),
            error_code: error_code.clone(),
            reason: rejection.to_string(),
            connection: Some(inbound.connection),
        })
        .await;

        let wrap: fn(OcppErrorMessage) -> OcppFrame = match rejection.message_type {
            None | Some(MessageTypeId::Call) => OcppFrame::CallError,
            Some(MessageTypeId::CallResult) => OcppFrame::CallResultError,
            // Error envelopes are never answered.
            Some(MessageTypeId::CallError | MessageTypeId::CallResultError) => return,
        };

        core.reply_error(
            wrap,
            inbound.mode,
            Some(inbound.connection),
            &NetworkPath::from(inbound.peer.clone()),
            OcppErrorMessage::new(rejection.reply_id(), error_code, rejection.to_string()),
        )
        .await;
    }

    async fn unmatched(
        &self,
        inbound: &InboundFrame,
        message_type: MessageTypeId,
        request_id: RequestId,
    ) {
        warn!(
            request_id = %request_id,
            message_type = ?message_type,
            peer = %inbound.peer,
            "Reply to an unknown or expired request"
        );
        self.core
            .publish(DispatchEvent::FrameRejected {
                request_id,
                error_code: ErrorCode::GenericError,
                reason: "no pending request".to_string(),
                connection: Some(inbound.connection),
            })
            .await;
    }

    // =========================================================================
    // STATE
    // =========================================================================

    /// Requests sent and still awaiting a reply.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.core.pending.pending_count()
    }

    /// Sent responses still remembered for response-error correlation.
    #[must_use]
    pub fn sent_response_count(&self) -> usize {
        self.core.sent_responses.len()
    }

    #[must_use]
    pub fn pending_requests(&self) -> &PendingRequestStore {
        &self.core.pending
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Stop serving. Waiting requesters get `ExceptionOccurred`, handler
    /// contexts are cancelled.
    pub fn shutdown(&self) {
        if self.core.shutdown.is_cancelled() {
            return;
        }
        self.core.shutdown.cancel();
        let cancelled = self.core.pending.cancel_all();
        info!(
            node_id = %self.core.node_id,
            cancelled_requests = cancelled,
            "Dispatcher shut down"
        );
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.core.shutdown.is_cancelled()
    }

    /// Cancelled on shutdown. Transports use it to stop their receive loops.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.core.shutdown.clone()
    }

    /// Periodically drop expired pending requests and cached responses.
    ///
    /// Intervals shorter than [`MIN_MAINTENANCE_INTERVAL`] are raised to it.
    pub fn spawn_maintenance(&self, interval: Duration) -> JoinHandle<()> {
        let core = Arc::clone(&self.core);
        let interval = interval.max(MIN_MAINTENANCE_INTERVAL);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = core.shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let expired = core.pending.remove_expired();
                        let purged = core.sent_responses.purge_expired();
                        if expired > 0 || purged > 0 {
                            debug!(
                                expired_requests = expired,
                                purged_responses = purged,
                                "Maintenance pass"
                            );
                        }
                    }
                }
            }
        })
    }
}
