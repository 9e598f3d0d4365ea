//! Inbound request pipeline.
//!
//! `Parsing -> Verifying -> NotifyingReceived -> Dispatching -> Selecting ->
//! Signing -> Addressing -> Emitting`
//!
//! A parse failure is answered with a CALLERROR and nothing else runs. Any
//! later failure substitutes a taxonomy response at the point of failure,
//! and that response still goes through signing, addressing and emission.
//! A policy or handler that panics yields `ExceptionOccurred`.

use crate::config::{HandlerSelection, SigningFailurePolicy};
use crate::dispatcher::{panic_message, Core};
use crate::events::{ExceptionEvent, RequestReceivedEvent, ResponseSentEvent};
use crate::handler::HandlerContext;
use crate::registry::ActionSlots;
use crate::response_cache::SentResponse;
use crate::transport::OutboundFrame;
use chrono::Utc;
use futures::future::join_all;
use ocpp_bus::DispatchEvent;
use ocpp_types::{
    canonical_json, reply_route, CallResultFrame, ConnectionId, InboundRequestMeta,
    MessageDirection, NetworkingMode, NetworkingNodeId, OcppErrorMessage, OcppFrame, Request,
    RequestPayload, Response, ResponsePayload,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// A CALL addressed to this node, routing already resolved.
#[derive(Debug)]
pub(crate) struct InboundCall {
    pub connection: ConnectionId,
    pub mode: NetworkingMode,
    pub meta: InboundRequestMeta,
    pub payload: Value,
}

pub(crate) async fn process<P: RequestPayload>(
    core: &Core,
    slots: &ActionSlots<P>,
    call: InboundCall,
) {
    let InboundCall {
        connection,
        mode,
        meta,
        payload,
    } = call;
    let request_id = meta.request_id.clone();
    let inbound_path = meta.network_path.clone();

    // Parsing
    let request = match Request::<P>::try_parse(&payload, meta) {
        Ok(request) => request,
        Err(error) => {
            warn!(
                action = P::ACTION,
                request_id = %request_id,
                error = %error,
                "Could not parse request"
            );
            core.publish(DispatchEvent::FrameRejected {
                request_id: request_id.clone(),
                error_code: error.error_code(),
                reason: error.to_string(),
                connection: Some(connection),
            })
            .await;
            core.reply_error(
                OcppFrame::CallError,
                mode,
                Some(connection),
                &inbound_path,
                OcppErrorMessage::new(request_id, error.error_code(), error.to_string()),
            )
            .await;
            return;
        }
    };
    let sender = request.network_path.source().cloned();

    // Verifying
    let canonical = canonical_json(&payload);
    let policy = Arc::clone(&core.policy);
    let signatures = request.signatures.clone();
    let verdict = tokio::spawn(async move {
        policy
            .verify(
                MessageDirection::Request,
                P::ACTION,
                &canonical,
                &signatures,
            )
            .await
    })
    .await;

    let response = match verdict {
        Err(join) => {
            let fault = format!("signature verification panicked: {}", panic_message(join));
            warn!(
                action = P::ACTION,
                request_id = %request.request_id,
                fault = %fault,
                "Verification fault"
            );
            core.report_exception(ExceptionEvent {
                timestamp: Utc::now(),
                action: P::ACTION.to_string(),
                request_id: request.request_id.clone(),
                event_tracking_id: Some(request.event_tracking_id),
                fault: fault.clone(),
            })
            .await;
            Response::exception_occurred(&request, fault)
        }
        Ok(Err(error)) => {
            warn!(
                action = P::ACTION,
                request_id = %request.request_id,
                error = %error,
                "Request signature rejected"
            );
            core.publish(DispatchEvent::SignatureRejected {
                action: P::ACTION.to_string(),
                request_id: request.request_id.clone(),
                direction: MessageDirection::Request,
                reason: error.to_string(),
            })
            .await;
            Response::signature_error(&request, error.to_string())
        }
        Ok(Ok(())) => {
            // NotifyingReceived
            core.publish(DispatchEvent::RequestReceived {
                action: P::ACTION.to_string(),
                request_id: request.request_id.clone(),
                event_tracking_id: request.event_tracking_id,
                sender: sender.clone(),
                connection: Some(connection),
            })
            .await;
            slots
                .request_received
                .notify(RequestReceivedEvent {
                    timestamp: Utc::now(),
                    connection: Some(connection),
                    sender: sender.clone(),
                    request: request.clone(),
                })
                .await;

            // Dispatching + Selecting
            run_handlers(core, slots, &request, sender, connection).await
        }
    };

    // Signing
    let Some((mut response, wire)) = seal(core, &request, response).await else {
        return;
    };

    // Addressing
    let route = match reply_route(&request.network_path, &core.node_id) {
        Ok(route) => route,
        Err(error) => {
            error!(
                action = P::ACTION,
                request_id = %request.request_id,
                error = %error,
                "Cannot address response"
            );
            return;
        }
    };
    response.destination = Some(route.destination.clone());
    response.network_path = route.network_path.clone();

    // Emitting
    let frame = OcppFrame::CallResult(CallResultFrame {
        routing: core.routing_for(mode, &route.destination, &route.network_path),
        request_id: request.request_id.clone(),
        payload: wire.clone(),
    });
    let outbound = OutboundFrame {
        connection: Some(connection),
        next_hop: route.destination.next_hop().clone(),
        frame,
    };
    if let Err(error) = core.transport.send(outbound).await {
        error!(
            action = P::ACTION,
            request_id = %request.request_id,
            error = %error,
            "Failed to send response"
        );
        return;
    }

    debug!(
        action = P::ACTION,
        request_id = %request.request_id,
        result = %response.result.code,
        runtime_ms = response.runtime.as_millis(),
        "Response sent"
    );

    core.sent_responses.insert(
        request.request_id.clone(),
        SentResponse {
            action: P::ACTION,
            response_timestamp: response.response_timestamp,
            payload: wire,
        },
    );

    core.publish(DispatchEvent::ResponseSent {
        action: P::ACTION.to_string(),
        request_id: request.request_id.clone(),
        event_tracking_id: request.event_tracking_id,
        result: response.result.code,
        runtime_ms: millis(response.runtime),
        destination: Some(route.destination.final_destination().clone()),
    })
    .await;

    let runtime = response.runtime;
    slots
        .response_sent
        .notify(ResponseSentEvent {
            timestamp: Utc::now(),
            connection: Some(connection),
            request,
            response,
            runtime,
        })
        .await;
}

/// Run every handler concurrently, then select the authoritative result.
async fn run_handlers<P: RequestPayload>(
    core: &Core,
    slots: &ActionSlots<P>,
    request: &Request<P>,
    sender: Option<NetworkingNodeId>,
    connection: ConnectionId,
) -> Response<P::Response> {
    let handlers = slots.handlers();
    if handlers.is_empty() {
        debug!(action = P::ACTION, request_id = %request.request_id, "No handler registered");
        return Response::failed(request);
    }

    let ctx = HandlerContext {
        timestamp: request.request_timestamp,
        sender,
        connection: Some(connection),
        event_tracking_id: request.event_tracking_id,
        cancellation: core.shutdown.child_token(),
    };
    let shared = Arc::new(request.clone());

    let tasks = handlers.into_iter().map(|handler| {
        let ctx = ctx.clone();
        let request = Arc::clone(&shared);
        tokio::spawn(async move { handler.handle(ctx, request).await })
    });

    let mut results = Vec::new();
    let mut faults = Vec::new();
    for outcome in join_all(tasks).await {
        match outcome {
            Ok(Ok(result)) => results.push(result),
            Ok(Err(fault)) => faults.push(format!("{fault:#}")),
            Err(join) => faults.push(format!("handler panicked: {}", panic_message(join))),
        }
    }

    if !faults.is_empty() {
        for fault in &faults {
            warn!(
                action = P::ACTION,
                request_id = %request.request_id,
                fault = %fault,
                "Handler fault"
            );
            core.report_exception(ExceptionEvent {
                timestamp: Utc::now(),
                action: P::ACTION.to_string(),
                request_id: request.request_id.clone(),
                event_tracking_id: Some(request.event_tracking_id),
                fault: fault.clone(),
            })
            .await;
        }
        return Response::exception_occurred(request, faults.join("; "));
    }

    let selected = match core.config.handler_selection {
        HandlerSelection::FirstRegistered => results.into_iter().next().flatten(),
        HandlerSelection::FirstPresent => results.into_iter().flatten().next(),
    };

    match selected {
        Some(payload) => match payload.validate() {
            Ok(()) => Response::ok(request, payload),
            Err(reason) => Response::exception_occurred(
                request,
                format!("Handler returned an invalid {} response: {reason}", P::ACTION),
            ),
        },
        None => Response::failed(request),
    }
}

/// Sign a response and render its wire payload.
///
/// Returns `None` when nothing may be emitted.
async fn seal<P: RequestPayload>(
    core: &Core,
    request: &Request<P>,
    mut response: Response<P::Response>,
) -> Option<(Response<P::Response>, Value)> {
    let canonical = match response.canonical_bytes(P::ACTION) {
        Ok(canonical) => canonical,
        Err(error) => {
            error!(
                action = P::ACTION,
                request_id = %request.request_id,
                error = %error,
                "Response payload does not serialize"
            );
            response = Response::exception_occurred(request, error.to_string());
            response.canonical_bytes(P::ACTION).ok()?
        }
    };

    match core
        .policy
        .sign(MessageDirection::Response, P::ACTION, &canonical)
        .await
    {
        Ok(signatures) => response.signatures = signatures,
        Err(error) => {
            warn!(
                action = P::ACTION,
                request_id = %request.request_id,
                error = %error,
                policy = ?core.config.signing_failure,
                "Signing response failed"
            );
            core.publish(DispatchEvent::SigningFailed {
                action: P::ACTION.to_string(),
                request_id: request.request_id.clone(),
                direction: MessageDirection::Response,
                reason: error.to_string(),
            })
            .await;

            match core.config.signing_failure {
                SigningFailurePolicy::SubstituteSignatureError => {
                    response = Response::signature_error(request, error.to_string());
                }
                SigningFailurePolicy::EmitUnsigned => {}
                SigningFailurePolicy::Abort => {
                    error!(
                        action = P::ACTION,
                        request_id = %request.request_id,
                        "Response withheld after signing failure"
                    );
                    return None;
                }
            }
        }
    }

    match response.to_json(P::ACTION) {
        Ok(wire) => Some((response, wire)),
        Err(error) => {
            error!(
                action = P::ACTION,
                request_id = %request.request_id,
                error = %error,
                "Cannot render response"
            );
            None
        }
    }
}

pub(crate) fn millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
