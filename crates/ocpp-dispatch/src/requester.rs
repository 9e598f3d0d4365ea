//! Requester side: send a CALL and await its outcome.
//!
//! Every path ends in exactly one typed response and exactly one
//! response-received notification, whether the peer answered, answered with
//! a CALLERROR, never answered, or the request could not be sent at all.

use crate::config::SigningFailurePolicy;
use crate::dispatcher::Core;
use crate::events::ResponseReceivedEvent;
use crate::pending::PendingReply;
use crate::pipeline::request::millis;
use crate::pipeline::{error as error_pipeline, response as response_pipeline};
use crate::registry::ActionSlots;
use crate::transport::OutboundFrame;
use chrono::Utc;
use ocpp_bus::DispatchEvent;
use ocpp_types::{
    CallFrame, MessageDirection, NetworkPath, OcppFrame, Request, RequestPayload, Response,
};
use tracing::{debug, error, warn};

pub(crate) async fn send<P: RequestPayload>(
    core: &Core,
    mut request: Request<P>,
) -> Response<P::Response> {
    let slots = match core.registry.register::<P>() {
        Ok(slots) => slots,
        Err(error) => {
            error!(action = P::ACTION, error = %error, "Cannot send request");
            return Response::exception_occurred(&request, error.to_string());
        }
    };

    if request.network_path.is_empty() {
        request.network_path = NetworkPath::from(core.node_id.clone());
    }

    let response = exchange(core, &slots, &mut request).await;

    core.publish(DispatchEvent::ResponseReceived {
        action: P::ACTION.to_string(),
        request_id: request.request_id.clone(),
        event_tracking_id: request.event_tracking_id,
        result: response.result.code,
        runtime_ms: millis(response.runtime),
    })
    .await;

    slots
        .response_received
        .notify(ResponseReceivedEvent {
            timestamp: Utc::now(),
            request,
            response: response.clone(),
            runtime: response.runtime,
        })
        .await;

    response
}

async fn exchange<P: RequestPayload>(
    core: &Core,
    slots: &ActionSlots<P>,
    request: &mut Request<P>,
) -> Response<P::Response> {
    // Caller-supplied signatures are sent as they are.
    if request.signatures.is_empty() {
        let canonical = match request.canonical_bytes() {
            Ok(canonical) => canonical,
            Err(error) => return Response::exception_occurred(request, error.to_string()),
        };
        match core
            .policy
            .sign(MessageDirection::Request, P::ACTION, &canonical)
            .await
        {
            Ok(signatures) => request.signatures = signatures,
            Err(error) => {
                warn!(
                    action = P::ACTION,
                    request_id = %request.request_id,
                    error = %error,
                    policy = ?core.config.signing_failure,
                    "Signing request failed"
                );
                core.publish(DispatchEvent::SigningFailed {
                    action: P::ACTION.to_string(),
                    request_id: request.request_id.clone(),
                    direction: MessageDirection::Request,
                    reason: error.to_string(),
                })
                .await;
                if core.config.signing_failure != SigningFailurePolicy::EmitUnsigned {
                    return Response::signature_error(request, error.to_string());
                }
            }
        }
    }

    let payload = match request.to_json() {
        Ok(payload) => payload,
        Err(error) => return Response::exception_occurred(request, error.to_string()),
    };

    let reply = match core.pending.register(
        request.request_id.clone(),
        P::ACTION,
        request.request_timeout,
    ) {
        Ok(reply) => reply,
        Err(error) => return Response::exception_occurred(request, error.to_string()),
    };

    let frame = OcppFrame::Call(CallFrame {
        routing: core.routing_for(
            core.config.default_networking_mode,
            &request.destination,
            &request.network_path,
        ),
        request_id: request.request_id.clone(),
        action: P::ACTION.to_string(),
        payload,
    });
    let outbound = OutboundFrame {
        connection: None,
        next_hop: request.destination.next_hop().clone(),
        frame,
    };

    if let Err(error) = core.transport.send(outbound).await {
        core.pending.cancel(&request.request_id);
        error!(
            action = P::ACTION,
            request_id = %request.request_id,
            error = %error,
            "Failed to send request"
        );
        return Response::exception_occurred(request, format!("Transport failure: {error}"));
    }

    debug!(
        action = P::ACTION,
        request_id = %request.request_id,
        destination = %request.destination,
        timeout_ms = request.request_timeout.as_millis(),
        "Request sent"
    );

    let outcome = tokio::select! {
        _ = core.shutdown.cancelled() => {
            core.pending.cancel(&request.request_id);
            return Response::exception_occurred(request, "Dispatcher shut down");
        }
        outcome = tokio::time::timeout(request.request_timeout, reply) => outcome,
    };

    match outcome {
        Ok(Ok(PendingReply::Result {
            payload,
            routing,
            connection,
            mode,
        })) => response_pipeline::process(core, request, payload, routing, connection, mode).await,
        Ok(Ok(PendingReply::Error(message))) => {
            error_pipeline::request_error(core, slots, request, message).await
        }
        Ok(Err(_)) => Response::exception_occurred(request, "Pending request was cancelled"),
        Err(_) => {
            core.pending.expire(&request.request_id);
            warn!(
                action = P::ACTION,
                request_id = %request.request_id,
                timeout_ms = request.request_timeout.as_millis(),
                "Request timed out"
            );
            Response::timeout(request)
        }
    }
}
