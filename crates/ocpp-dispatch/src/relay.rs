//! # Relay Forwarding
//!
//! An overlay-network frame whose final destination is another node is
//! passed on: this node is appended to the network path and removed from
//! the head of the destination route. Whether to forward is decided by a
//! [`ForwardingPolicy`]. A refused CALL is answered with a `SecurityError`
//! CALLERROR; refused responses and errors are dropped.

use crate::dispatcher::Core;
use crate::transport::{InboundFrame, OutboundFrame};
use ocpp_bus::DispatchEvent;
use ocpp_types::{ErrorCode, FrameRouting, NetworkingNodeId, OcppErrorMessage, OcppFrame};
use tracing::{debug, warn};

/// Outcome of a forwarding decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardDecision {
    Forward,
    /// Refuse, telling the sender of a CALL why.
    Reject(String),
    /// Refuse silently.
    Drop,
}

/// Decides whether frames for other nodes are passed on.
pub trait ForwardingPolicy: Send + Sync {
    fn decide(
        &self,
        frame: &OcppFrame,
        routing: &FrameRouting,
        from: &NetworkingNodeId,
    ) -> ForwardDecision;
}

impl<F> ForwardingPolicy for F
where
    F: Fn(&OcppFrame, &FrameRouting, &NetworkingNodeId) -> ForwardDecision + Send + Sync,
{
    fn decide(
        &self,
        frame: &OcppFrame,
        routing: &FrameRouting,
        from: &NetworkingNodeId,
    ) -> ForwardDecision {
        (self)(frame, routing, from)
    }
}

/// Forwards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForwardAll;

impl ForwardingPolicy for ForwardAll {
    fn decide(&self, _: &OcppFrame, _: &FrameRouting, _: &NetworkingNodeId) -> ForwardDecision {
        ForwardDecision::Forward
    }
}

pub(crate) async fn forward(
    core: &Core,
    frame: OcppFrame,
    routing: FrameRouting,
    inbound: &InboundFrame,
) {
    let decision = if core.config.relay_enabled {
        core.forwarding.decide(&frame, &routing, &inbound.peer)
    } else {
        ForwardDecision::Reject(format!(
            "{} does not relay to {}",
            core.node_id,
            routing.destination.final_destination()
        ))
    };

    let remaining = match decision {
        ForwardDecision::Forward => match routing.destination.after(&core.node_id) {
            Some(remaining) => remaining,
            None => {
                let reason = format!(
                    "{} is not on the route {}",
                    core.node_id, routing.destination
                );
                refuse(core, frame, routing, inbound, reason).await;
                return;
            }
        },
        ForwardDecision::Reject(reason) => {
            refuse(core, frame, routing, inbound, reason).await;
            return;
        }
        ForwardDecision::Drop => {
            debug!(
                request_id = %frame.request_id(),
                destination = %routing.destination,
                "Frame dropped by forwarding policy"
            );
            core.publish(DispatchEvent::ForwardRejected {
                message_type: frame.message_type(),
                request_id: frame.request_id().clone(),
                reason: "dropped".to_string(),
            })
            .await;
            return;
        }
    };

    let onward = FrameRouting {
        network_path: routing.network_path.append(core.node_id.clone()),
        destination: remaining,
    };
    let next_hop = onward.destination.next_hop().clone();
    let final_destination = onward.destination.final_destination().clone();
    let message_type = frame.message_type();
    let request_id = frame.request_id().clone();

    let outbound = OutboundFrame {
        connection: None,
        next_hop: next_hop.clone(),
        frame: reroute(frame, onward),
    };
    let is_call = matches!(outbound.frame, OcppFrame::Call(_));

    match core.transport.send(outbound).await {
        Ok(()) => {
            debug!(
                request_id = %request_id,
                next_hop = %next_hop,
                final_destination = %final_destination,
                "Frame forwarded"
            );
            core.publish(DispatchEvent::Forwarded {
                message_type,
                request_id,
                next_hop,
                final_destination,
            })
            .await;
        }
        Err(error) => {
            warn!(
                request_id = %request_id,
                next_hop = %next_hop,
                error = %error,
                "Forwarding failed"
            );
            core.publish(DispatchEvent::ForwardRejected {
                message_type,
                request_id: request_id.clone(),
                reason: error.to_string(),
            })
            .await;
            if is_call {
                core.reply_error(
                    OcppFrame::CallError,
                    inbound.mode,
                    Some(inbound.connection),
                    &routing.network_path,
                    OcppErrorMessage::new(
                        request_id,
                        ErrorCode::GenericError,
                        format!("Cannot reach {final_destination}: {error}"),
                    ),
                )
                .await;
            }
        }
    }
}

async fn refuse(
    core: &Core,
    frame: OcppFrame,
    routing: FrameRouting,
    inbound: &InboundFrame,
    reason: String,
) {
    warn!(
        request_id = %frame.request_id(),
        destination = %routing.destination,
        reason = %reason,
        "Forwarding refused"
    );
    core.publish(DispatchEvent::ForwardRejected {
        message_type: frame.message_type(),
        request_id: frame.request_id().clone(),
        reason: reason.clone(),
    })
    .await;

    if let OcppFrame::Call(call) = frame {
        core.reply_error(
            OcppFrame::CallError,
            inbound.mode,
            Some(inbound.connection),
            &routing.network_path,
            OcppErrorMessage::new(call.request_id, ErrorCode::SecurityError, reason),
        )
        .await;
    }
}

fn reroute(frame: OcppFrame, routing: FrameRouting) -> OcppFrame {
    match frame {
        OcppFrame::Call(mut call) => {
            call.routing = Some(routing);
            OcppFrame::Call(call)
        }
        OcppFrame::CallResult(mut result) => {
            result.routing = Some(routing);
            OcppFrame::CallResult(result)
        }
        OcppFrame::CallError(error) => OcppFrame::CallError(error.with_routing(Some(routing))),
        OcppFrame::CallResultError(error) => {
            OcppFrame::CallResultError(error.with_routing(Some(routing)))
        }
    }
}
