//! Inbound response pipeline (requester side).
//!
//! A CALLRESULT that does not parse becomes a `FormationViolation` response
//! for the requester, and the responder is told with a CALLRESULTERROR. A
//! parsed response with a bad signature becomes a `SignatureError` response.

use crate::dispatcher::Core;
use ocpp_bus::DispatchEvent;
use ocpp_types::{
    canonical_json, ConnectionId, FrameRouting, MessageDirection, NetworkingMode,
    OcppErrorMessage, OcppFrame, Request, RequestPayload, Response,
};
use serde_json::Value;
use tracing::{debug, warn};

pub(crate) async fn process<P: RequestPayload>(
    core: &Core,
    request: &Request<P>,
    payload: Value,
    routing: FrameRouting,
    connection: ConnectionId,
    mode: NetworkingMode,
) -> Response<P::Response> {
    let response = match Response::<P::Response>::try_parse(request, &payload, Some(routing.clone()))
    {
        Ok(response) => response,
        Err(error) => {
            warn!(
                action = P::ACTION,
                request_id = %request.request_id,
                error = %error,
                "Could not parse response"
            );
            core.publish(DispatchEvent::FrameRejected {
                request_id: request.request_id.clone(),
                error_code: error.error_code(),
                reason: error.to_string(),
                connection: Some(connection),
            })
            .await;
            core.reply_error(
                OcppFrame::CallResultError,
                mode,
                Some(connection),
                &routing.network_path,
                OcppErrorMessage::new(
                    request.request_id.clone(),
                    error.error_code(),
                    error.to_string(),
                ),
            )
            .await;
            return Response::formation_violation(request, &error, payload);
        }
    };

    let canonical = canonical_json(&payload);
    match core
        .policy
        .verify(
            MessageDirection::Response,
            P::ACTION,
            &canonical,
            &response.signatures,
        )
        .await
    {
        Ok(()) => {
            debug!(
                action = P::ACTION,
                request_id = %request.request_id,
                runtime_ms = response.runtime.as_millis(),
                "Response received"
            );
            response
        }
        Err(error) => {
            warn!(
                action = P::ACTION,
                request_id = %request.request_id,
                error = %error,
                "Response signature rejected"
            );
            core.publish(DispatchEvent::SignatureRejected {
                action: P::ACTION.to_string(),
                request_id: request.request_id.clone(),
                direction: MessageDirection::Response,
                reason: error.to_string(),
            })
            .await;

            let mut rejected = Response::signature_error(request, error.to_string());
            rejected.destination = response.destination;
            rejected.network_path = response.network_path;
            rejected.signatures = response.signatures;
            rejected
        }
    }
}
