//! Error-envelope pipelines.
//!
//! - CALLERROR for a request this node sent: notify request-error observers,
//!   then map to a `RequestError` response for the requester.
//! - CALLRESULTERROR for a response this node sent: notify response-error
//!   observers only. Nothing is sent back. Once the sent response is no
//!   longer cached the action is unknown, and the dispatcher-wide
//!   unattributed observers are notified instead.

use crate::dispatcher::Core;
use crate::events::{RequestErrorReceivedEvent, ResponseErrorReceivedEvent};
use crate::pipeline::request::millis;
use crate::registry::ActionSlots;
use chrono::Utc;
use ocpp_bus::DispatchEvent;
use ocpp_types::{
    runtime_between, ConnectionId, OcppErrorMessage, Request, RequestPayload, Response,
};
use tracing::{debug, warn};

pub(crate) async fn request_error<P: RequestPayload>(
    core: &Core,
    slots: &ActionSlots<P>,
    request: &Request<P>,
    error: OcppErrorMessage,
) -> Response<P::Response> {
    warn!(
        action = P::ACTION,
        request_id = %request.request_id,
        error_code = %error.error_code,
        description = %error.description,
        "Request answered with CALLERROR"
    );

    core.publish(DispatchEvent::RequestErrorReceived {
        action: P::ACTION.to_string(),
        request_id: request.request_id.clone(),
        error_code: error.error_code.clone(),
        description: error.description.clone(),
    })
    .await;

    slots
        .request_error_received
        .notify(RequestErrorReceivedEvent {
            timestamp: Utc::now(),
            request: request.clone(),
            error: error.clone(),
        })
        .await;

    Response::request_error(request, &error)
}

pub(crate) async fn response_error(
    core: &Core,
    connection: Option<ConnectionId>,
    error: OcppErrorMessage,
) {
    let original = core.sent_responses.take(&error.request_id);
    let runtime = original
        .as_ref()
        .map(|sent| runtime_between(sent.response_timestamp, error.timestamp));
    let action = original.as_ref().map(|sent| sent.action);

    warn!(
        action = action.unwrap_or("unknown"),
        request_id = %error.request_id,
        error_code = %error.error_code,
        description = %error.description,
        "Response rejected with CALLRESULTERROR"
    );

    core.publish(DispatchEvent::ResponseErrorReceived {
        action: action.map(str::to_string),
        request_id: error.request_id.clone(),
        error_code: error.error_code.clone(),
        description: error.description.clone(),
        runtime_ms: runtime.map(millis),
    })
    .await;

    let event = ResponseErrorReceivedEvent {
        timestamp: Utc::now(),
        connection,
        error,
        original_response: original.map(|sent| sent.payload),
        runtime,
    };

    match action.and_then(|action| core.registry.entry(action)) {
        Some(entry) => entry.notify_response_error(event).await,
        None => {
            debug!(
                request_id = %event.error.request_id,
                "No cached response for CALLRESULTERROR"
            );
            core.unattributed_response_errors.notify(event).await;
        }
    }
}
