//! # Message Contract
//!
//! Every OCPP action supplies a request payload type and a response payload
//! type. The dispatch core only ever touches them through the traits here and
//! the generic [`Request`]/[`Response`] envelopes, so adding an action never
//! requires a change to the core.
//!
//! ## Canonical Form
//!
//! Signatures are computed over the payload JSON with its top-level
//! `signatures` member removed, written with object keys in lexicographic
//! order and no insignificant whitespace. See [`canonical_json`].

use crate::addressing::{NetworkPath, SourceRouting};
use crate::errors::ParseError;
use crate::frame::{FrameRouting, OcppErrorMessage};
use crate::identifiers::{EventTrackingId, RequestId};
use crate::result::{DispatchResult, ResultCode};
use crate::signature::{Signature, SIGNATURES_FIELD};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt::Debug;
use std::time::Duration;

/// Default time a requester waits for a response.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// PAYLOAD TRAITS
// =============================================================================

/// A request payload for one OCPP action.
pub trait RequestPayload:
    Serialize + DeserializeOwned + Clone + Debug + Send + Sync + 'static
{
    /// Action name on the wire, e.g. `"BootNotification"`.
    const ACTION: &'static str;

    /// The matching response payload.
    type Response: ResponsePayload;

    /// Constraints serde cannot express.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// A response payload for one OCPP action.
pub trait ResponsePayload:
    Serialize + DeserializeOwned + Clone + Debug + Send + Sync + 'static
{
    /// The payload a taxonomy-mapped response carries in place of a real answer.
    fn from_failure(result: &DispatchResult) -> Self;

    /// Constraints serde cannot express.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

// =============================================================================
// REQUEST
// =============================================================================

/// A typed request and its routing metadata. Immutable once built.
#[derive(Debug, Clone)]
pub struct Request<P> {
    pub request_id: RequestId,
    /// Where the request is going; the final destination is the addressee.
    pub destination: SourceRouting,
    /// Hops traversed so far.
    pub network_path: NetworkPath,
    pub event_tracking_id: EventTrackingId,
    /// Set at creation (sender) or on receipt (receiver).
    pub request_timestamp: DateTime<Utc>,
    pub request_timeout: Duration,
    pub signatures: Vec<Signature>,
    pub payload: P,
}

/// Metadata handed to [`Request::try_parse`] by the receiving side.
#[derive(Debug, Clone)]
pub struct InboundRequestMeta {
    pub request_id: RequestId,
    pub destination: SourceRouting,
    pub network_path: NetworkPath,
    pub event_tracking_id: EventTrackingId,
    pub received_at: DateTime<Utc>,
}

impl<P: RequestPayload> Request<P> {
    /// A fresh outbound request to `destination`.
    pub fn new(destination: SourceRouting, payload: P) -> Self {
        Self {
            request_id: RequestId::new(),
            destination,
            network_path: NetworkPath::empty(),
            event_tracking_id: EventTrackingId::new(),
            request_timestamp: Utc::now(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            signatures: Vec::new(),
            payload,
        }
    }

    #[must_use]
    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = request_id;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_event_tracking_id(mut self, id: EventTrackingId) -> Self {
        self.event_tracking_id = id;
        self
    }

    #[must_use]
    pub fn with_network_path(mut self, path: NetworkPath) -> Self {
        self.network_path = path;
        self
    }

    #[must_use]
    pub fn with_signatures(mut self, signatures: Vec<Signature>) -> Self {
        self.signatures = signatures;
        self
    }

    /// The action name.
    #[must_use]
    pub fn action(&self) -> &'static str {
        P::ACTION
    }

    /// Parse an inbound payload. Never panics.
    pub fn try_parse(payload: &Value, meta: InboundRequestMeta) -> Result<Self, ParseError> {
        let (payload, signatures) = decode_payload::<P>(P::ACTION, payload)?;
        payload
            .validate()
            .map_err(|reason| ParseError::ConstraintViolation {
                action: P::ACTION.to_string(),
                reason,
            })?;

        Ok(Self {
            request_id: meta.request_id,
            destination: meta.destination,
            network_path: meta.network_path,
            event_tracking_id: meta.event_tracking_id,
            request_timestamp: meta.received_at,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            signatures,
            payload,
        })
    }

    /// The wire payload including signatures.
    pub fn to_json(&self) -> Result<Value, ParseError> {
        encode_payload(P::ACTION, &self.payload, &self.signatures)
    }

    /// Bytes covered by signatures.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, ParseError> {
        canonical_payload_bytes(P::ACTION, &self.payload)
    }
}

// =============================================================================
// RESPONSE
// =============================================================================

/// A typed response. Produced exactly once per request, whether a handler
/// answered or the dispatch core substituted a taxonomy result.
#[derive(Debug, Clone)]
pub struct Response<R> {
    pub request_id: RequestId,
    pub result: DispatchResult,
    /// Set once the response has been addressed for sending, or taken from
    /// the frame on receipt.
    pub destination: Option<SourceRouting>,
    pub network_path: NetworkPath,
    pub event_tracking_id: EventTrackingId,
    pub request_timestamp: DateTime<Utc>,
    pub response_timestamp: DateTime<Utc>,
    /// `response_timestamp - request_timestamp`, never negative.
    pub runtime: Duration,
    pub signatures: Vec<Signature>,
    pub payload: R,
}

impl<R: ResponsePayload> Response<R> {
    fn build<Q>(request: &Request<Q>, result: DispatchResult, payload: R) -> Self {
        let response_timestamp = Utc::now();
        Self {
            request_id: request.request_id.clone(),
            result,
            destination: None,
            network_path: NetworkPath::empty(),
            event_tracking_id: request.event_tracking_id,
            request_timestamp: request.request_timestamp,
            response_timestamp,
            runtime: runtime_between(request.request_timestamp, response_timestamp),
            signatures: Vec::new(),
            payload,
        }
    }

    fn substitute<Q>(request: &Request<Q>, result: DispatchResult) -> Self {
        let payload = R::from_failure(&result);
        Self::build(request, result, payload)
    }

    /// A normal answer.
    pub fn ok<Q: RequestPayload<Response = R>>(request: &Request<Q>, payload: R) -> Self {
        Self::build(request, DispatchResult::ok(), payload)
    }

    /// No handler registered, or the authoritative handler returned nothing.
    pub fn failed<Q: RequestPayload<Response = R>>(request: &Request<Q>) -> Self {
        Self::substitute(
            request,
            DispatchResult::new(ResultCode::Failed, format!("Undefined {} handler!", Q::ACTION)),
        )
    }

    /// Signature verification or signing failed.
    pub fn signature_error<Q: RequestPayload<Response = R>>(
        request: &Request<Q>,
        reason: impl Into<String>,
    ) -> Self {
        Self::substitute(request, DispatchResult::new(ResultCode::SignatureError, reason))
    }

    /// A received response could not be parsed.
    pub fn formation_violation<Q: RequestPayload<Response = R>>(
        request: &Request<Q>,
        error: &ParseError,
        raw: Value,
    ) -> Self {
        Self::substitute(
            request,
            DispatchResult::new(ResultCode::FormationViolation, error.to_string())
                .with_error_code(error.error_code())
                .with_details(raw),
        )
    }

    /// A handler or the pipeline faulted.
    pub fn exception_occurred<Q: RequestPayload<Response = R>>(
        request: &Request<Q>,
        fault: impl Into<String>,
    ) -> Self {
        Self::substitute(
            request,
            DispatchResult::new(ResultCode::ExceptionOccurred, fault)
                .with_error_code(crate::error_code::ErrorCode::InternalError),
        )
    }

    /// The peer answered the request with a CALLERROR.
    pub fn request_error<Q: RequestPayload<Response = R>>(
        request: &Request<Q>,
        error: &OcppErrorMessage,
    ) -> Self {
        let mut response = Self::substitute(request, error_result(ResultCode::RequestError, error));
        response.apply_routing(error.routing.clone());
        response
    }

    /// The peer rejected a response with a CALLRESULTERROR.
    pub fn response_error<Q: RequestPayload<Response = R>>(
        request: &Request<Q>,
        error: &OcppErrorMessage,
    ) -> Self {
        let mut response =
            Self::substitute(request, error_result(ResultCode::ResponseError, error));
        response.apply_routing(error.routing.clone());
        response
    }

    /// No response arrived within the request timeout.
    pub fn timeout<Q: RequestPayload<Response = R>>(request: &Request<Q>) -> Self {
        Self::substitute(
            request,
            DispatchResult::new(
                ResultCode::Timeout,
                format!(
                    "No {} response within {}ms",
                    Q::ACTION,
                    request.request_timeout.as_millis()
                ),
            ),
        )
    }

    /// Parse an inbound response to `request`. Never panics.
    pub fn try_parse<Q: RequestPayload<Response = R>>(
        request: &Request<Q>,
        payload: &Value,
        routing: Option<FrameRouting>,
    ) -> Result<Self, ParseError> {
        let (payload, signatures) = decode_payload::<R>(Q::ACTION, payload)?;
        payload
            .validate()
            .map_err(|reason| ParseError::ConstraintViolation {
                action: Q::ACTION.to_string(),
                reason,
            })?;

        let mut response = Self::build(request, DispatchResult::ok(), payload);
        response.signatures = signatures;
        response.apply_routing(routing);
        Ok(response)
    }

    fn apply_routing(&mut self, routing: Option<FrameRouting>) {
        if let Some(routing) = routing {
            self.destination = Some(routing.destination);
            self.network_path = routing.network_path;
        }
    }

    /// Returns true if a handler or the peer answered normally.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    /// The wire payload including signatures.
    pub fn to_json(&self, action: &str) -> Result<Value, ParseError> {
        encode_payload(action, &self.payload, &self.signatures)
    }

    /// Bytes covered by signatures.
    pub fn canonical_bytes(&self, action: &str) -> Result<Vec<u8>, ParseError> {
        canonical_payload_bytes(action, &self.payload)
    }
}

fn error_result(code: ResultCode, error: &OcppErrorMessage) -> DispatchResult {
    DispatchResult::new(code, error.description.clone())
        .with_error_code(error.error_code.clone())
        .with_details(error.details.clone())
}

/// Elapsed time between two instants, clamped at zero.
#[must_use]
pub fn runtime_between(start: DateTime<Utc>, end: DateTime<Utc>) -> Duration {
    (end - start).to_std().unwrap_or(Duration::ZERO)
}

// =============================================================================
// PAYLOAD CODEC
// =============================================================================

fn decode_payload<T: DeserializeOwned>(
    action: &str,
    payload: &Value,
) -> Result<(T, Vec<Signature>), ParseError> {
    let Value::Object(object) = payload else {
        return Err(ParseError::NotAnObject {
            action: action.to_string(),
        });
    };

    let mut object = object.clone();
    let signatures = match object.remove(SIGNATURES_FIELD) {
        None | Some(Value::Null) => Vec::new(),
        Some(raw) => serde_json::from_value::<Vec<Signature>>(raw).map_err(|e| {
            ParseError::InvalidSignatures {
                action: action.to_string(),
                reason: e.to_string(),
            }
        })?,
    };

    let decoded =
        serde_json::from_value::<T>(Value::Object(object)).map_err(|e| ParseError::InvalidPayload {
            action: action.to_string(),
            reason: e.to_string(),
        })?;
    Ok((decoded, signatures))
}

fn payload_object<T: Serialize>(action: &str, payload: &T) -> Result<Map<String, Value>, ParseError> {
    match serde_json::to_value(payload) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(_) => Err(ParseError::NotAnObject {
            action: action.to_string(),
        }),
        Err(e) => Err(ParseError::Serialization {
            action: action.to_string(),
            reason: e.to_string(),
        }),
    }
}

fn encode_payload<T: Serialize>(
    action: &str,
    payload: &T,
    signatures: &[Signature],
) -> Result<Value, ParseError> {
    let mut object = payload_object(action, payload)?;
    object.remove(SIGNATURES_FIELD);
    if !signatures.is_empty() {
        let encoded = serde_json::to_value(signatures).map_err(|e| ParseError::Serialization {
            action: action.to_string(),
            reason: e.to_string(),
        })?;
        object.insert(SIGNATURES_FIELD.to_string(), encoded);
    }
    Ok(Value::Object(object))
}

fn canonical_payload_bytes<T: Serialize>(action: &str, payload: &T) -> Result<Vec<u8>, ParseError> {
    let object = payload_object(action, payload)?;
    Ok(canonical_json(&Value::Object(object)))
}

/// Canonical bytes of a JSON payload: top-level `signatures` dropped, keys
/// sorted, no whitespace.
#[must_use]
pub fn canonical_json(value: &Value) -> Vec<u8> {
    let mut out = String::new();
    match value {
        Value::Object(object) => {
            write_object(object, &mut out, true);
        }
        other => write_value(other, &mut out),
    }
    out.into_bytes()
}

fn write_object(object: &Map<String, Value>, out: &mut String, top_level: bool) {
    let mut keys: Vec<&String> = object
        .keys()
        .filter(|key| !(top_level && key.as_str() == SIGNATURES_FIELD))
        .collect();
    keys.sort();

    out.push('{');
    for (index, key) in keys.into_iter().enumerate() {
        if index > 0 {
            out.push(',');
        }
        out.push_str(&Value::String(key.clone()).to_string());
        out.push(':');
        if let Some(value) = object.get(key) {
            write_value(value, out);
        }
    }
    out.push('}');
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Object(object) => write_object(object, out, false),
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
