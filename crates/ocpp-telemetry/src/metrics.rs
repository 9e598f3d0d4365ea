//! Prometheus metrics for the dispatch core.
//!
//! All metrics follow the naming convention: `ocpp_<metric>_<unit>`
//!
//! ## Metric Types
//!
//! - **Counter**: requests, responses, rejected frames, faults, relay outcomes
//! - **Histogram**: request runtime, labelled by the side that measured it

use lazy_static::lazy_static;
use ocpp_bus::DispatchEvent;
use ocpp_types::{MessageDirection, MessageTypeId};
use prometheus::{
    exponential_buckets, CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();
}

/// Counters and histograms fed from [`DispatchEvent`]s.
#[derive(Clone)]
pub struct DispatchMetrics {
    /// Requests that passed parsing and verification, by action
    pub requests_received: CounterVec,
    /// Responses emitted, by action and result code
    pub responses_sent: CounterVec,
    /// Outcomes of sent requests, by action and result code
    pub responses_received: CounterVec,
    /// Runtime from request to response, by action and side
    pub request_runtime: HistogramVec,
    /// CALLERROR / CALLRESULTERROR received, by kind and error code
    pub error_envelopes: CounterVec,
    /// Frames that failed to parse or correlate, by error code
    pub frames_rejected: CounterVec,
    /// Signature verification or signing failures, by direction and stage
    pub signature_failures: CounterVec,
    /// Handler faults and pipeline panics, by action
    pub handler_faults: CounterVec,
    /// Relay outcomes, by message type and outcome
    pub relayed_frames: CounterVec,
}

impl DispatchMetrics {
    /// Create the metrics and register them with `registry`.
    pub fn register(registry: &Registry) -> Result<Self, TelemetryError> {
        let metrics = Self {
            requests_received: counter(
                "ocpp_requests_received_total",
                "Requests accepted for dispatch",
                &["action"],
            )?,
            responses_sent: counter(
                "ocpp_responses_sent_total",
                "Responses emitted for received requests",
                &["action", "result"],
            )?,
            responses_received: counter(
                "ocpp_responses_received_total",
                "Outcomes of requests sent by this node",
                &["action", "result"],
            )?,
            request_runtime: HistogramVec::new(
                HistogramOpts::new(
                    "ocpp_request_runtime_seconds",
                    "Time from request to response",
                )
                .buckets(
                    exponential_buckets(0.001, 2.0, 16)
                        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?,
                ),
                &["action", "side"], // side: responder/requester
            )
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?,
            error_envelopes: counter(
                "ocpp_error_envelopes_received_total",
                "CALLERROR and CALLRESULTERROR frames received",
                &["kind", "error_code"],
            )?,
            frames_rejected: counter(
                "ocpp_frames_rejected_total",
                "Inbound frames rejected before dispatch",
                &["error_code"],
            )?,
            signature_failures: counter(
                "ocpp_signature_failures_total",
                "Signature verification and signing failures",
                &["direction", "stage"], // stage: verify/sign
            )?,
            handler_faults: counter(
                "ocpp_handler_faults_total",
                "Handler faults and pipeline panics",
                &["action"],
            )?,
            relayed_frames: counter(
                "ocpp_relayed_frames_total",
                "Frames for other nodes",
                &["message_type", "outcome"], // outcome: forwarded/rejected
            )?,
        };

        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(metrics.requests_received.clone()),
            Box::new(metrics.responses_sent.clone()),
            Box::new(metrics.responses_received.clone()),
            Box::new(metrics.request_runtime.clone()),
            Box::new(metrics.error_envelopes.clone()),
            Box::new(metrics.frames_rejected.clone()),
            Box::new(metrics.signature_failures.clone()),
            Box::new(metrics.handler_faults.clone()),
            Box::new(metrics.relayed_frames.clone()),
        ];
        for collector in collectors {
            registry
                .register(collector)
                .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
        }

        Ok(metrics)
    }

    /// Update the metrics for one event.
    pub fn record(&self, event: &DispatchEvent) {
        match event {
            DispatchEvent::RequestReceived { action, .. } => {
                self.requests_received.with_label_values(&[action.as_str()]).inc();
            }
            DispatchEvent::ResponseSent {
                action,
                result,
                runtime_ms,
                ..
            } => {
                self.responses_sent
                    .with_label_values(&[action.as_str(), result.as_str()])
                    .inc();
                self.request_runtime
                    .with_label_values(&[action.as_str(), "responder"])
                    .observe(seconds(*runtime_ms));
            }
            DispatchEvent::ResponseReceived {
                action,
                result,
                runtime_ms,
                ..
            } => {
                self.responses_received
                    .with_label_values(&[action.as_str(), result.as_str()])
                    .inc();
                self.request_runtime
                    .with_label_values(&[action.as_str(), "requester"])
                    .observe(seconds(*runtime_ms));
            }
            DispatchEvent::RequestErrorReceived { error_code, .. } => {
                self.error_envelopes
                    .with_label_values(&["request_error", error_code.as_str()])
                    .inc();
            }
            DispatchEvent::ResponseErrorReceived { error_code, .. } => {
                self.error_envelopes
                    .with_label_values(&["response_error", error_code.as_str()])
                    .inc();
            }
            DispatchEvent::FrameRejected { error_code, .. } => {
                self.frames_rejected
                    .with_label_values(&[error_code.as_str()])
                    .inc();
            }
            DispatchEvent::SignatureRejected { direction, .. } => {
                self.signature_failures
                    .with_label_values(&[direction_label(*direction), "verify"])
                    .inc();
            }
            DispatchEvent::SigningFailed { direction, .. } => {
                self.signature_failures
                    .with_label_values(&[direction_label(*direction), "sign"])
                    .inc();
            }
            DispatchEvent::HandlerFault { action, .. } => {
                self.handler_faults.with_label_values(&[action.as_str()]).inc();
            }
            DispatchEvent::Forwarded { message_type, .. } => {
                self.relayed_frames
                    .with_label_values(&[message_type_label(*message_type), "forwarded"])
                    .inc();
            }
            DispatchEvent::ForwardRejected { message_type, .. } => {
                self.relayed_frames
                    .with_label_values(&[message_type_label(*message_type), "rejected"])
                    .inc();
            }
        }
    }
}

fn counter(name: &str, help: &str, labels: &[&str]) -> Result<CounterVec, TelemetryError> {
    CounterVec::new(Opts::new(name, help), labels)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

fn seconds(millis: u64) -> f64 {
    millis as f64 / 1000.0
}

fn direction_label(direction: MessageDirection) -> &'static str {
    match direction {
        MessageDirection::Request => "request",
        MessageDirection::Response => "response",
    }
}

fn message_type_label(message_type: MessageTypeId) -> &'static str {
    match message_type {
        MessageTypeId::Call => "call",
        MessageTypeId::CallResult => "call_result",
        MessageTypeId::CallError => "call_error",
        MessageTypeId::CallResultError => "call_result_error",
    }
}

/// Register the dispatch metrics with the global [`REGISTRY`].
///
/// Fails if called twice.
pub fn register_metrics() -> Result<DispatchMetrics, TelemetryError> {
    DispatchMetrics::register(&REGISTRY)
}

/// Encode all metrics in `registry` as Prometheus text format.
pub fn encode_metrics(registry: &Registry) -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}
