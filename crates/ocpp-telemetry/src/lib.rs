//! # OCPP Telemetry
//!
//! Observability for the dispatch core.
//!
//! ## Components
//!
//! - **Logging**: `tracing` subscriber with pretty or JSON output
//! - **Metrics**: Prometheus counters and histograms fed from the event bus
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ocpp_telemetry::{init_telemetry, spawn_metrics_recorder, TelemetryConfig};
//!
//! let metrics = init_telemetry(&TelemetryConfig::from_env())?;
//! spawn_metrics_recorder(dispatcher.events(), metrics, dispatcher.shutdown_token());
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `OCPP_SERVICE_NAME` | `ocpp-dispatch` | Service name in logs |
//! | `OCPP_LOG_LEVEL` | `info` | Log filter |
//! | `OCPP_JSON_LOGS` | `false` | JSON log lines |
//! | `OCPP_LOG_LOCATION` | `false` | File and line in logs |
//! | `OCPP_METRICS_PORT` | `9100` | Prometheus port |

#![cfg_attr(test, allow(clippy::unwrap_used))]

mod config;
mod logging;
pub mod metrics;
mod recorder;

pub use config::TelemetryConfig;
pub use logging::{env_filter, init_logging};
pub use metrics::{encode_metrics, register_metrics, DispatchMetrics, REGISTRY};
pub use recorder::{record_event, spawn_metrics_recorder};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Install logging and register metrics with the global registry.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<DispatchMetrics, TelemetryError> {
    let metrics = register_metrics()?;
    init_logging(config)?;
    Ok(metrics)
}
