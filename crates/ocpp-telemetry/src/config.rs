//! Telemetry configuration from environment variables.

use std::env;

/// Configuration for logging and metrics.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to log lines
    pub service_name: String,

    /// Log level filter directive (`info`, `ocpp_dispatch=debug,info`, ...)
    pub log_level: String,

    /// Whether to emit JSON formatted logs
    pub json_logs: bool,

    /// Whether to log source file and line
    pub with_location: bool,

    /// Port an embedding application serves `/metrics` on
    pub metrics_port: u16,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "ocpp-dispatch".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            with_location: false,
            metrics_port: 9100,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `OCPP_SERVICE_NAME`: Service name (default: ocpp-dispatch)
    /// - `OCPP_LOG_LEVEL` or `RUST_LOG`: Log filter (default: info)
    /// - `OCPP_JSON_LOGS`: Enable JSON logs (default: false in dev, true in containers)
    /// - `OCPP_LOG_LOCATION`: Include file and line (default: false)
    /// - `OCPP_METRICS_PORT`: Prometheus metrics port (default: 9100)
    pub fn from_env() -> Self {
        let is_container =
            env::var("KUBERNETES_SERVICE_HOST").is_ok() || env::var("DOCKER_CONTAINER").is_ok();
        let defaults = Self::default();

        Self {
            service_name: env::var("OCPP_SERVICE_NAME").unwrap_or(defaults.service_name),

            log_level: env::var("OCPP_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or(defaults.log_level),

            json_logs: env::var("OCPP_JSON_LOGS")
                .map(|v| parse_flag(&v))
                .unwrap_or(is_container),

            with_location: env::var("OCPP_LOG_LOCATION")
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.with_location),

            metrics_port: env::var("OCPP_METRICS_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.metrics_port),
        }
    }

    /// Configuration for a named node, e.g. `csms` or `local-controller-1`.
    pub fn for_node(node: &str) -> Self {
        let mut config = Self::from_env();
        config.service_name = format!("ocpp-{node}");
        config
    }
}

fn parse_flag(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value == "1"
}
