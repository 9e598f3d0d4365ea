//! Dispatcher configuration with validation.

use ocpp_types::{NetworkingMode, NetworkingNodeId, DEFAULT_MAX_FRAME_SIZE};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Which handler result becomes the response when several handlers are registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerSelection {
    /// The first registered handler is authoritative, in registration order.
    /// If it returns nothing the response is `Failed`, even if a later
    /// handler returned a value.
    #[default]
    FirstRegistered,
    /// The first handler, in registration order, that returned a value.
    FirstPresent,
}

/// What happens when an outbound message cannot be signed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SigningFailurePolicy {
    /// Replace the response with an unsigned `SignatureError` response.
    /// An outbound request is not sent; the requester gets a `SignatureError`.
    #[default]
    SubstituteSignatureError,
    /// Send the message without signatures.
    EmitUnsigned,
    /// Send nothing. The peer will time out.
    Abort,
}

/// Dispatcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Identity of this node on the network.
    pub node_id: String,
    /// Frame layout for requests this node originates.
    pub default_networking_mode: NetworkingMode,
    /// Timeout applied to requests built through the dispatcher.
    pub default_request_timeout_ms: u64,
    /// How long sent responses are remembered for response-error correlation.
    pub sent_response_ttl_ms: u64,
    /// Response selection among concurrent handlers.
    pub handler_selection: HandlerSelection,
    /// Outbound signing failure handling.
    pub signing_failure: SigningFailurePolicy,
    /// Forward overlay frames addressed to other nodes.
    pub relay_enabled: bool,
    /// Largest inbound frame accepted, in bytes.
    pub max_frame_size: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            node_id: "CSMS".to_string(),
            default_networking_mode: NetworkingMode::Standard,
            default_request_timeout_ms: 30_000,
            sent_response_ttl_ms: 120_000,
            handler_selection: HandlerSelection::FirstRegistered,
            signing_failure: SigningFailurePolicy::SubstituteSignatureError,
            relay_enabled: false,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl DispatcherConfig {
    /// Configuration for `node_id` with every other setting at its default.
    pub fn for_node(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            ..Self::default()
        }
    }

    /// Load overrides from environment variables.
    ///
    /// - `OCPP_NODE_ID`
    /// - `OCPP_REQUEST_TIMEOUT_SECS`
    /// - `OCPP_NETWORKING_MODE` (`standard` or `overlay_network`)
    /// - `OCPP_RELAY_ENABLED` (`true`/`1`)
    ///
    /// Unparseable values keep their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            node_id: env::var("OCPP_NODE_ID").unwrap_or(defaults.node_id),
            default_networking_mode: env::var("OCPP_NETWORKING_MODE")
                .ok()
                .and_then(|v| parse_networking_mode(&v))
                .unwrap_or(defaults.default_networking_mode),
            default_request_timeout_ms: env::var("OCPP_REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map_or(defaults.default_request_timeout_ms, |secs| {
                    secs.saturating_mul(1000)
                }),
            relay_enabled: env::var("OCPP_RELAY_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.relay_enabled),
            ..defaults
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.node_id()?;

        if self.default_request_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout(
                "default_request_timeout_ms cannot be 0".into(),
            ));
        }

        if self.sent_response_ttl_ms == 0 {
            return Err(ConfigError::InvalidTimeout(
                "sent_response_ttl_ms cannot be 0".into(),
            ));
        }

        if self.max_frame_size == 0 {
            return Err(ConfigError::InvalidLimit("max_frame_size cannot be 0".into()));
        }

        Ok(())
    }

    /// The configured node id, parsed.
    pub fn node_id(&self) -> Result<NetworkingNodeId, ConfigError> {
        NetworkingNodeId::parse(&self.node_id)
            .map_err(|e| ConfigError::InvalidNodeId(e.to_string()))
    }

    #[must_use]
    pub fn default_request_timeout(&self) -> Duration {
        Duration::from_millis(self.default_request_timeout_ms)
    }

    #[must_use]
    pub fn sent_response_ttl(&self) -> Duration {
        Duration::from_millis(self.sent_response_ttl_ms)
    }
}

/// Parse a networking mode name as used in environment variables.
#[must_use]
pub fn parse_networking_mode(value: &str) -> Option<NetworkingMode> {
    match value.trim().to_ascii_lowercase().as_str() {
        "standard" => Some(NetworkingMode::Standard),
        "overlay_network" | "overlay" => Some(NetworkingMode::OverlayNetwork),
        _ => None,
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The node id is empty or blank
    #[error("invalid node id: {0}")]
    InvalidNodeId(String),
    /// Invalid size or count limit
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
}
