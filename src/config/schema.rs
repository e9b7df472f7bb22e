//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay
//! server. All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::relay::liveness::DEFAULT_LIVENESS_INTERVAL;
use crate::relay::reassembler::{DEFAULT_FRAGMENT_BYTES, DEFAULT_MAX_MESSAGE_BYTES};

/// Root configuration for the relay server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RelayServerConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Per-connection relay settings.
    pub relay: RelayConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:5050").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:5050".to_string(),
        }
    }
}

/// Relay settings applied to every accepted connection.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Route that accepts WebSocket upgrades.
    pub path: String,

    /// Largest logical message accepted, in bytes.
    pub max_message_bytes: usize,

    /// Largest chunk handed to the reassembler, in bytes.
    pub fragment_bytes: usize,

    /// How long an idle writer waits before re-checking state.
    pub writer_wait_ms: u64,

    /// Liveness polling interval.
    pub liveness_interval_ms: u64,

    /// Upper bound on the close handshake.
    pub close_timeout_ms: u64,

    /// Outbound queue capacity; unbounded when absent.
    pub outbound_capacity: Option<usize>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            path: "/api/echo".to_string(),
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            fragment_bytes: DEFAULT_FRAGMENT_BYTES,
            writer_wait_ms: 1000,
            liveness_interval_ms: DEFAULT_LIVENESS_INTERVAL.as_millis() as u64,
            close_timeout_ms: 5000,
            outbound_capacity: None,
        }
    }
}

/// Timeout configuration for the HTTP host.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout for plain HTTP routes in seconds.
    pub request_secs: u64,

    /// How long shutdown waits for live relays to finish, in seconds.
    pub drain_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            drain_secs: 10,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_limits() {
        let config = RelayServerConfig::default();
        assert_eq!(config.relay.max_message_bytes, 32 * 1024);
        assert_eq!(config.relay.fragment_bytes, 4 * 1024);
        assert_eq!(config.relay.liveness_interval_ms, 2000);
        assert!(config.relay.outbound_capacity.is_none());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: RelayServerConfig = toml::from_str(
            r#"
            [relay]
            path = "/ws"
            outbound_capacity = 64
            "#,
        )
        .unwrap();
        assert_eq!(config.relay.path, "/ws");
        assert_eq!(config.relay.outbound_capacity, Some(64));
        assert_eq!(config.relay.writer_wait_ms, 1000);
        assert_eq!(config.listener.bind_address, "127.0.0.1:5050");
    }
}
