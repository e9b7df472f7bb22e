//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits and intervals > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RelayServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::RelayServerConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Check a parsed configuration, collecting every problem found.
pub fn validate_config(config: &RelayServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    let relay = &config.relay;
    if !relay.path.starts_with('/') {
        errors.push(ValidationError::new("relay.path", "must start with '/'"));
    }
    if relay.fragment_bytes == 0 {
        errors.push(ValidationError::new("relay.fragment_bytes", "must be greater than 0"));
    }
    if relay.max_message_bytes < relay.fragment_bytes {
        errors.push(ValidationError::new(
            "relay.max_message_bytes",
            "must be at least relay.fragment_bytes",
        ));
    }
    for (field, value) in [
        ("relay.writer_wait_ms", relay.writer_wait_ms),
        ("relay.liveness_interval_ms", relay.liveness_interval_ms),
        ("relay.close_timeout_ms", relay.close_timeout_ms),
        ("timeouts.request_secs", config.timeouts.request_secs),
        ("timeouts.drain_secs", config.timeouts.drain_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than 0"));
        }
    }
    if relay.outbound_capacity == Some(0) {
        errors.push(ValidationError::new(
            "relay.outbound_capacity",
            "must be greater than 0 when set",
        ));
    }

    let observability = &config.observability;
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
