//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_connections_total` (counter): accepted relays
//! - `relay_active_connections` (gauge): live relays
//! - `relay_messages_received_total` (counter): messages handed to the processor
//! - `relay_messages_discarded_total` (counter): dropped messages by reason
//! - `relay_packets_sent_total` (counter): outbound packets written
//! - `relay_packets_dropped_total` (counter): packets evicted by a bounded queue
//! - `relay_closes_total` (counter): terminal close status by code
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed
//! - Prometheus exporter only when enabled in config

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_connection_opened(active: u64) {
    counter!("relay_connections_total").increment(1);
    gauge!("relay_active_connections").set(active as f64);
}

pub fn record_connection_closed(active: u64) {
    gauge!("relay_active_connections").set(active as f64);
}

pub fn record_message_received() {
    counter!("relay_messages_received_total").increment(1);
}

pub fn record_discarded(reason: &'static str) {
    counter!("relay_messages_discarded_total", "reason" => reason).increment(1);
}

pub fn record_packet_sent() {
    counter!("relay_packets_sent_total").increment(1);
}

pub fn record_packets_dropped(count: u64) {
    counter!("relay_packets_dropped_total").increment(count);
}

pub fn record_close(code: u16) {
    counter!("relay_closes_total", "code" => code.to_string()).increment(1);
}
