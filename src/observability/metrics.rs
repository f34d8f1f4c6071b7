//! Metrics collection and exposition.
//!
//! # Metrics
//! - `hub_standby_connections` (gauge): standby connections held by the registry
//! - `hub_registrations_total` (counter): REGISTER messages by outcome
//! - `hub_forwarded_requests_total` (counter): client requests by outcome
//! - `hub_active_bridges` (gauge): bridge sessions in flight
//! - `registrant_pool_outstanding` (gauge): registered, unconsumed connections
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - Prometheus exposition is opt-in

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_standby(count: usize) {
    metrics::gauge!("hub_standby_connections").set(count as f64);
}

pub fn record_registration(outcome: &'static str) {
    metrics::counter!("hub_registrations_total", "outcome" => outcome).increment(1);
}

pub fn record_forward(outcome: &'static str) {
    metrics::counter!("hub_forwarded_requests_total", "outcome" => outcome).increment(1);
}

pub fn record_active_bridges(count: u64) {
    metrics::gauge!("hub_active_bridges").set(count as f64);
}

pub fn record_pool_outstanding(count: usize) {
    metrics::gauge!("registrant_pool_outstanding").set(count as f64);
}
