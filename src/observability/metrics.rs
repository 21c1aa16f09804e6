//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_requests_total` (counter): forwarded exchanges by outcome
//! - `relay_backend_dispatch_total` (counter): dispatches by logical backend
//! - `relay_backend_latency_seconds` (histogram): backend leg duration
//! - `relay_frame_errors_total` (counter): framing failures by kind
//! - `relay_active_connections` (gauge): open client connections
//! - `relay_store_upserts_total` (counter): store writes by status
//!
//! Without an installed recorder every call is a no-op, so library code and
//! tests record unconditionally.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter and describe every metric.
pub fn init_metrics(addr: SocketAddr) {
    if let Err(e) = PrometheusBuilder::new().with_http_listener(addr).install() {
        tracing::error!(error = %e, address = %addr, "Failed to install Prometheus exporter");
        return;
    }

    metrics::describe_counter!("relay_requests_total", "Forwarded exchanges by outcome");
    metrics::describe_counter!("relay_backend_dispatch_total", "Requests dispatched per backend");
    metrics::describe_histogram!("relay_backend_latency_seconds", "Duration of the backend leg in seconds");
    metrics::describe_counter!("relay_frame_errors_total", "Framing failures by kind");
    metrics::describe_gauge!("relay_active_connections", "Open client connections");
    metrics::describe_counter!("relay_store_upserts_total", "Correlation store writes by status");

    tracing::info!(address = %addr, "Metrics exporter listening");
}

pub fn record_request(outcome: &'static str) {
    counter!("relay_requests_total", "outcome" => outcome).increment(1);
}

pub fn record_dispatch(backend: &str, start: Instant) {
    counter!("relay_backend_dispatch_total", "backend" => backend.to_string()).increment(1);
    histogram!("relay_backend_latency_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_frame_error(kind: &'static str) {
    counter!("relay_frame_errors_total", "kind" => kind).increment(1);
}

pub fn connection_opened() {
    gauge!("relay_active_connections").increment(1.0);
}

pub fn connection_closed() {
    gauge!("relay_active_connections").decrement(1.0);
}

pub fn record_store_upsert(ok: bool) {
    let status = if ok { "ok" } else { "error" };
    counter!("relay_store_upserts_total", "status" => status).increment(1);
}
