//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): proxied requests by method, status, backend
//! - `gateway_request_duration_seconds` (histogram): latency per backend
//! - `gateway_image_fetch_total` (counter): image fetches by outcome
//! - `gateway_backend_up` (gauge): 1=last probe reached the backend, 0=it did not

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, backend: &str, start: Instant) {
    counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "backend" => backend.to_string()
    )
    .increment(1);
    histogram!("gateway_request_duration_seconds", "backend" => backend.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_image_fetch(outcome: &'static str) {
    counter!("gateway_image_fetch_total", "outcome" => outcome).increment(1);
}

pub fn record_backend_health(backend: &str, up: bool) {
    gauge!("gateway_backend_up", "backend" => backend.to_string()).set(if up { 1.0 } else { 0.0 });
}
