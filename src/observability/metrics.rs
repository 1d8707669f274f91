//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define dispatch metrics (requests, latency, attempts, exhausted retries)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `jsonhttp_requests_total` (counter): requests by path, status
//! - `jsonhttp_request_duration_seconds` (histogram): latency by path
//! - `jsonhttp_handler_attempts_total` (counter): handler invocations by path
//! - `jsonhttp_retries_exhausted_total` (counter): busy responses by path
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed
//! - Labels are the registered path, never the raw URI

use std::net::SocketAddr;
use std::time::Instant;

use axum::http::StatusCode;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and serve it on `addr`.
/// Must be called inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Record one finished request.
pub fn record_request(path: &str, status: StatusCode, start: Instant) {
    metrics::counter!(
        "jsonhttp_requests_total",
        "path" => path.to_string(),
        "status" => status.as_u16().to_string()
    )
    .increment(1);
    metrics::histogram!("jsonhttp_request_duration_seconds", "path" => path.to_string())
        .record(start.elapsed().as_secs_f64());
}

/// Record one handler invocation.
pub fn record_attempt(path: &str) {
    metrics::counter!("jsonhttp_handler_attempts_total", "path" => path.to_string()).increment(1);
}

/// Record a request answered with the busy body.
pub fn record_exhausted(path: &str) {
    metrics::counter!("jsonhttp_retries_exhausted_total", "path" => path.to_string()).increment(1);
}
