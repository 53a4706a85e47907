//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): completed requests by route class, status
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_rate_limited_total` (counter): 429s by limiter
//! - `gateway_csrf_rejected_total` (counter): 403s from the CSRF guard
//! - `gateway_backend_failures_total` (counter): failed-open limiter checks
//! - `gateway_log_sampled_out_total` (counter): log calls dropped by sampling
//! - `gateway_telemetry_failures_total` (counter): undelivered telemetry events
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter.

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(route: &'static str, status: u16, duration: Duration) {
    metrics::counter!(
        "gateway_requests_total",
        "route" => route,
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("gateway_request_duration_seconds", "route" => route)
        .record(duration.as_secs_f64());
}

pub fn record_rate_limited(limiter: &str) {
    metrics::counter!("gateway_rate_limited_total", "limiter" => limiter.to_string()).increment(1);
}

pub fn record_csrf_rejected() {
    metrics::counter!("gateway_csrf_rejected_total").increment(1);
}

pub fn record_backend_failure(limiter: &str) {
    metrics::counter!("gateway_backend_failures_total", "limiter" => limiter.to_string())
        .increment(1);
}

pub fn record_sampled_out(level: &'static str) {
    metrics::counter!("gateway_log_sampled_out_total", "level" => level).increment(1);
}

pub fn record_telemetry_failure(kind: &'static str) {
    metrics::counter!("gateway_telemetry_failures_total", "kind" => kind).increment(1);
}
