//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by rule type and status
//! - `proxy_request_duration_seconds` (histogram): latency distribution
//! - `proxy_route_misses_total` (counter): requests with no matching rule
//! - `proxy_dispatch_errors_total` (counter): dispatch failures by kind
//! - `proxy_upstream_active_connections` (gauge): in-flight proxied requests per target
//! - `proxy_cert_reloads_total` (counter): certificate reloads by outcome
//!
//! # Design Decisions
//! - Prometheus exporter is installed only when enabled
//! - Labels stay low-cardinality: rule type, status, error kind, target host

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a finished request.
pub fn record_request(rule_type: &'static str, status: u16, start: Instant) {
    let labels = [("type", rule_type.to_string()), ("status", status.to_string())];
    counter!("proxy_requests_total", &labels).increment(1);
    histogram!("proxy_request_duration_seconds", &labels).record(start.elapsed().as_secs_f64());
}

pub fn record_route_miss() {
    counter!("proxy_route_misses_total").increment(1);
}

pub fn record_dispatch_error(kind: &'static str) {
    counter!("proxy_dispatch_errors_total", "kind" => kind).increment(1);
}

/// Publish the current in-flight count for one proxy target.
pub fn record_upstream_connections(target: &str, active: usize) {
    gauge!("proxy_upstream_active_connections", "target" => target.to_string()).set(active as f64);
}

pub fn record_cert_reload(ok: bool) {
    let outcome = if ok { "success" } else { "failure" };
    counter!("proxy_cert_reloads_total", "outcome" => outcome).increment(1);
}
