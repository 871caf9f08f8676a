//! Metrics collection and exposition.
//!
//! # Metrics
//! - `docstore_outbound_requests_total` (counter): outbound calls by method, status
//! - `docstore_outbound_request_duration_seconds` (histogram): outbound latency
//! - `docstore_client_cache_entries` (gauge): live cached client handles
//! - `docstore_client_cache_evictions_total` (counter): handles removed by sweeps
//! - `docstore_security_violations_total` (counter): terminated requests by kind
//! - `docstore_failed_logins_total` (counter)
//! - `docstore_buffer_pool_trims_total` (counter)
//!
//! Status `0` stands for a transport failure (no HTTP status received).

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_outbound_request(method: &str, status: u16, start: Instant) {
    let method = method.to_string();
    counter!(
        "docstore_outbound_requests_total",
        "method" => method.clone(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("docstore_outbound_request_duration_seconds", "method" => method)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_client_cache_size(entries: usize) {
    gauge!("docstore_client_cache_entries").set(entries as f64);
}

pub fn record_client_cache_evictions(removed: usize) {
    counter!("docstore_client_cache_evictions_total").increment(removed as u64);
}

pub fn record_security_violation(kind: &'static str) {
    counter!("docstore_security_violations_total", "kind" => kind).increment(1);
}

pub fn record_failed_login() {
    counter!("docstore_failed_logins_total").increment(1);
}

pub fn record_pool_trim() {
    counter!("docstore_buffer_pool_trims_total").increment(1);
}
