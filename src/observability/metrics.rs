//! Metrics collection and exposition.
//!
//! # Metrics
//! - `worker_live_count` (gauge): connection workers currently running
//! - `worker_requests_total` (counter): dispatched requests by outcome
//! - `worker_exits_total` (counter): worker exits by path
//! - `worker_upgrades_total` (counter): protocol upgrade attempts by result
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed (tests, embedders)
//! - Prometheus exporter is optional and only started by the binary

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_live_workers(count: usize) {
    metrics::gauge!("worker_live_count").set(count as f64);
}

/// `outcome` is one of `ok`, `client_fault`, `internal_fault`.
pub fn record_request(outcome: &'static str) {
    metrics::counter!("worker_requests_total", "outcome" => outcome).increment(1);
}

pub fn record_worker_exit(path: &'static str) {
    metrics::counter!("worker_exits_total", "path" => path).increment(1);
}

pub fn record_upgrade(result: &'static str) {
    metrics::counter!("worker_upgrades_total", "result" => result).increment(1);
}
