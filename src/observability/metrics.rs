//! Metrics collection and exposition.
//!
//! # Metrics
//! - `bench_attempts_total` (counter): attempts by operation and outcome
//! - `bench_failovers_total` (counter): endpoint changes observed
//! - `bench_failover_generation` (gauge): current generation
//! - `bench_exhausted_total` (counter): operations that ran out of attempts
//! - `bench_bytes_total` (counter): payload bytes moved, by direction
//! - `bench_step_duration_seconds` (histogram): successful step latency

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint. Must run inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_attempt(operation: &'static str, outcome: &'static str) {
    metrics::counter!("bench_attempts_total", "operation" => operation, "outcome" => outcome).increment(1);
}

pub fn record_failover(generation: u64) {
    metrics::counter!("bench_failovers_total").increment(1);
    metrics::gauge!("bench_failover_generation").set(generation as f64);
}

pub fn record_exhausted(operation: &'static str) {
    metrics::counter!("bench_exhausted_total", "operation" => operation).increment(1);
}

pub fn record_bytes(direction: &'static str, bytes: u64) {
    metrics::counter!("bench_bytes_total", "direction" => direction).increment(bytes);
}

pub fn record_step(step: &'static str, elapsed: Duration) {
    metrics::histogram!("bench_step_duration_seconds", "step" => step).record(elapsed.as_secs_f64());
}
