//! Metrics collection and exposition.
//!
//! # Metrics
//! - `mint_gate_whitelist_mutations_total` (counter): by op, outcome
//! - `mint_gate_whitelist_size` (gauge): addresses currently whitelisted
//! - `mint_gate_transactions_total` (counter): by kind, outcome
//! - `mint_gate_receipt_wait_seconds` (histogram): broadcast to receipt
//! - `mint_gate_rpc_health` (gauge): 1=reachable, 0=unreachable
//! - `mint_gate_http_requests_total` (counter): by route, status

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_whitelist_mutation(op: &'static str, outcome: &'static str) {
    counter!("mint_gate_whitelist_mutations_total", "op" => op, "outcome" => outcome).increment(1);
}

pub fn set_whitelist_size(size: usize) {
    gauge!("mint_gate_whitelist_size").set(size as f64);
}

pub fn record_transaction(kind: &'static str, outcome: &'static str) {
    counter!("mint_gate_transactions_total", "kind" => kind, "outcome" => outcome).increment(1);
}

pub fn record_receipt_wait(start: Instant) {
    histogram!("mint_gate_receipt_wait_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_rpc_health(healthy: bool) {
    gauge!("mint_gate_rpc_health").set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_http_request(route: &str, status: u16) {
    counter!(
        "mint_gate_http_requests_total",
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}
