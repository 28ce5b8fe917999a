//! Metrics collection and exposition.
//!
//! # Metrics
//! - `wallet_rpc_failures_total` (counter): failed RPC attempts by chain, operation
//! - `wallet_bills_total` (counter): new bills by currency, type
//! - `wallet_scan_cursor` (gauge): last processed block per currency
//! - `wallet_blocks_scanned_total` (counter): blocks processed per currency
//! - `wallet_scan_failures_total` (counter): failed scan cycles per currency
//! - `wallet_sweeps_total` (counter): collection attempts by currency, outcome
//! - `wallet_unused_addresses` (gauge): deposit address pool size per chain
//! - `wallet_bills` (gauge): bill count by status
//! - `wallet_scan_duration_seconds` (histogram): time per scan cycle

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

use crate::ledger::types::BillCounts;

/// Install the Prometheus recorder with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    let builder = PrometheusBuilder::new();
    match builder.with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_rpc_failure(chain: &str, operation: &str) {
    counter!(
        "wallet_rpc_failures_total",
        "chain" => chain.to_string(),
        "operation" => operation.to_string()
    )
    .increment(1);
}

pub fn record_bill(symbol: &str, bill_type: &'static str) {
    counter!(
        "wallet_bills_total",
        "currency" => symbol.to_string(),
        "type" => bill_type
    )
    .increment(1);
}

pub fn record_cursor(symbol: &str, height: u64) {
    gauge!("wallet_scan_cursor", "currency" => symbol.to_string()).set(height as f64);
}

pub fn record_scan(symbol: &str, blocks: u64, start: Instant) {
    counter!("wallet_blocks_scanned_total", "currency" => symbol.to_string()).increment(blocks);
    histogram!("wallet_scan_duration_seconds", "currency" => symbol.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_scan_failure(symbol: &str) {
    counter!("wallet_scan_failures_total", "currency" => symbol.to_string()).increment(1);
}

pub fn record_sweep(symbol: &str, outcome: &'static str) {
    counter!(
        "wallet_sweeps_total",
        "currency" => symbol.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_address_pool(chain: &str, unused: usize) {
    gauge!("wallet_unused_addresses", "chain" => chain.to_string()).set(unused as f64);
}

pub fn record_bill_counts(counts: &BillCounts) {
    gauge!("wallet_bills", "status" => "pending").set(counts.pending as f64);
    gauge!("wallet_bills", "status" => "confirmed").set(counts.confirmed as f64);
    gauge!("wallet_bills", "status" => "failed").set(counts.failed as f64);
}
