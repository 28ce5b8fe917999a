use alloy::primitives::{Address, TxHash};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

use crate::admin::response::{error_body, ok, ApiResult};
use crate::admin::AdminState;
use crate::blockchain::types::ChainType;
use crate::collection::{SweepAttempt, SweepOutcome};
use crate::error::WalletError;
use crate::ledger::types::{Balance, BalanceKey, ChainBill};
use crate::scanner::CurrencyScan;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub scheduler_running: bool,
    pub scanner: crate::scanner::ScannerStatus,
    pub collection: crate::collection::CollectionStatus,
    pub bills: crate::ledger::types::BillCounts,
    pub chains: Vec<ChainType>,
}

pub async fn get_status(State(state): State<AdminState>) -> ApiResult {
    Ok(ok(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        scheduler_running: state.scheduler.is_running().await,
        scanner: state.scheduler.scanner().status(),
        collection: state.scheduler.collector().status(),
        bills: state.ledger.bill_counts(),
        chains: state.registry.chains(),
    }))
}

pub async fn start_scanner(State(state): State<AdminState>) -> ApiResult {
    state.scheduler.scanner().start_continuous()?;
    Ok(ok(json!({ "running": true })))
}

pub async fn stop_scanner(State(state): State<AdminState>) -> ApiResult {
    let scanner = state.scheduler.scanner();
    let was_running = scanner.is_running();
    scanner.stop_and_wait().await;
    Ok(ok(json!({ "running": false, "was_running": was_running })))
}

pub async fn scanner_status(State(state): State<AdminState>) -> ApiResult {
    Ok(ok(state.scheduler.scanner().status()))
}

fn scan_json(scan: CurrencyScan) -> serde_json::Value {
    match scan.result {
        Ok(report) => json!({ "symbol": scan.symbol, "report": report }),
        Err(e) => {
            let mut body = error_body(e.kind(), e.to_string());
            body["symbol"] = json!(scan.symbol);
            body
        }
    }
}

pub async fn scan_once(State(state): State<AdminState>) -> ApiResult {
    let results: Vec<_> = state
        .scheduler
        .scanner()
        .scan_once()
        .await
        .into_iter()
        .map(scan_json)
        .collect();
    Ok(ok(results))
}

#[derive(Debug, Deserialize)]
pub struct ScanRangeRequest {
    pub symbol: String,
    pub start: u64,
    pub end: u64,
    pub addresses: Vec<String>,
}

pub async fn scan_range(
    State(state): State<AdminState>,
    Json(req): Json<ScanRangeRequest>,
) -> ApiResult {
    let report = state
        .scheduler
        .scanner()
        .scan_range(&req.symbol, req.start, req.end, &req.addresses)
        .await?;
    Ok(ok(report))
}

#[derive(Debug, Deserialize)]
pub struct StartCollectionParams {
    pub interval_secs: Option<u64>,
}

pub async fn start_collection(
    State(state): State<AdminState>,
    Query(params): Query<StartCollectionParams>,
) -> ApiResult {
    let secs = params.interval_secs.unwrap_or(state.collection_interval_secs);
    if secs == 0 {
        return Err(WalletError::InvalidRequest("interval_secs must be positive".into()).into());
    }
    state
        .scheduler
        .collector()
        .start_loop(Duration::from_secs(secs))?;
    Ok(ok(json!({ "running": true, "interval_secs": secs })))
}

pub async fn stop_collection(State(state): State<AdminState>) -> ApiResult {
    let collector = state.scheduler.collector();
    let was_running = collector.is_running();
    collector.stop_and_wait().await;
    Ok(ok(json!({ "running": false, "was_running": was_running })))
}

pub async fn collection_status(State(state): State<AdminState>) -> ApiResult {
    Ok(ok(state.scheduler.collector().status()))
}

fn attempt_json(attempt: SweepAttempt) -> serde_json::Value {
    match attempt.result {
        Ok(outcome) => json!({
            "symbol": attempt.symbol,
            "address": attempt.address,
            "result": outcome,
        }),
        Err(e) => {
            let mut body = error_body(e.kind(), e.to_string());
            body["symbol"] = json!(attempt.symbol);
            body["address"] = json!(attempt.address);
            body
        }
    }
}

pub async fn trigger_collection(State(state): State<AdminState>) -> ApiResult {
    let attempts: Vec<_> = state
        .scheduler
        .collector()
        .trigger_once()
        .await
        .into_iter()
        .map(attempt_json)
        .collect();
    Ok(ok(attempts))
}

#[derive(Debug, Deserialize)]
pub struct CollectRequest {
    pub symbol: String,
    pub address: String,
}

pub async fn collect_from_address(
    State(state): State<AdminState>,
    Json(req): Json<CollectRequest>,
) -> ApiResult {
    let outcome: SweepOutcome = state
        .scheduler
        .collector()
        .collect_from_address(&req.symbol, &req.address)
        .await?;
    Ok(ok(outcome))
}

/// Balance rendered with decimal strings.
#[derive(Debug, Serialize)]
pub struct BalanceView {
    pub address: Address,
    pub symbol: String,
    pub chain_type: ChainType,
    pub available: String,
    pub frozen: String,
    pub total: String,
}

impl BalanceView {
    fn new(key: BalanceKey, balance: Balance) -> Self {
        Self {
            address: key.address,
            symbol: key.symbol,
            chain_type: key.chain_type,
            available: balance.available.to_string(),
            frozen: balance.frozen.to_string(),
            total: balance.total().to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BalanceQuery {
    pub symbol: Option<String>,
    pub chain: Option<ChainType>,
}

fn parse_address(raw: &str) -> Result<Address, WalletError> {
    raw.trim()
        .parse()
        .map_err(|_| WalletError::InvalidRequest(format!("invalid address {raw:?}")))
}

pub async fn get_balances(
    State(state): State<AdminState>,
    Path(address): Path<String>,
    Query(query): Query<BalanceQuery>,
) -> ApiResult {
    let address = parse_address(&address)?;
    match query.symbol {
        Some(symbol) => {
            let chain = query.chain.unwrap_or_else(|| state.registry.chain_for(&symbol));
            let key = BalanceKey::new(address, &symbol, chain);
            let balance = state.ledger.get_balance(&key);
            Ok(ok(BalanceView::new(key, balance)))
        }
        None => {
            let rows: Vec<_> = state
                .ledger
                .balances_for(address)
                .into_iter()
                .map(|(key, balance)| BalanceView::new(key, balance))
                .collect();
            Ok(ok(rows))
        }
    }
}

pub async fn get_cursors(State(state): State<AdminState>) -> ApiResult {
    Ok(ok(state.ledger.cursors()))
}

pub async fn get_bill(
    State(state): State<AdminState>,
    Path(txid): Path<String>,
) -> ApiResult {
    let txid: TxHash = txid
        .trim()
        .parse()
        .map_err(|_| WalletError::InvalidRequest(format!("invalid txid {txid:?}")))?;
    let bill: ChainBill = state
        .ledger
        .bill(&txid)
        .ok_or(crate::ledger::LedgerError::UnknownBill(txid))?;
    Ok(ok(bill))
}
