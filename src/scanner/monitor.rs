//! Block scanning service.

use alloy::primitives::{Address, TxHash};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::blockchain::connection::ChainConnection;
use crate::blockchain::transaction::ConfirmationStatus;
use crate::blockchain::types::{ChainTransaction, TxReceipt};
use crate::blockchain::ChainRegistry;
use crate::config::schema::{CurrencyConfig, CursorMode, ScannerConfig};
use crate::config::CurrencyTable;
use crate::custody::AddressInventory;
use crate::events::{NotificationSink, WalletEvent};
use crate::ledger::types::{unix_now, BalanceChange, BillStatus, ChainBill, Direction, Settlement};
use crate::ledger::{Ledger, LedgerError};
use crate::lifecycle::{LoopControl, StopSignal};
use crate::observability::metrics;
use crate::resilience::backoff::FailureStreak;
use crate::scanner::error::ScanError;
use crate::scanner::filter::AddressFilter;
use crate::scheduler::cadence::CadencePolicy;

/// What one scan of one currency did.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub cycle_id: Uuid,
    pub symbol: String,
    /// First block of the range, if there was anything to scan.
    pub from_block: Option<u64>,
    /// Last block processed (or attempted, for skipped blocks).
    pub last_block: Option<u64>,
    pub blocks_scanned: u64,
    pub transactions_recorded: usize,
    pub skipped_blocks: Vec<u64>,
    /// Relevant transactions dropped because their receipt could not be read.
    pub skipped_transactions: Vec<TxHash>,
    /// The range ended early because stop was requested.
    pub stopped: bool,
}

impl ScanReport {
    fn new(symbol: &str) -> Self {
        Self {
            cycle_id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            from_block: None,
            last_block: None,
            blocks_scanned: 0,
            transactions_recorded: 0,
            skipped_blocks: Vec::new(),
            skipped_transactions: Vec::new(),
            stopped: false,
        }
    }
}

/// Per-currency result of [`BlockScanner::scan_once`].
#[derive(Debug)]
pub struct CurrencyScan {
    pub symbol: String,
    pub result: Result<ScanReport, ScanError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScannerStatus {
    pub running: bool,
    pub currencies: Vec<String>,
    pub cursors: BTreeMap<String, u64>,
}

/// Walks new blocks of every enabled currency and books relevant transfers.
pub struct BlockScanner {
    registry: Arc<ChainRegistry>,
    ledger: Arc<Ledger>,
    inventory: Arc<dyn AddressInventory>,
    currencies: Arc<CurrencyTable>,
    notifier: Arc<dyn NotificationSink>,
    config: ScannerConfig,
    cadence: CadencePolicy,
    scan_locks: DashMap<String, Arc<Mutex<()>>>,
    control: LoopControl,
}

impl BlockScanner {
    pub fn new(
        registry: Arc<ChainRegistry>,
        ledger: Arc<Ledger>,
        inventory: Arc<dyn AddressInventory>,
        currencies: Arc<CurrencyTable>,
        notifier: Arc<dyn NotificationSink>,
        config: ScannerConfig,
    ) -> Self {
        Self {
            registry,
            ledger,
            inventory,
            currencies,
            notifier,
            config,
            cadence: CadencePolicy::default(),
            scan_locks: DashMap::new(),
            control: LoopControl::new("block scanner"),
        }
    }

    pub fn with_cadence(mut self, cadence: CadencePolicy) -> Self {
        self.cadence = cadence;
        self
    }

    /// Start the ticking loop.
    pub fn start_continuous(self: &Arc<Self>) -> Result<(), ScanError> {
        let scanner = Arc::clone(self);
        self.control.start(move |stop| scanner.run_loop(stop))?;
        Ok(())
    }

    /// Request the loop to stop after the in-flight block. Idempotent.
    pub fn stop(&self) -> bool {
        self.control.stop()
    }

    pub async fn stop_and_wait(&self) {
        self.control.stop_and_wait().await;
    }

    pub fn is_running(&self) -> bool {
        self.control.is_running()
    }

    pub fn status(&self) -> ScannerStatus {
        ScannerStatus {
            running: self.is_running(),
            currencies: self.currencies.enabled().into_iter().map(|c| c.symbol).collect(),
            cursors: self.ledger.cursors(),
        }
    }

    async fn run_loop(self: Arc<Self>, mut stop: StopSignal) {
        let mut next_due: HashMap<String, Instant> = HashMap::new();
        let mut streaks: HashMap<String, FailureStreak> = HashMap::new();

        while !stop.is_stopped() {
            let currencies = self.currencies.enabled();
            for currency in &currencies {
                if stop.is_stopped() {
                    break;
                }
                let now = Instant::now();
                if next_due.get(&currency.symbol).is_some_and(|due| *due > now) {
                    continue;
                }

                let streak = streaks
                    .entry(currency.symbol.clone())
                    .or_insert_with(|| FailureStreak::new(500, 30_000));
                let mut delay = self.cadence.interval_for(currency);
                match self.scan_currency_with(currency, &stop).await {
                    Ok(_) => streak.reset(),
                    Err(e) => {
                        let failures = streak.record_failure();
                        delay += streak.extra_delay();
                        tracing::warn!(
                            currency = %currency.symbol,
                            failures,
                            retry_in = ?delay,
                            error = %e,
                            "Scan cycle failed"
                        );
                    }
                }
                next_due.insert(currency.symbol.clone(), Instant::now() + delay);
            }

            let tick = self.cadence.tick(&currencies);
            tokio::select! {
                _ = tokio::time::sleep(tick) => {}
                _ = stop.stopped() => break,
            }
        }
        tracing::info!("Block scanner loop exited");
    }

    /// Scan every enabled currency once. Failures are isolated per currency.
    pub async fn scan_once(&self) -> Vec<CurrencyScan> {
        let mut results = Vec::new();
        for currency in self.currencies.enabled() {
            let result = self.scan_currency_with(&currency, &StopSignal::never()).await;
            if let Err(e) = &result {
                tracing::warn!(currency = %currency.symbol, error = %e, "Manual scan failed");
            }
            results.push(CurrencyScan {
                symbol: currency.symbol,
                result,
            });
        }
        results
    }

    /// Scan one currency from its cursor to the chain head.
    pub async fn scan_currency(&self, symbol: &str) -> Result<ScanReport, ScanError> {
        let currency = self
            .currencies
            .get(symbol)
            .ok_or_else(|| ScanError::UnknownCurrency(symbol.to_string()))?;
        self.scan_currency_with(&currency, &StopSignal::never()).await
    }

    fn currency_lock(&self, symbol: &str) -> Arc<Mutex<()>> {
        self.scan_locks
            .entry(symbol.to_ascii_uppercase())
            .or_default()
            .clone()
    }

    async fn scan_currency_with(
        &self,
        currency: &CurrencyConfig,
        stop: &StopSignal,
    ) -> Result<ScanReport, ScanError> {
        let lock = self.currency_lock(&currency.symbol);
        let _guard = lock.lock().await;
        let started = Instant::now();
        let symbol = currency.symbol.as_str();
        let mut report = ScanReport::new(symbol);

        let result = self.scan_locked(currency, stop, &mut report).await;
        match &result {
            Ok(()) => metrics::record_scan(symbol, report.blocks_scanned, started),
            Err(_) => metrics::record_scan_failure(symbol),
        }
        result.map(|()| report)
    }

    async fn scan_locked(
        &self,
        currency: &CurrencyConfig,
        stop: &StopSignal,
        report: &mut ScanReport,
    ) -> Result<(), ScanError> {
        let symbol = currency.symbol.as_str();
        let connection = self.registry.resolve(symbol)?;
        let latest = connection.block_number().await?;

        let cursor = match self.ledger.get_scan_cursor(symbol) {
            Some(cursor) => cursor,
            None => {
                let seed = currency
                    .start_block
                    .map(|block| block.saturating_sub(1))
                    .unwrap_or(latest);
                self.advance_cursor(symbol, seed)?;
                tracing::info!(currency = symbol, cursor = seed, "Seeded scan cursor");
                seed
            }
        };

        if cursor >= latest {
            return Ok(());
        }
        let start = cursor + 1;
        let end = latest.min(cursor.saturating_add(self.config.max_blocks_per_scan.max(1)));
        report.from_block = Some(start);

        let filter = AddressFilter::load(self.inventory.as_ref(), currency.chain_type).await;
        tracing::debug!(
            cycle_id = %report.cycle_id,
            currency = symbol,
            start,
            end,
            latest,
            addresses = filter.len(),
            "Scanning block range"
        );

        for height in start..=end {
            if stop.is_stopped() {
                report.stopped = true;
                tracing::info!(currency = symbol, height, "Stop requested, ending range early");
                break;
            }
            let skip_unreadable = self.config.cursor_mode == CursorMode::PerRange;
            match self
                .process_block(connection.as_ref(), currency, &filter, height, latest, skip_unreadable, report)
                .await
            {
                Ok(()) => {
                    report.blocks_scanned += 1;
                    report.last_block = Some(height);
                    if self.config.cursor_mode == CursorMode::PerBlock {
                        self.advance_cursor(symbol, height)?;
                    }
                }
                Err(e) => match self.config.cursor_mode {
                    CursorMode::PerBlock => {
                        tracing::warn!(currency = symbol, height, error = %e, "Block failed, retrying next tick");
                        return Err(e);
                    }
                    CursorMode::PerRange if e.is_transient() => {
                        tracing::warn!(currency = symbol, height, error = %e, "Aborting scan cycle");
                        return Err(e);
                    }
                    CursorMode::PerRange => {
                        tracing::warn!(currency = symbol, height, error = %e, "Skipping unreadable block");
                        report.skipped_blocks.push(height);
                        report.last_block = Some(height);
                    }
                },
            }
        }

        if self.config.cursor_mode == CursorMode::PerRange {
            if let Some(last) = report.last_block {
                self.advance_cursor(symbol, last)?;
            }
        }

        if report.blocks_scanned > 0 || !report.skipped_blocks.is_empty() {
            tracing::info!(
                cycle_id = %report.cycle_id,
                currency = symbol,
                from = start,
                to = ?report.last_block,
                latest,
                recorded = report.transactions_recorded,
                skipped = report.skipped_blocks.len(),
                skipped_txs = report.skipped_transactions.len(),
                "Scan progress"
            );
        }
        Ok(())
    }

    /// Set the cursor; a stale height is only worth a warning.
    fn advance_cursor(&self, symbol: &str, height: u64) -> Result<(), ScanError> {
        match self.ledger.set_scan_cursor(symbol, height) {
            Ok(()) => Ok(()),
            Err(e @ LedgerError::StaleCursor { .. }) => {
                tracing::warn!(currency = symbol, error = %e, "Cursor update rejected");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Re-scan `start..=end` for a specific address set without touching the cursor.
    ///
    /// `end` is clamped to the chain head. Unreadable blocks are skipped and
    /// reported; a connection failure aborts.
    pub async fn scan_range(
        &self,
        symbol: &str,
        start: u64,
        end: u64,
        addresses: &[String],
    ) -> Result<ScanReport, ScanError> {
        if start >= end {
            return Err(ScanError::InvalidRange { start, end });
        }
        if addresses.is_empty() {
            return Err(ScanError::EmptyAddressSet);
        }
        let parsed = addresses
            .iter()
            .map(|raw| {
                raw.trim()
                    .parse::<Address>()
                    .map_err(|_| ScanError::InvalidAddress(raw.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let currency = self
            .currencies
            .get(symbol)
            .ok_or_else(|| ScanError::UnknownCurrency(symbol.to_string()))?;

        let lock = self.currency_lock(&currency.symbol);
        let _guard = lock.lock().await;

        let connection = self.registry.resolve(&currency.symbol)?;
        let latest = connection.block_number().await?;
        let end = end.min(latest);
        let mut report = ScanReport::new(&currency.symbol);
        if start > end {
            return Ok(report);
        }
        report.from_block = Some(start);

        let managed = AddressFilter::load(self.inventory.as_ref(), currency.chain_type).await;
        let filter = managed.restrict(&parsed);

        for height in start..=end {
            match self
                .process_block(connection.as_ref(), &currency, &filter, height, latest, true, &mut report)
                .await
            {
                Ok(()) => {
                    report.blocks_scanned += 1;
                    report.last_block = Some(height);
                }
                Err(e) if e.is_transient() => return Err(e),
                Err(e) => {
                    tracing::warn!(currency = %currency.symbol, height, error = %e, "Skipping unreadable block");
                    report.skipped_blocks.push(height);
                    report.last_block = Some(height);
                }
            }
        }

        tracing::info!(
            cycle_id = %report.cycle_id,
            currency = %currency.symbol,
            start,
            end,
            recorded = report.transactions_recorded,
            "Range scan complete"
        );
        Ok(report)
    }

    /// Book every relevant transaction of one block.
    ///
    /// With `skip_unreadable`, a receipt that is missing or malformed only drops
    /// its own transaction; a connection failure always fails the block.
    #[allow(clippy::too_many_arguments)]
    async fn process_block(
        &self,
        connection: &dyn ChainConnection,
        currency: &CurrencyConfig,
        filter: &AddressFilter,
        height: u64,
        latest: u64,
        skip_unreadable: bool,
        report: &mut ScanReport,
    ) -> Result<(), ScanError> {
        let block = connection.block_by_number(height).await?;
        let mut recorded = 0;
        let mut skipped = Vec::new();
        for tx in &block.transactions {
            let Some(direction) = filter.classify(tx) else {
                continue;
            };
            let receipt = match connection.transaction_receipt(tx.hash).await {
                Ok(receipt) => receipt,
                Err(e) if skip_unreadable && !e.is_transient() => {
                    tracing::warn!(
                        currency = %currency.symbol,
                        height,
                        txid = %tx.hash,
                        error = %e,
                        "Skipping transaction with unreadable receipt"
                    );
                    skipped.push(tx.hash);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            self.book(currency, filter, tx, direction, &receipt, height, latest)?;
            recorded += 1;
        }
        report.transactions_recorded += recorded;
        report.skipped_transactions.extend(skipped);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn book(
        &self,
        currency: &CurrencyConfig,
        filter: &AddressFilter,
        tx: &ChainTransaction,
        direction: Direction,
        receipt: &TxReceipt,
        height: u64,
        latest: u64,
    ) -> Result<(), ScanError> {
        let confirmation = ConfirmationStatus::from_receipt(
            receipt,
            latest,
            height,
            currency.confirmations_required,
        );
        let status = bill_status(&confirmation);
        let booked_against = match (direction, tx.to) {
            (Direction::Incoming, Some(to)) => to,
            _ => tx.from,
        };
        let now = unix_now();
        let bill = ChainBill {
            txid: tx.hash,
            address: booked_against,
            from: tx.from,
            to: tx.to,
            currency_symbol: currency.symbol.clone(),
            chain_type: currency.chain_type,
            bill_type: direction.bill_type(),
            direction,
            amount: tx.value,
            fee: receipt.fee(),
            nonce: None,
            block_height: Some(receipt.block_number.unwrap_or(height)),
            confirmations: confirmation.confirmations(),
            status,
            created_time: now,
            updated_time: now,
            settlement: Settlement::default(),
        };

        let outcome = self.ledger.record_transaction(bill);
        if outcome.is_new() && direction.credits_recipient() {
            if let Some(to) = tx.to {
                self.notifier.publish(WalletEvent::DepositObserved {
                    user_id: filter.owner(&to),
                    txid: tx.hash,
                    address: to,
                    currency: currency.symbol.clone(),
                    chain_type: currency.chain_type,
                    amount: tx.value,
                    block_height: Some(height),
                    confirmed: status == BillStatus::Confirmed,
                });
            }
        }

        self.settle_and_notify(tx.hash, currency, |address| filter.owner(address))
    }

    fn settle_and_notify(
        &self,
        txid: TxHash,
        currency: &CurrencyConfig,
        owner: impl Fn(&Address) -> Option<u64>,
    ) -> Result<(), ScanError> {
        let changes = match self.ledger.settle(txid) {
            Ok(changes) => changes,
            Err(e @ LedgerError::InsufficientFunds { .. }) => {
                tracing::warn!(%txid, currency = %currency.symbol, error = %e, "Ledger cannot cover outgoing transfer");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        for BalanceChange { key, kind, amount, balance } in changes {
            self.notifier.publish(WalletEvent::BalanceChanged {
                user_id: owner(&key.address),
                address: key.address,
                currency: key.symbol,
                chain_type: key.chain_type,
                kind,
                amount,
                balance,
            });
        }
        Ok(())
    }

    /// Re-check every pending bill against the chain and settle what moved.
    ///
    /// Returns how many bills changed. Receipts that are not available yet
    /// leave the bill pending.
    pub async fn refresh_confirmations(&self) -> Result<usize, ScanError> {
        let mut by_symbol: BTreeMap<String, Vec<ChainBill>> = BTreeMap::new();
        for bill in self.ledger.bills_with_status(BillStatus::Pending) {
            by_symbol
                .entry(bill.currency_symbol.to_ascii_uppercase())
                .or_default()
                .push(bill);
        }

        let mut changed = 0;
        for (symbol, bills) in by_symbol {
            let Some(currency) = self.currencies.get(&symbol) else {
                continue;
            };
            let lock = self.currency_lock(&symbol);
            let _guard = lock.lock().await;

            let connection = match self.registry.resolve(&symbol) {
                Ok(connection) => connection,
                Err(e) => {
                    tracing::warn!(currency = %symbol, error = %e, "Confirmation refresh skipped");
                    continue;
                }
            };
            let latest = match connection.block_number().await {
                Ok(latest) => latest,
                Err(e) => {
                    tracing::warn!(currency = %symbol, error = %e, "Confirmation refresh skipped");
                    continue;
                }
            };

            for mut bill in bills {
                let receipt = match connection.transaction_receipt(bill.txid).await {
                    Ok(receipt) => receipt,
                    Err(e) if e.is_transient() => {
                        tracing::warn!(txid = %bill.txid, error = %e, "Receipt fetch failed");
                        break;
                    }
                    Err(_) => continue,
                };
                let fallback = bill.block_height.unwrap_or(latest);
                let confirmation = ConfirmationStatus::from_receipt(
                    &receipt,
                    latest,
                    fallback,
                    currency.confirmations_required,
                );
                bill.status = bill_status(&confirmation);
                bill.confirmations = confirmation.confirmations();
                bill.block_height = receipt.block_number.or(bill.block_height);
                bill.updated_time = unix_now();

                let txid = bill.txid;
                let chain = bill.chain_type;
                if self.ledger.record_transaction(bill).is_new() {
                    continue;
                }
                let mut owners = HashMap::new();
                for address in self.ledger.bill(&txid).into_iter().flat_map(|b| [Some(b.from), b.to]).flatten() {
                    owners.insert(address, self.inventory.owner_of(chain, address).await);
                }
                self.settle_and_notify(txid, &currency, |address| owners.get(address).copied().flatten())?;
                if self.ledger.bill(&txid).is_some_and(|b| b.status.is_final()) {
                    changed += 1;
                    tracing::debug!(%txid, currency = %symbol, "Pending bill finalised");
                }
            }
        }
        Ok(changed)
    }
}

fn bill_status(confirmation: &ConfirmationStatus) -> BillStatus {
    match confirmation {
        ConfirmationStatus::Confirmed { .. } => BillStatus::Confirmed,
        ConfirmationStatus::Confirming { .. } => BillStatus::Pending,
        ConfirmationStatus::Failed { .. } => BillStatus::Failed,
    }
}
