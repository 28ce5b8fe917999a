//! Sweeps hot-address balances into cold storage.

use alloy::primitives::{Address, TxHash, U256};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::blockchain::connection::ChainConnection;
use crate::blockchain::transaction::{quote_sweep, sign_sweep, GasPolicy, QuoteOutcome};
use crate::blockchain::ChainRegistry;
use crate::collection::error::CollectionError;
use crate::collection::locks::AddressLocks;
use crate::config::schema::{CollectionConfig, CurrencyConfig, DebitMode};
use crate::config::CurrencyTable;
use crate::custody::{AddressInventory, AddressRole, AddressStatus, KeyCustody};
use crate::events::{NotificationSink, WalletEvent};
use crate::ledger::types::{unix_now, BillStatus, BillType, ChainBill, Direction, Settlement};
use crate::ledger::{Ledger, LedgerError};
use crate::lifecycle::{LoopControl, StopSignal};
use crate::observability::metrics;

/// A broadcast sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReceipt {
    pub txid: TxHash,
    pub from: Address,
    pub to: Address,
    pub currency: String,
    pub amount: U256,
    pub fee: U256,
    pub nonce: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SweepOutcome {
    Submitted(SweepReceipt),
    BelowThreshold { balance: U256, threshold: U256 },
}

/// One (currency, address) result of a collection pass.
#[derive(Debug)]
pub struct SweepAttempt {
    pub symbol: String,
    pub address: Address,
    pub result: Result<SweepOutcome, CollectionError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionStatus {
    pub running: bool,
    pub cold_address: Option<Address>,
    pub debit_mode: DebitMode,
    pub currencies: Vec<String>,
}

pub struct CollectionEngine {
    registry: Arc<ChainRegistry>,
    ledger: Arc<Ledger>,
    inventory: Arc<dyn AddressInventory>,
    custody: Arc<dyn KeyCustody>,
    currencies: Arc<CurrencyTable>,
    notifier: Arc<dyn NotificationSink>,
    config: CollectionConfig,
    cold_address: Option<Address>,
    locks: AddressLocks,
    control: LoopControl,
}

impl CollectionEngine {
    /// Build the engine and tag the cold address in the inventory.
    pub async fn new(
        registry: Arc<ChainRegistry>,
        ledger: Arc<Ledger>,
        inventory: Arc<dyn AddressInventory>,
        custody: Arc<dyn KeyCustody>,
        currencies: Arc<CurrencyTable>,
        notifier: Arc<dyn NotificationSink>,
        config: CollectionConfig,
    ) -> Self {
        let cold_address = parse_cold_address(&config.cold_address).ok();
        match cold_address {
            Some(cold) => {
                for chain in registry.chains() {
                    inventory.mark_role(chain, cold, AddressRole::Cold).await;
                }
                tracing::info!(cold_address = %cold, debit_mode = ?config.debit_mode, "Collection engine ready");
            }
            None => tracing::warn!(
                cold_address = %config.cold_address,
                "No usable cold address; sweeps will be refused"
            ),
        }

        Self {
            registry,
            ledger,
            inventory,
            custody,
            currencies,
            notifier,
            config,
            cold_address,
            locks: AddressLocks::new(),
            control: LoopControl::new("collection engine"),
        }
    }

    /// Run a collection pass every `interval` until stopped.
    pub fn start_loop(self: &Arc<Self>, interval: Duration) -> Result<(), CollectionError> {
        let engine = Arc::clone(self);
        self.control
            .start(move |stop| engine.run_loop(interval, stop))?;
        Ok(())
    }

    pub fn stop(&self) -> bool {
        self.control.stop()
    }

    pub async fn stop_and_wait(&self) {
        self.control.stop_and_wait().await;
    }

    pub fn is_running(&self) -> bool {
        self.control.is_running()
    }

    pub fn status(&self) -> CollectionStatus {
        CollectionStatus {
            running: self.is_running(),
            cold_address: self.cold_address,
            debit_mode: self.config.debit_mode,
            currencies: self
                .collectable_currencies()
                .into_iter()
                .map(|c| c.symbol)
                .collect(),
        }
    }

    async fn run_loop(self: Arc<Self>, interval: Duration, mut stop: StopSignal) {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = stop.stopped() => break,
            }
            let attempts = self.collect_pass(&stop).await;
            let submitted = attempts
                .iter()
                .filter(|a| matches!(a.result, Ok(SweepOutcome::Submitted(_))))
                .count();
            tracing::debug!(attempts = attempts.len(), submitted, "Collection pass finished");
        }
        tracing::info!("Collection loop exited");
    }

    fn collectable_currencies(&self) -> Vec<CurrencyConfig> {
        self.currencies
            .enabled()
            .into_iter()
            .filter(|c| c.collection_enabled)
            .collect()
    }

    /// One sweep pass over every collection-enabled currency.
    pub async fn trigger_once(&self) -> Vec<SweepAttempt> {
        self.collect_pass(&StopSignal::never()).await
    }

    async fn collect_pass(&self, stop: &StopSignal) -> Vec<SweepAttempt> {
        let pass_id = Uuid::new_v4();
        let mut attempts = Vec::new();

        for currency in self.collectable_currencies() {
            let threshold = match currency.threshold_units() {
                Ok(threshold) => threshold,
                Err(e) => {
                    tracing::error!(currency = %currency.symbol, error = %e, "Invalid collection threshold");
                    continue;
                }
            };

            let hot = self
                .inventory
                .list_managed_addresses(currency.chain_type)
                .await
                .into_iter()
                .filter(|a| a.role == AddressRole::Hot && a.status != AddressStatus::Frozen);

            for entry in hot {
                if stop.is_stopped() {
                    return attempts;
                }
                let result = self
                    .sweep(&currency, entry.address, Some(threshold))
                    .await;
                match &result {
                    Ok(SweepOutcome::Submitted(receipt)) => tracing::info!(
                        %pass_id,
                        currency = %currency.symbol,
                        address = %entry.address,
                        txid = %receipt.txid,
                        "Sweep submitted"
                    ),
                    Ok(SweepOutcome::BelowThreshold { .. }) => {}
                    Err(CollectionError::SweepInFlight { txid, .. }) => tracing::debug!(
                        %pass_id,
                        address = %entry.address,
                        %txid,
                        "Sweep still pending, skipping"
                    ),
                    Err(e) => tracing::warn!(
                        %pass_id,
                        currency = %currency.symbol,
                        address = %entry.address,
                        error = %e,
                        "Sweep skipped"
                    ),
                }
                attempts.push(SweepAttempt {
                    symbol: currency.symbol.clone(),
                    address: entry.address,
                    result,
                });
            }
        }
        attempts
    }

    /// Forced sweep of one address, ignoring the threshold.
    pub async fn collect_from_address(
        &self,
        symbol: &str,
        address: &str,
    ) -> Result<SweepOutcome, CollectionError> {
        let address = address
            .trim()
            .parse::<Address>()
            .map_err(|_| CollectionError::InvalidAddress(address.to_string()))?;
        let currency = self
            .currencies
            .get(symbol)
            .ok_or_else(|| CollectionError::UnknownCurrency(symbol.to_string()))?;
        self.sweep(&currency, address, None).await
    }

    fn cold_address(&self) -> Result<Address, CollectionError> {
        self.cold_address
            .ok_or_else(|| CollectionError::ColdAddressInvalid(self.config.cold_address.clone()))
    }

    fn gas_policy(&self) -> GasPolicy {
        GasPolicy {
            price_multiplier: self.config.gas_price_multiplier,
            max_gas_price_gwei: self.config.max_gas_price_gwei,
        }
    }

    /// `threshold: None` marks a forced sweep.
    async fn sweep(
        &self,
        currency: &CurrencyConfig,
        address: Address,
        threshold: Option<U256>,
    ) -> Result<SweepOutcome, CollectionError> {
        let symbol = currency.symbol.as_str();
        let result = self.sweep_locked(currency, address, threshold).await;
        let label = match &result {
            Ok(SweepOutcome::Submitted(_)) => "submitted",
            Ok(SweepOutcome::BelowThreshold { .. }) => "below_threshold",
            Err(e) => e.kind().as_str(),
        };
        metrics::record_sweep(symbol, label);
        result
    }

    async fn sweep_locked(
        &self,
        currency: &CurrencyConfig,
        address: Address,
        threshold: Option<U256>,
    ) -> Result<SweepOutcome, CollectionError> {
        let _guard = self.locks.acquire(address).await;
        let symbol = currency.symbol.as_str();

        let connection = self.registry.resolve(symbol)?;
        if let Some(txid) = self.ledger.pending_collection(address, symbol) {
            if !self.release_stale_sweep(connection.as_ref(), currency, txid).await {
                return Err(CollectionError::SweepInFlight { address, txid });
            }
        }

        let balance = connection.balance(address).await?;
        match threshold {
            Some(threshold) if balance <= threshold => {
                return Ok(SweepOutcome::BelowThreshold { balance, threshold });
            }
            None if balance.is_zero() => {
                return Err(CollectionError::InsufficientFunds { address });
            }
            _ => {}
        }

        let cold = self.cold_address()?;
        let key = self.custody.signing_key(address).await?;

        let quote = match quote_sweep(connection.as_ref(), address, cold, balance, self.gas_policy()).await? {
            QuoteOutcome::Ready(quote) => quote,
            QuoteOutcome::InsufficientForGas { balance, gas_cost } => {
                return Err(CollectionError::InsufficientForGas { balance, gas_cost });
            }
        };

        let nonce = connection.pending_nonce(address).await?;
        let (txid, raw) = sign_sweep(&key, connection.chain_id(), nonce, cold, &quote)?;
        let accepted = connection.send_raw_transaction(raw).await?;
        if accepted != txid {
            tracing::warn!(expected = %txid, returned = %accepted, "Node returned a different transaction hash");
        }

        tracing::info!(
            currency = symbol,
            from = %address,
            to = %cold,
            %txid,
            nonce,
            amount = %currency.display_amount(quote.send_amount),
            fee = %currency.display_amount(quote.gas_cost),
            "Collection transaction broadcast"
        );

        let now = unix_now();
        self.ledger.record_sweep(ChainBill {
            txid,
            address,
            from: address,
            to: Some(cold),
            currency_symbol: currency.symbol.clone(),
            chain_type: currency.chain_type,
            bill_type: BillType::Collection,
            direction: Direction::Outgoing,
            amount: quote.send_amount,
            fee: quote.gas_cost,
            nonce: Some(nonce),
            block_height: None,
            confirmations: 0,
            status: BillStatus::Pending,
            created_time: now,
            updated_time: now,
            settlement: Settlement::default(),
        });

        if self.config.debit_mode == DebitMode::Optimistic {
            self.debit_optimistically(currency, address, txid, quote.send_amount + quote.gas_cost)
                .await;
        }

        self.notifier.publish(WalletEvent::CollectionSubmitted {
            txid,
            from: address,
            to: cold,
            currency: currency.symbol.clone(),
            chain_type: currency.chain_type,
            amount: quote.send_amount,
            fee: quote.gas_cost,
        });

        Ok(SweepOutcome::Submitted(SweepReceipt {
            txid,
            from: address,
            to: cold,
            currency: currency.symbol.clone(),
            amount: quote.send_amount,
            fee: quote.gas_cost,
            nonce,
        }))
    }

    /// Fail a pending sweep that can no longer be mined. Returns whether the
    /// address is free to sweep again.
    ///
    /// A sweep is given up when its receipt is absent and either its nonce has
    /// been mined by another transaction, or the timeout passed and the node's
    /// pending nonce shows nothing queued at that nonce.
    async fn release_stale_sweep(
        &self,
        connection: &dyn ChainConnection,
        currency: &CurrencyConfig,
        txid: TxHash,
    ) -> bool {
        let Some(bill) = self.ledger.bill(&txid) else {
            return false;
        };
        let Some(nonce) = bill.nonce else {
            return false;
        };
        if !receipt_missing(connection, txid).await {
            return false;
        }

        let mined = match connection.transaction_count(bill.from).await {
            Ok(mined) => mined,
            Err(e) => {
                tracing::debug!(%txid, error = %e, "Nonce lookup failed, sweep stays in flight");
                return false;
            }
        };
        let reason = if mined > nonce {
            "nonce_reused"
        } else {
            let timeout = self.config.pending_sweep_timeout_secs;
            let age = unix_now().saturating_sub(bill.created_time);
            if timeout == 0 || age < timeout {
                return false;
            }
            match connection.pending_nonce(bill.from).await {
                Ok(pending) if pending <= nonce => "dropped",
                _ => return false,
            }
        };
        // The transaction may have landed between the lookups.
        if !receipt_missing(connection, txid).await {
            return false;
        }

        let changes = match self.ledger.expire_sweep(txid) {
            Ok(changes) => changes,
            Err(e) => {
                tracing::error!(%txid, error = %e, "Could not expire stale sweep");
                return false;
            }
        };
        tracing::warn!(
            currency = %currency.symbol,
            from = %bill.from,
            %txid,
            nonce,
            reason,
            "Stale sweep failed and refunded"
        );
        metrics::record_sweep(&currency.symbol, "expired");

        for change in changes {
            let user_id = self.inventory.owner_of(change.key.chain_type, change.key.address).await;
            self.notifier.publish(WalletEvent::BalanceChanged {
                user_id,
                address: change.key.address,
                currency: change.key.symbol,
                chain_type: change.key.chain_type,
                kind: change.kind,
                amount: change.amount,
                balance: change.balance,
            });
        }
        true
    }

    async fn debit_optimistically(
        &self,
        currency: &CurrencyConfig,
        address: Address,
        txid: TxHash,
        total: U256,
    ) {
        match self.ledger.debit_for_bill(txid, total) {
            Ok(Some(change)) => {
                let user_id = self.inventory.owner_of(currency.chain_type, address).await;
                self.notifier.publish(WalletEvent::BalanceChanged {
                    user_id,
                    address,
                    currency: change.key.symbol,
                    chain_type: change.key.chain_type,
                    kind: change.kind,
                    amount: change.amount,
                    balance: change.balance,
                });
            }
            Ok(None) => {}
            Err(e @ LedgerError::InsufficientFunds { .. }) => tracing::warn!(
                %txid,
                error = %e,
                "Ledger lacks funds for optimistic sweep debit, deferring to confirmation"
            ),
            Err(e) => tracing::error!(%txid, error = %e, "Optimistic sweep debit failed"),
        }
    }
}

/// True only when the node positively reports no receipt.
async fn receipt_missing(connection: &dyn ChainConnection, txid: TxHash) -> bool {
    match connection.transaction_receipt(txid).await {
        Ok(_) => false,
        Err(e) => !e.is_transient(),
    }
}

fn parse_cold_address(raw: &str) -> Result<Address, CollectionError> {
    let address = raw
        .trim()
        .parse::<Address>()
        .map_err(|_| CollectionError::ColdAddressInvalid(raw.to_string()))?;
    if address.is_zero() {
        return Err(CollectionError::ColdAddressInvalid(raw.to_string()));
    }
    Ok(address)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cold_address_must_be_set_and_non_zero() {
        assert!(parse_cold_address("").is_err());
        assert!(parse_cold_address("0x0000000000000000000000000000000000000000").is_err());
        assert!(parse_cold_address("not an address").is_err());
        let cold = parse_cold_address(" 0x00000000000000000000000000000000000000C0 ").unwrap();
        assert_eq!(cold, Address::with_last_byte(0xc0));
    }
}
