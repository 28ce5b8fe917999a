//! The authoritative in-process ledger.
//!
//! Balance rows, bills and cursors each live in their own `DashMap`. Mutations
//! happen inside a single entry guard, which serialises writers per key without
//! a global lock. When a bill and a balance are touched together the bill guard
//! is taken first; nothing takes them in the opposite order.

use alloy::primitives::{Address, TxHash, U256};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::BTreeMap;

use crate::ledger::snapshot::{BalanceRecord, LedgerSnapshot};
use crate::ledger::types::{
    unix_now, AdjustmentKind, Balance, BalanceChange, BalanceKey, BillCounts, BillStatus,
    BillType, ChainBill, LedgerError, LedgerResult, RecordOutcome, Settlement,
};
use crate::observability::metrics;

#[derive(Debug, Default)]
pub struct Ledger {
    balances: DashMap<BalanceKey, Balance>,
    bills: DashMap<TxHash, ChainBill>,
    cursors: DashMap<String, u64>,
    /// Pending collection per (address, symbol).
    open_sweeps: DashMap<(Address, String), TxHash>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert a bill by txid.
    ///
    /// A new txid is inserted as given. An existing row only takes over status,
    /// confirmations and block height from `bill`; duplicates never error.
    pub fn record_transaction(&self, bill: ChainBill) -> RecordOutcome {
        let txid = bill.txid;
        let outcome = match self.bills.entry(txid) {
            Entry::Vacant(vacant) => {
                self.track_sweep(&bill);
                metrics::record_bill(&bill.currency_symbol, bill_type_label(bill.bill_type));
                vacant.insert(bill);
                RecordOutcome::Inserted
            }
            Entry::Occupied(mut occupied) => {
                let existing = occupied.get_mut();
                let previous = existing.status;
                if existing.absorb(&bill) {
                    self.track_sweep(existing);
                    RecordOutcome::Updated { previous }
                } else {
                    RecordOutcome::Unchanged
                }
            }
        };
        tracing::debug!(%txid, ?outcome, "Bill recorded");
        outcome
    }

    /// Record a sweep this wallet just broadcast.
    ///
    /// Re-signing an expired sweep with the same nonce and gas yields the same
    /// txid; that failed row carries no balance effect and is reopened as the
    /// new pending bill. Anything else goes through [`Ledger::record_transaction`].
    pub fn record_sweep(&self, bill: ChainBill) -> RecordOutcome {
        let reopened = match self.bills.get_mut(&bill.txid) {
            Some(mut existing)
                if existing.bill_type == BillType::Collection
                    && existing.status == BillStatus::Failed
                    && existing.settlement == Settlement::default() =>
            {
                *existing = bill.clone();
                self.track_sweep(&existing);
                true
            }
            _ => false,
        };
        if reopened {
            tracing::info!(txid = %bill.txid, "Expired sweep rebroadcast, bill reopened");
            return RecordOutcome::Updated {
                previous: BillStatus::Failed,
            };
        }
        self.record_transaction(bill)
    }

    fn track_sweep(&self, bill: &ChainBill) {
        if bill.bill_type != BillType::Collection {
            return;
        }
        let key = (bill.from, bill.currency_symbol.to_ascii_uppercase());
        if bill.status == BillStatus::Pending {
            self.open_sweeps.insert(key, bill.txid);
        } else {
            self.open_sweeps.remove_if(&key, |_, txid| *txid == bill.txid);
        }
    }

    /// Credit or debit `amount` on a balance row.
    ///
    /// Debits require `available >= amount`; the row never goes negative.
    pub fn adjust_balance(
        &self,
        key: &BalanceKey,
        amount: U256,
        kind: AdjustmentKind,
    ) -> LedgerResult<Balance> {
        let balance = match kind {
            AdjustmentKind::Credit => {
                let mut row = self.balances.entry(key.clone()).or_default();
                row.available = row.available.saturating_add(amount);
                *row
            }
            AdjustmentKind::Debit => {
                let Some(mut row) = self.balances.get_mut(key) else {
                    return Err(LedgerError::InsufficientFunds {
                        key: key.clone(),
                        available: U256::ZERO,
                        requested: amount,
                    });
                };
                if row.available < amount {
                    return Err(LedgerError::InsufficientFunds {
                        key: key.clone(),
                        available: row.available,
                        requested: amount,
                    });
                }
                row.available -= amount;
                *row
            }
        };
        tracing::debug!(%key, ?kind, %amount, available = %balance.available, "Balance adjusted");
        Ok(balance)
    }

    /// Current balance; zero for unknown rows.
    pub fn get_balance(&self, key: &BalanceKey) -> Balance {
        self.balances.get(key).map(|b| *b).unwrap_or_default()
    }

    /// All balance rows of one address.
    pub fn balances_for(&self, address: Address) -> Vec<(BalanceKey, Balance)> {
        let mut rows: Vec<_> = self
            .balances
            .iter()
            .filter(|row| row.key().address == address)
            .map(|row| (row.key().clone(), *row.value()))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        rows
    }

    /// Bring the balance effect of a bill in line with its status.
    ///
    /// Applies only the difference between what the status implies and what the
    /// bill's settlement already recorded, so calling it repeatedly is harmless.
    pub fn settle(&self, txid: TxHash) -> LedgerResult<Vec<BalanceChange>> {
        let mut bill = self
            .bills
            .get_mut(&txid)
            .ok_or(LedgerError::UnknownBill(txid))?;
        let mut changes = Vec::new();

        if let Some(key) = bill.credit_key() {
            let target = bill.credit_target();
            let applied = bill.settlement.credited;
            if let Some(change) = self.move_towards(&key, applied, target, AdjustmentKind::Credit)? {
                changes.push(change);
            }
            bill.settlement.credited = target;
        }

        if let Some(key) = bill.debit_key() {
            let target = bill.debit_target();
            let applied = bill.settlement.debited;
            if let Some(change) = self.move_towards(&key, applied, target, AdjustmentKind::Debit)? {
                changes.push(change);
            }
            bill.settlement.debited = target;
        }

        Ok(changes)
    }

    /// Adjust `key` so the applied amount goes from `applied` to `target`, in the
    /// direction `forward` when growing and the opposite when shrinking.
    fn move_towards(
        &self,
        key: &BalanceKey,
        applied: U256,
        target: U256,
        forward: AdjustmentKind,
    ) -> LedgerResult<Option<BalanceChange>> {
        if target == applied {
            return Ok(None);
        }
        let (kind, amount) = if target > applied {
            (forward, target - applied)
        } else {
            let reverse = match forward {
                AdjustmentKind::Credit => AdjustmentKind::Debit,
                AdjustmentKind::Debit => AdjustmentKind::Credit,
            };
            (reverse, applied - target)
        };
        let balance = self.adjust_balance(key, amount, kind)?;
        Ok(Some(BalanceChange {
            key: key.clone(),
            kind,
            amount,
            balance,
        }))
    }

    /// Debit the sender of an outgoing bill ahead of confirmation.
    ///
    /// Raises the bill's recorded debit to `amount`; a later [`Ledger::settle`]
    /// reconciles against the real outcome.
    pub fn debit_for_bill(&self, txid: TxHash, amount: U256) -> LedgerResult<Option<BalanceChange>> {
        let mut bill = self
            .bills
            .get_mut(&txid)
            .ok_or(LedgerError::UnknownBill(txid))?;
        let Some(key) = bill.debit_key() else {
            return Ok(None);
        };
        let applied = bill.settlement.debited;
        if amount <= applied {
            return Ok(None);
        }
        let change = self.move_towards(&key, applied, amount, AdjustmentKind::Debit)?;
        bill.settlement.debited = amount;
        Ok(change)
    }

    /// Fail a pending sweep that will never be mined and undo its balance effect.
    ///
    /// Nothing reached the chain, so no fee is charged and any optimistic debit
    /// is credited back in full. A bill that already reached a final status is
    /// left alone.
    pub fn expire_sweep(&self, txid: TxHash) -> LedgerResult<Vec<BalanceChange>> {
        {
            let mut bill = self
                .bills
                .get_mut(&txid)
                .ok_or(LedgerError::UnknownBill(txid))?;
            if bill.status.is_final() {
                return Ok(Vec::new());
            }
            bill.status = BillStatus::Failed;
            bill.fee = U256::ZERO;
            bill.updated_time = unix_now();
            self.track_sweep(&bill);
        }
        tracing::info!(%txid, "Pending sweep expired");
        self.settle(txid)
    }

    pub fn bill(&self, txid: &TxHash) -> Option<ChainBill> {
        self.bills.get(txid).map(|b| b.value().clone())
    }

    pub fn bills_with_status(&self, status: BillStatus) -> Vec<ChainBill> {
        let mut bills: Vec<_> = self
            .bills
            .iter()
            .filter(|b| b.status == status)
            .map(|b| b.value().clone())
            .collect();
        bills.sort_by_key(|b| (b.block_height, b.created_time));
        bills
    }

    pub fn bill_counts(&self) -> BillCounts {
        let mut counts = BillCounts::default();
        for bill in self.bills.iter() {
            match bill.status {
                BillStatus::Pending => counts.pending += 1,
                BillStatus::Confirmed => counts.confirmed += 1,
                BillStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    pub fn bill_count(&self) -> usize {
        self.bills.len()
    }

    /// Txid of the unconfirmed sweep from `address`, if any.
    pub fn pending_collection(&self, address: Address, symbol: &str) -> Option<TxHash> {
        self.open_sweeps
            .get(&(address, symbol.to_ascii_uppercase()))
            .map(|t| *t)
    }

    /// Last fully processed block for `symbol`.
    pub fn get_scan_cursor(&self, symbol: &str) -> Option<u64> {
        self.cursors.get(&symbol.to_ascii_uppercase()).map(|c| *c)
    }

    /// Move the cursor forward. Lower heights are rejected, equal ones accepted.
    pub fn set_scan_cursor(&self, symbol: &str, height: u64) -> LedgerResult<()> {
        let symbol = symbol.to_ascii_uppercase();
        match self.cursors.entry(symbol.clone()) {
            Entry::Occupied(mut occupied) => {
                let current = *occupied.get();
                if height < current {
                    return Err(LedgerError::StaleCursor {
                        symbol,
                        current,
                        attempted: height,
                    });
                }
                *occupied.get_mut() = height;
            }
            Entry::Vacant(vacant) => {
                vacant.insert(height);
            }
        }
        metrics::record_cursor(&symbol, height);
        Ok(())
    }

    pub fn cursors(&self) -> BTreeMap<String, u64> {
        self.cursors
            .iter()
            .map(|c| (c.key().clone(), *c.value()))
            .collect()
    }

    /// Consistent-enough copy for persistence.
    ///
    /// Rows are copied one at a time; a snapshot taken during activity may mix
    /// states from adjacent instants, which settlement replay tolerates.
    pub fn snapshot(&self) -> LedgerSnapshot {
        let mut balances: Vec<_> = self
            .balances
            .iter()
            .map(|row| BalanceRecord {
                key: row.key().clone(),
                balance: *row.value(),
            })
            .collect();
        balances.sort_by(|a, b| a.key.cmp(&b.key));

        let mut bills: Vec<_> = self.bills.iter().map(|b| b.value().clone()).collect();
        bills.sort_by_key(|b| (b.created_time, b.txid));

        LedgerSnapshot {
            balances,
            bills,
            cursors: self.cursors(),
        }
    }

    pub fn from_snapshot(snapshot: LedgerSnapshot) -> Self {
        let ledger = Self::new();
        for record in snapshot.balances {
            ledger.balances.insert(record.key, record.balance);
        }
        for bill in snapshot.bills {
            ledger.track_sweep(&bill);
            ledger.bills.insert(bill.txid, bill);
        }
        for (symbol, height) in snapshot.cursors {
            ledger.cursors.insert(symbol.to_ascii_uppercase(), height);
        }
        ledger
    }
}

fn bill_type_label(bill_type: BillType) -> &'static str {
    match bill_type {
        BillType::Deposit => "deposit",
        BillType::Withdraw => "withdraw",
        BillType::Collection => "collection",
        BillType::Fee => "fee",
        BillType::Internal => "internal",
    }
}
