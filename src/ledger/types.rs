//! Ledger rows and error definitions.

use alloy::primitives::{Address, TxHash, U256};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::blockchain::types::ChainType;
use crate::error::ErrorKind;

/// Seconds since the Unix epoch.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Identity of one balance row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BalanceKey {
    pub address: Address,
    /// Upper-cased currency symbol.
    pub symbol: String,
    pub chain_type: ChainType,
}

impl BalanceKey {
    pub fn new(address: Address, symbol: &str, chain_type: ChainType) -> Self {
        Self {
            address,
            symbol: symbol.to_ascii_uppercase(),
            chain_type,
        }
    }
}

impl std::fmt::Display for BalanceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}@{}", self.address, self.symbol, self.chain_type)
    }
}

/// Custodial balance in minor units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Balance {
    pub available: U256,
    pub frozen: U256,
}

impl Balance {
    /// Derived, never stored.
    pub fn total(&self) -> U256 {
        self.available.saturating_add(self.frozen)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentKind {
    Credit,
    Debit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillType {
    Deposit,
    Withdraw,
    Collection,
    Fee,
    /// Transfer between two managed addresses.
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillStatus {
    Pending,
    Confirmed,
    Failed,
}

impl BillStatus {
    /// Confirmed and failed bills never change status again.
    pub fn is_final(&self) -> bool {
        !matches!(self, BillStatus::Pending)
    }
}

/// Which managed side(s) a transaction touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Incoming,
    Outgoing,
    Internal,
}

impl Direction {
    pub fn classify(incoming: bool, outgoing: bool) -> Option<Self> {
        match (incoming, outgoing) {
            (true, true) => Some(Direction::Internal),
            (true, false) => Some(Direction::Incoming),
            (false, true) => Some(Direction::Outgoing),
            (false, false) => None,
        }
    }

    pub fn credits_recipient(&self) -> bool {
        matches!(self, Direction::Incoming | Direction::Internal)
    }

    pub fn debits_sender(&self) -> bool {
        matches!(self, Direction::Outgoing | Direction::Internal)
    }

    /// Default bill type for a freshly observed transaction.
    pub fn bill_type(&self) -> BillType {
        match self {
            Direction::Incoming => BillType::Deposit,
            Direction::Outgoing => BillType::Withdraw,
            Direction::Internal => BillType::Internal,
        }
    }
}

/// How much of a bill has already been applied to balances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Settlement {
    pub credited: U256,
    pub debited: U256,
}

/// One on-chain transaction as booked by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainBill {
    pub txid: TxHash,
    /// Managed address the bill is booked against (the sender for outgoing
    /// and internal transfers).
    pub address: Address,
    pub from: Address,
    pub to: Option<Address>,
    pub currency_symbol: String,
    pub chain_type: ChainType,
    pub bill_type: BillType,
    pub direction: Direction,
    pub amount: U256,
    pub fee: U256,
    /// Sender nonce, known for transactions this wallet signed.
    #[serde(default)]
    pub nonce: Option<u64>,
    pub block_height: Option<u64>,
    pub confirmations: u64,
    pub status: BillStatus,
    pub created_time: u64,
    pub updated_time: u64,
    #[serde(default)]
    pub settlement: Settlement,
}

impl ChainBill {
    /// Merge a re-observation into an existing row.
    ///
    /// Only status, confirmations and block height move; final statuses stick
    /// and confirmations never decrease. Returns whether anything changed.
    pub(crate) fn absorb(&mut self, observed: &ChainBill) -> bool {
        let mut changed = false;
        if !self.status.is_final() {
            if observed.status != self.status {
                self.status = observed.status;
                changed = true;
            }
            if observed.block_height.is_some() && observed.block_height != self.block_height {
                self.block_height = observed.block_height;
                changed = true;
            }
        }
        if observed.confirmations > self.confirmations {
            self.confirmations = observed.confirmations;
            changed = true;
        }
        if changed {
            self.updated_time = observed.updated_time.max(self.updated_time);
        }
        changed
    }

    pub fn credit_key(&self) -> Option<BalanceKey> {
        if !self.direction.credits_recipient() {
            return None;
        }
        self.to
            .map(|to| BalanceKey::new(to, &self.currency_symbol, self.chain_type))
    }

    pub fn debit_key(&self) -> Option<BalanceKey> {
        self.direction
            .debits_sender()
            .then(|| BalanceKey::new(self.from, &self.currency_symbol, self.chain_type))
    }

    /// Amount the recipient should have been credited given the current status.
    pub(crate) fn credit_target(&self) -> U256 {
        match self.status {
            BillStatus::Confirmed => self.amount,
            BillStatus::Failed => U256::ZERO,
            BillStatus::Pending => self.settlement.credited,
        }
    }

    /// Amount the sender should have been debited given the current status.
    ///
    /// A reverted transaction still burns its fee.
    pub(crate) fn debit_target(&self) -> U256 {
        match self.status {
            BillStatus::Confirmed => self.amount.saturating_add(self.fee),
            BillStatus::Failed => self.fee,
            BillStatus::Pending => self.settlement.debited,
        }
    }
}

/// Result of [`Ledger::record_transaction`](crate::ledger::Ledger::record_transaction).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Inserted,
    Updated { previous: BillStatus },
    Unchanged,
}

impl RecordOutcome {
    pub fn is_new(&self) -> bool {
        matches!(self, RecordOutcome::Inserted)
    }
}

/// A balance mutation, reported for notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceChange {
    pub key: BalanceKey,
    pub kind: AdjustmentKind,
    pub amount: U256,
    pub balance: Balance,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BillCounts {
    pub pending: usize,
    pub confirmed: usize,
    pub failed: usize,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("insufficient funds on {key}: available {available}, requested {requested}")]
    InsufficientFunds {
        key: BalanceKey,
        available: U256,
        requested: U256,
    },

    #[error("stale cursor for {symbol}: current {current}, attempted {attempted}")]
    StaleCursor {
        symbol: String,
        current: u64,
        attempted: u64,
    },

    #[error("unknown bill {0}")]
    UnknownBill(TxHash),

    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot format error: {0}")]
    Format(#[from] serde_json::Error),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            LedgerError::StaleCursor { .. } => ErrorKind::StaleCursor,
            LedgerError::UnknownBill(_) => ErrorKind::NotFound,
            LedgerError::Io(_) | LedgerError::Format(_) => ErrorKind::Internal,
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn bill(status: BillStatus) -> ChainBill {
        ChainBill {
            txid: TxHash::repeat_byte(1),
            address: Address::repeat_byte(0xaa),
            from: Address::repeat_byte(0x11),
            to: Some(Address::repeat_byte(0xaa)),
            currency_symbol: "ETH".into(),
            chain_type: ChainType::Ethereum,
            bill_type: BillType::Deposit,
            direction: Direction::Incoming,
            amount: U256::from(10),
            fee: U256::from(1),
            nonce: None,
            block_height: Some(5),
            confirmations: 0,
            status,
            created_time: 1,
            updated_time: 1,
            settlement: Settlement::default(),
        }
    }

    #[test]
    fn final_status_sticks_and_confirmations_only_grow() {
        let mut existing = bill(BillStatus::Confirmed);
        existing.confirmations = 4;

        let mut observed = bill(BillStatus::Pending);
        observed.confirmations = 2;
        observed.block_height = Some(9);
        assert!(!existing.absorb(&observed));
        assert_eq!(existing.status, BillStatus::Confirmed);
        assert_eq!(existing.block_height, Some(5));
        assert_eq!(existing.confirmations, 4);

        observed.confirmations = 6;
        assert!(existing.absorb(&observed));
        assert_eq!(existing.confirmations, 6);
    }

    #[test]
    fn direction_classification() {
        assert_eq!(Direction::classify(true, false), Some(Direction::Incoming));
        assert_eq!(Direction::classify(false, true), Some(Direction::Outgoing));
        assert_eq!(Direction::classify(true, true), Some(Direction::Internal));
        assert_eq!(Direction::classify(false, false), None);
        assert_eq!(Direction::Internal.bill_type(), BillType::Internal);
    }

    #[test]
    fn settlement_targets_follow_status() {
        let mut b = bill(BillStatus::Pending);
        assert_eq!(b.credit_target(), U256::ZERO);
        b.status = BillStatus::Confirmed;
        assert_eq!(b.credit_target(), U256::from(10));
        assert_eq!(b.debit_target(), U256::from(11));
        b.status = BillStatus::Failed;
        assert_eq!(b.debit_target(), U256::from(1));
        assert!(b.debit_key().is_none());
        assert!(b.credit_key().is_some());
    }
}
