//! Custodial ledger.
//!
//! # Data Flow
//! ```text
//! scanner    → record_transaction (upsert by txid) → settle (credit / debit)
//! collection → record_transaction (pending sweep)  → debit_for_bill (optimistic)
//! scanner    → get/set_scan_cursor (monotonic per currency)
//! scheduler  → save_to_file (periodic snapshot)
//! ```
//!
//! # Invariants
//! - One bill per txid; confirmed and failed bills are final
//! - `available` never goes below zero
//! - A bill's balance effect is applied at most once, whatever the replay count
//! - Cursors only move forward

pub mod snapshot;
pub mod store;
pub mod types;

pub use snapshot::LedgerSnapshot;
pub use store::Ledger;
pub use types::{
    AdjustmentKind, Balance, BalanceChange, BalanceKey, BillStatus, BillType, ChainBill, Direction,
    LedgerError, LedgerResult, RecordOutcome,
};
