//! Block scanning.
//!
//! # Data Flow
//! ```text
//! tick (per-currency cadence)
//!     → ledger cursor + chain head → block range (capped per cycle)
//!     → filter.rs (managed addresses of the chain, direction)
//!     → receipt → status (failed / confirmed / pending)
//!     → Ledger::record_transaction + Ledger::settle
//!     → notifications (deposit observed, balance changed)
//!     → cursor advance (per range or per block)
//! ```
//!
//! # Invariants
//! - Scans of the same currency never overlap (async mutex per currency)
//! - The cursor never moves backwards and never passes an unprocessed block
//!   in per-block mode
//! - Replaying any range is harmless: upsert and settlement are idempotent

pub mod error;
pub mod filter;
pub mod monitor;

pub use error::ScanError;
pub use filter::AddressFilter;
pub use monitor::{BlockScanner, CurrencyScan, ScanReport, ScannerStatus};
