//! Fund collection.
//!
//! # Data Flow
//! ```text
//! pass (timer or manual) → collection-enabled currencies → non-frozen hot addresses
//!     per address, under its lock:
//!     → pending sweep in ledger?      → skip (in flight)
//!     → on-chain balance vs threshold → skip (below)
//!     → cold address, signing key
//!     → gas quote (price ceiling, balance must exceed gas cost)
//!     → pending nonce → sign (EIP-155) → broadcast
//!     → ledger: pending collection bill (+ optimistic debit)
//!     → CollectionSubmitted notification
//! ```
//!
//! # Invariants
//! - At most one unconfirmed sweep per (address, currency)
//! - Nothing is signed before the cold address and the gas cost check pass
//! - One address failing never stops the pass

pub mod engine;
pub mod error;
pub mod locks;

pub use engine::{CollectionEngine, CollectionStatus, SweepAttempt, SweepOutcome, SweepReceipt};
pub use error::CollectionError;
pub use locks::AddressLocks;
