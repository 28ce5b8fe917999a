//! Scheduling of the scanner, the collector and auxiliary jobs.
//!
//! # Data Flow
//! ```text
//! Scheduler::start
//!     → BlockScanner loop    (tick = fastest currency cadence, per-currency due times)
//!     → CollectionEngine loop (collection.interval_secs)
//!     → jobs.rs: address pool monitor, confirmation refresh, ledger report
//!
//! Scheduler::shutdown
//!     → broadcast to jobs, stop both loops → await acknowledgement (bounded)
//!     → final ledger snapshot
//! ```

pub mod cadence;
pub mod jobs;
pub mod service;

pub use cadence::CadencePolicy;
pub use service::{Scheduler, SchedulerSettings};
