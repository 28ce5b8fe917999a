//! Lifecycle management.
//!
//! # Data Flow
//! ```text
//! control.rs:  start → loop runs (checks StopSignal between units) → stop → ack
//! shutdown.rs: Scheduler::shutdown → broadcast → auxiliary jobs exit
//! signals.rs:  SIGTERM/SIGINT → ordered process shutdown
//! startup.rs:  config → ledger, registry, inventory → scanner, collector → scheduler
//! ```

pub mod control;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use control::{ControlError, LoopControl, StopSignal};
pub use shutdown::Shutdown;
pub use startup::WalletRuntime;
