//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! wallet.toml
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → WalletConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs parses, validation.rs validates
//!     → scheduler swaps the currency table (arc-swap)
//!     → scanner and collector see the new table on their next tick
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Only the currency table is hot-reloadable; chains, addresses and keys
//!   need a restart

pub mod loader;
pub mod schema;
pub mod table;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use table::CurrencyTable;
pub use schema::{
    AddressConfig, ChainConfig, CollectionConfig, CurrencyConfig, CursorMode, DebitMode,
    ScannerConfig, SchedulerConfig, WalletConfig,
};
