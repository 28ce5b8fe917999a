//! Custodial wallet core: chain scanning, an internal ledger and fund
//! collection from hot deposit addresses into a cold address.

pub mod admin;
pub mod blockchain;
pub mod collection;
pub mod config;
pub mod custody;
pub mod error;
pub mod events;
pub mod ledger;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod scanner;
pub mod scheduler;

pub use config::schema::WalletConfig;
pub use error::{ErrorKind, WalletError};
pub use lifecycle::{Shutdown, WalletRuntime};
