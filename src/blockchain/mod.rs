//! Blockchain integration subsystem.
//!
//! # Data Flow
//! ```text
//! [[chains]] config entries
//!     → client.rs (RPC connection with timeouts, failover, retry)
//!     → registry.rs (symbol → chain routing with fallback)
//!     → scanner / collection (through the ChainConnection trait)
//!
//! Sweeps:
//!     transaction.rs (price, build) → wallet.rs (sign) → connection (submit)
//! ```
//!
//! # Security Constraints
//! - Private keys only arrive through key custody
//! - Never log private keys or sensitive data
//! - All RPC calls have configurable timeouts

pub mod client;
pub mod connection;
pub mod memory;
pub mod registry;
pub mod transaction;
pub mod types;
pub mod wallet;

pub use client::RpcConnection;
pub use connection::ChainConnection;
pub use memory::InMemoryChain;
pub use registry::ChainRegistry;
pub use types::{ChainBlock, ChainConfig, ChainError, ChainId, ChainResult, ChainTransaction, ChainType, TxReceipt};
pub use wallet::SigningKey;
