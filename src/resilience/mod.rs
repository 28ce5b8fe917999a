//! Retry timing for chain RPC calls.
//!
//! # Data Flow
//! ```text
//! RpcConnection call fails (transient)
//!     → backoff.rs (exponential delay with jitter)
//!     → next endpoint / next round
//! ```

pub mod backoff;
