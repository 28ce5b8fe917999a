//! Crate-wide error roll-up.
//!
//! Each subsystem owns its own `thiserror` enum; `WalletError` only exists so the
//! control surface can report any of them with a stable [`ErrorKind`].

use serde::Serialize;
use thiserror::Error;

use crate::blockchain::ChainError;
use crate::collection::CollectionError;
use crate::config::loader::ConfigError;
use crate::ledger::LedgerError;
use crate::lifecycle::ControlError;
use crate::scanner::ScanError;

/// Stable, serializable error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ConnectionError,
    NotFound,
    NoClientAvailable,
    InsufficientFunds,
    InsufficientForGas,
    KeyUnavailable,
    AlreadyRunning,
    NotRunning,
    StaleCursor,
    InvalidRequest,
    GasPriceTooHigh,
    SweepInFlight,
    Config,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ConnectionError => "connection_error",
            ErrorKind::NotFound => "not_found",
            ErrorKind::NoClientAvailable => "no_client_available",
            ErrorKind::InsufficientFunds => "insufficient_funds",
            ErrorKind::InsufficientForGas => "insufficient_for_gas",
            ErrorKind::KeyUnavailable => "key_unavailable",
            ErrorKind::AlreadyRunning => "already_running",
            ErrorKind::NotRunning => "not_running",
            ErrorKind::StaleCursor => "stale_cursor",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::GasPriceTooHigh => "gas_price_too_high",
            ErrorKind::SweepInFlight => "sweep_in_flight",
            ErrorKind::Config => "config",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum WalletError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Collection(#[from] CollectionError),

    #[error(transparent)]
    Control(#[from] ControlError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Malformed administrative input.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl WalletError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WalletError::Chain(e) => e.kind(),
            WalletError::Ledger(e) => e.kind(),
            WalletError::Scan(e) => e.kind(),
            WalletError::Collection(e) => e.kind(),
            WalletError::Control(e) => e.kind(),
            WalletError::Config(_) => ErrorKind::Config,
            WalletError::InvalidRequest(_) => ErrorKind::InvalidRequest,
        }
    }
}

pub type WalletResult<T> = Result<T, WalletError>;
