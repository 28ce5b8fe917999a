use thiserror::Error;

use crate::blockchain::types::ChainError;
use crate::error::ErrorKind;
use crate::ledger::LedgerError;
use crate::lifecycle::ControlError;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    Control(#[from] ControlError),

    #[error("invalid block range {start}..{end}: start must be below end")]
    InvalidRange { start: u64, end: u64 },

    #[error("address set must not be empty")]
    EmptyAddressSet,

    #[error("invalid address {0:?}")]
    InvalidAddress(String),

    #[error("unknown currency {0}")]
    UnknownCurrency(String),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl ScanError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScanError::Control(e) => e.kind(),
            ScanError::InvalidRange { .. }
            | ScanError::EmptyAddressSet
            | ScanError::InvalidAddress(_) => ErrorKind::InvalidRequest,
            ScanError::UnknownCurrency(_) => ErrorKind::NotFound,
            ScanError::Chain(e) => e.kind(),
            ScanError::Ledger(e) => e.kind(),
        }
    }

    /// Worth retrying on the next tick without skipping anything.
    pub fn is_transient(&self) -> bool {
        matches!(self, ScanError::Chain(e) if e.is_transient())
    }
}
