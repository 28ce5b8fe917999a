use alloy::primitives::{Address, TxHash, U256};
use thiserror::Error;

use crate::blockchain::types::ChainError;
use crate::custody::CustodyError;
use crate::error::ErrorKind;
use crate::ledger::LedgerError;
use crate::lifecycle::ControlError;

#[derive(Debug, Error)]
pub enum CollectionError {
    #[error(transparent)]
    Control(#[from] ControlError),

    #[error("unknown currency {0}")]
    UnknownCurrency(String),

    #[error("invalid address {0:?}")]
    InvalidAddress(String),

    #[error("cold address is not usable: {0}")]
    ColdAddressInvalid(String),

    #[error("sweep {txid} from {address} is still pending")]
    SweepInFlight { address: Address, txid: TxHash },

    #[error("nothing to collect from {address}")]
    InsufficientFunds { address: Address },

    #[error("balance {balance} does not cover gas cost {gas_cost}")]
    InsufficientForGas { balance: U256, gas_cost: U256 },

    #[error(transparent)]
    Key(#[from] CustodyError),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl CollectionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CollectionError::Control(e) => e.kind(),
            CollectionError::UnknownCurrency(_) => ErrorKind::NotFound,
            CollectionError::InvalidAddress(_) => ErrorKind::InvalidRequest,
            CollectionError::ColdAddressInvalid(_) => ErrorKind::Config,
            CollectionError::SweepInFlight { .. } => ErrorKind::SweepInFlight,
            CollectionError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            CollectionError::InsufficientForGas { .. } => ErrorKind::InsufficientForGas,
            CollectionError::Key(_) => ErrorKind::KeyUnavailable,
            CollectionError::Chain(e) => e.kind(),
            CollectionError::Ledger(e) => e.kind(),
        }
    }
}
