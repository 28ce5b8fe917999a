//! Chain-specific types and error definitions.

use alloy::primitives::{Address, TxHash, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ErrorKind;

// Re-export ChainConfig from config module to avoid duplication
pub use crate::config::schema::ChainConfig;

/// Chain ID type for strong typing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChainId(pub u64);

impl From<u64> for ChainId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<ChainId> for u64 {
    fn from(id: ChainId) -> Self {
        id.0
    }
}

/// Blockchain family a connection, address or currency belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChainType {
    #[serde(rename = "Ethereum", alias = "ethereum", alias = "ETH")]
    Ethereum,
    #[serde(rename = "BSC", alias = "bsc", alias = "Bsc")]
    Bsc,
}

impl ChainType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainType::Ethereum => "Ethereum",
            ChainType::Bsc => "BSC",
        }
    }
}

impl std::fmt::Display for ChainType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ChainType {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ethereum" | "eth" => Ok(ChainType::Ethereum),
            "bsc" => Ok(ChainType::Bsc),
            other => Err(ChainError::NotAvailable(format!("unknown chain type '{}'", other))),
        }
    }
}

/// A transaction as it appears inside a fetched block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTransaction {
    pub hash: TxHash,
    /// Sender recovered from the transaction signature.
    pub from: Address,
    /// `None` for contract creation.
    pub to: Option<Address>,
    pub value: U256,
}

/// Block with its transactions in on-chain order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChainBlock {
    pub number: u64,
    pub transactions: Vec<ChainTransaction>,
}

/// Execution outcome of a mined transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    pub success: bool,
    pub block_number: Option<u64>,
    pub gas_used: u64,
    pub effective_gas_price: u128,
}

impl TxReceipt {
    /// Fee actually paid, in wei.
    pub fn fee(&self) -> U256 {
        U256::from(self.gas_used) * U256::from(self.effective_gas_price)
    }
}

/// Errors that can occur during blockchain operations.
#[derive(Debug, Error)]
pub enum ChainError {
    /// RPC connection or request failed. Transient; retried on the next tick.
    #[error("RPC error: {0}")]
    Connection(String),

    /// RPC request timed out.
    #[error("RPC timeout after {0} seconds")]
    Timeout(u64),

    /// Block, transaction or receipt does not exist (yet).
    #[error("Not found: {0}")]
    NotFound(String),

    /// No connection is configured for the currency or the fallback chain.
    #[error("No chain client available for {0}")]
    NoClientAvailable(String),

    /// Invalid private key format or signing failure.
    #[error("Wallet error: {0}")]
    Wallet(String),

    /// Gas price exceeded maximum allowed.
    #[error("Gas price {current_gwei} gwei exceeds maximum {max_gwei} gwei")]
    GasPriceTooHigh { current_gwei: u64, max_gwei: u64 },

    /// Node refused the signed transaction.
    #[error("Transaction rejected: {0}")]
    Rejected(String),

    /// Chain configuration mismatch.
    #[error("Chain ID mismatch: expected {expected}, got {actual}")]
    ChainMismatch { expected: u64, actual: u64 },

    /// Blockchain client not initialized or disabled.
    #[error("Blockchain not available: {0}")]
    NotAvailable(String),
}

impl ChainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChainError::Connection(_) | ChainError::Timeout(_) => ErrorKind::ConnectionError,
            ChainError::NotFound(_) => ErrorKind::NotFound,
            ChainError::NoClientAvailable(_) | ChainError::NotAvailable(_) => {
                ErrorKind::NoClientAvailable
            }
            ChainError::GasPriceTooHigh { .. } => ErrorKind::GasPriceTooHigh,
            ChainError::Wallet(_) | ChainError::Rejected(_) | ChainError::ChainMismatch { .. } => {
                ErrorKind::Internal
            }
        }
    }

    /// Whether the failure should abort the current cycle rather than skip one item.
    pub fn is_transient(&self) -> bool {
        matches!(self, ChainError::Connection(_) | ChainError::Timeout(_))
    }
}

/// Result type for blockchain operations.
pub type ChainResult<T> = Result<T, ChainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_id_conversion() {
        let chain_id = ChainId::from(1u64);
        assert_eq!(chain_id.0, 1);
        assert_eq!(u64::from(chain_id), 1);
    }

    #[test]
    fn test_chain_type_parsing() {
        assert_eq!("ethereum".parse::<ChainType>().unwrap(), ChainType::Ethereum);
        assert_eq!("BSC".parse::<ChainType>().unwrap(), ChainType::Bsc);
        assert!("solana".parse::<ChainType>().is_err());
        assert_eq!(ChainType::Bsc.to_string(), "BSC");
    }

    #[test]
    fn test_receipt_fee() {
        let receipt = TxReceipt {
            tx_hash: TxHash::ZERO,
            success: true,
            block_number: Some(10),
            gas_used: 21_000,
            effective_gas_price: 2_000_000_000,
        };
        assert_eq!(receipt.fee(), U256::from(42_000_000_000_000u64));
    }

    #[test]
    fn test_error_kinds() {
        assert!(ChainError::Timeout(10).is_transient());
        assert!(!ChainError::NotFound("block 7".into()).is_transient());
        assert_eq!(ChainError::Timeout(10).to_string(), "RPC timeout after 10 seconds");

        let err = ChainError::GasPriceTooHigh {
            current_gwei: 600,
            max_gwei: 500,
        };
        assert!(err.to_string().contains("600"));
        assert_eq!(err.kind(), ErrorKind::GasPriceTooHigh);
    }
}
