//! The narrow chain interface the scanner and collection engine depend on.

use alloy::primitives::{Address, Bytes, TxHash, U256};
use async_trait::async_trait;

use crate::blockchain::types::{ChainBlock, ChainResult, TxReceipt};

/// One live connection to an EVM chain.
///
/// Implementations return [`ChainError::Connection`] for transport failures and
/// [`ChainError::NotFound`] when the requested object does not exist.
///
/// [`ChainError::Connection`]: crate::blockchain::ChainError::Connection
/// [`ChainError::NotFound`]: crate::blockchain::ChainError::NotFound
#[async_trait]
pub trait ChainConnection: Send + Sync {
    /// Chain id used for EIP-155 signing.
    fn chain_id(&self) -> u64;

    /// Current head height.
    async fn block_number(&self) -> ChainResult<u64>;

    /// Block with full transaction bodies.
    async fn block_by_number(&self, number: u64) -> ChainResult<ChainBlock>;

    async fn transaction_receipt(&self, hash: TxHash) -> ChainResult<TxReceipt>;

    async fn balance(&self, address: Address) -> ChainResult<U256>;

    /// Gas needed for a plain value transfer.
    async fn estimate_gas(&self, from: Address, to: Address, value: U256) -> ChainResult<u64>;

    /// Nonce including transactions still in the mempool.
    async fn pending_nonce(&self, address: Address) -> ChainResult<u64>;

    /// Number of transactions from `address` included in the latest block.
    async fn transaction_count(&self, address: Address) -> ChainResult<u64>;

    /// Suggested legacy gas price in wei.
    async fn gas_price(&self) -> ChainResult<u128>;

    /// Submit an EIP-2718 encoded signed transaction.
    async fn send_raw_transaction(&self, raw: Bytes) -> ChainResult<TxHash>;
}
