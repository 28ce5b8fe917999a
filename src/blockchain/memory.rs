//! In-process chain used by tests and local dry runs.
//!
//! Holds blocks, receipts and balances in memory and records every submitted raw
//! transaction so callers can inspect what would have been broadcast.

use alloy::consensus::{Transaction as _, TxEnvelope};
use alloy::eips::eip2718::Decodable2718;
use alloy::primitives::{Address, Bytes, TxHash, U256};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use crate::blockchain::connection::ChainConnection;
use crate::blockchain::types::{ChainBlock, ChainError, ChainResult, ChainTransaction, TxReceipt};

/// A decoded transaction that went through [`ChainConnection::send_raw_transaction`].
#[derive(Debug, Clone)]
pub struct SubmittedTx {
    pub hash: TxHash,
    pub to: Option<Address>,
    pub value: U256,
    pub nonce: u64,
    pub gas_limit: u64,
    pub gas_price: Option<u128>,
    pub chain_id: Option<u64>,
    pub raw: Bytes,
}

#[derive(Debug, Default)]
struct ChainState {
    head: u64,
    blocks: BTreeMap<u64, ChainBlock>,
    receipts: HashMap<TxHash, TxReceipt>,
    balances: HashMap<Address, U256>,
    nonces: HashMap<Address, u64>,
    gas_price: u128,
    gas_limit: u64,
    failing_blocks: HashSet<u64>,
    pruned_blocks: HashSet<u64>,
    offline: bool,
    submitted: Vec<SubmittedTx>,
}

/// Memory-backed [`ChainConnection`].
#[derive(Debug)]
pub struct InMemoryChain {
    chain_id: u64,
    state: Mutex<ChainState>,
    /// Artificial latency applied to block fetches.
    block_latency: Duration,
}

impl InMemoryChain {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            state: Mutex::new(ChainState {
                gas_price: 1_000_000_000,
                gas_limit: 21_000,
                ..ChainState::default()
            }),
            block_latency: Duration::ZERO,
        }
    }

    /// Delay every block fetch by `latency`.
    pub fn with_block_latency(mut self, latency: Duration) -> Self {
        self.block_latency = latency;
        self
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut ChainState) -> R) -> R {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    /// Advance the head without materialising intermediate blocks.
    ///
    /// Blocks that were never pushed are served empty.
    pub fn set_head(&self, head: u64) {
        self.with_state(|s| s.head = head);
    }

    pub fn head(&self) -> u64 {
        self.with_state(|s| s.head)
    }

    /// Append a block at `head + 1` containing `txs`; each pair carries the
    /// receipt status. Returns the new block number.
    pub fn push_block(&self, txs: Vec<(ChainTransaction, bool)>) -> u64 {
        self.with_state(|s| {
            let number = s.head + 1;
            let gas_price = s.gas_price;
            let gas_limit = s.gas_limit;
            let mut transactions = Vec::with_capacity(txs.len());
            for (tx, success) in txs {
                s.receipts.insert(
                    tx.hash,
                    TxReceipt {
                        tx_hash: tx.hash,
                        success,
                        block_number: Some(number),
                        gas_used: gas_limit,
                        effective_gas_price: gas_price,
                    },
                );
                transactions.push(tx);
            }
            s.blocks.insert(number, ChainBlock { number, transactions });
            s.head = number;
            number
        })
    }

    /// Place a receipt for a transaction that is not part of any pushed block.
    pub fn insert_receipt(&self, receipt: TxReceipt) {
        self.with_state(|s| {
            s.receipts.insert(receipt.tx_hash, receipt);
        });
    }

    /// Forget a receipt, so lookups answer `NotFound`.
    pub fn drop_receipt(&self, hash: TxHash) {
        self.with_state(|s| {
            s.receipts.remove(&hash);
        });
    }

    pub fn set_balance(&self, address: Address, balance: U256) {
        self.with_state(|s| {
            s.balances.insert(address, balance);
        });
    }

    /// Set the mined nonce of `address`, as if it had sent `nonce` transactions.
    pub fn set_nonce(&self, address: Address, nonce: u64) {
        self.with_state(|s| {
            s.nonces.insert(address, nonce);
        });
    }

    pub fn set_gas(&self, gas_price: u128, gas_limit: u64) {
        self.with_state(|s| {
            s.gas_price = gas_price;
            s.gas_limit = gas_limit;
        });
    }

    /// Make fetches of block `number` fail with a connection error.
    pub fn fail_block(&self, number: u64) {
        self.with_state(|s| {
            s.failing_blocks.insert(number);
        });
    }

    pub fn heal_block(&self, number: u64) {
        self.with_state(|s| {
            s.failing_blocks.remove(&number);
            s.pruned_blocks.remove(&number);
        });
    }

    /// Make fetches of block `number` answer `NotFound`, like a pruned node.
    pub fn prune_block(&self, number: u64) {
        self.with_state(|s| {
            s.pruned_blocks.insert(number);
        });
    }

    /// Toggle a full outage: every call fails with a connection error.
    pub fn set_offline(&self, offline: bool) {
        self.with_state(|s| s.offline = offline);
    }

    pub fn submitted(&self) -> Vec<SubmittedTx> {
        self.with_state(|s| s.submitted.clone())
    }

    fn ensure_online(&self) -> ChainResult<()> {
        if self.with_state(|s| s.offline) {
            return Err(ChainError::Connection("in-memory chain offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainConnection for InMemoryChain {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn block_number(&self) -> ChainResult<u64> {
        self.ensure_online()?;
        Ok(self.head())
    }

    async fn block_by_number(&self, number: u64) -> ChainResult<ChainBlock> {
        if !self.block_latency.is_zero() {
            tokio::time::sleep(self.block_latency).await;
        }
        self.ensure_online()?;
        self.with_state(|s| {
            if s.failing_blocks.contains(&number) {
                return Err(ChainError::Connection(format!("block {} unavailable", number)));
            }
            if number > s.head || s.pruned_blocks.contains(&number) {
                return Err(ChainError::NotFound(format!("block {}", number)));
            }
            Ok(s.blocks.get(&number).cloned().unwrap_or(ChainBlock {
                number,
                transactions: Vec::new(),
            }))
        })
    }

    async fn transaction_receipt(&self, hash: TxHash) -> ChainResult<TxReceipt> {
        self.ensure_online()?;
        self.with_state(|s| s.receipts.get(&hash).copied())
            .ok_or_else(|| ChainError::NotFound(format!("receipt {}", hash)))
    }

    async fn balance(&self, address: Address) -> ChainResult<U256> {
        self.ensure_online()?;
        Ok(self.with_state(|s| s.balances.get(&address).copied().unwrap_or_default()))
    }

    async fn estimate_gas(&self, _from: Address, _to: Address, _value: U256) -> ChainResult<u64> {
        self.ensure_online()?;
        Ok(self.with_state(|s| s.gas_limit))
    }

    async fn pending_nonce(&self, address: Address) -> ChainResult<u64> {
        self.ensure_online()?;
        Ok(self.with_state(|s| s.nonces.get(&address).copied().unwrap_or(0)))
    }

    async fn transaction_count(&self, address: Address) -> ChainResult<u64> {
        self.ensure_online()?;
        Ok(self.with_state(|s| s.nonces.get(&address).copied().unwrap_or(0)))
    }

    async fn gas_price(&self) -> ChainResult<u128> {
        self.ensure_online()?;
        Ok(self.with_state(|s| s.gas_price))
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> ChainResult<TxHash> {
        self.ensure_online()?;
        let envelope = TxEnvelope::decode_2718(&mut raw.as_ref())
            .map_err(|e| ChainError::Rejected(format!("undecodable transaction: {}", e)))?;
        let submitted = SubmittedTx {
            hash: *envelope.tx_hash(),
            to: envelope.to(),
            value: envelope.value(),
            nonce: envelope.nonce(),
            gas_limit: envelope.gas_limit(),
            gas_price: envelope.gas_price(),
            chain_id: envelope.chain_id(),
            raw,
        };
        let hash = submitted.hash;
        self.with_state(|s| s.submitted.push(submitted));
        Ok(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    #[tokio::test]
    async fn serves_pushed_and_implicit_blocks() {
        let chain = InMemoryChain::new(1);
        chain.set_head(5);
        let tx = ChainTransaction {
            hash: TxHash::repeat_byte(1),
            from: address!("00000000000000000000000000000000000000aa"),
            to: Some(address!("00000000000000000000000000000000000000bb")),
            value: U256::from(7),
        };
        let n = chain.push_block(vec![(tx.clone(), true)]);
        assert_eq!(n, 6);

        assert!(chain.block_by_number(3).await.unwrap().transactions.is_empty());
        assert_eq!(chain.block_by_number(6).await.unwrap().transactions, vec![tx.clone()]);
        assert!(matches!(
            chain.block_by_number(7).await,
            Err(ChainError::NotFound(_))
        ));

        let receipt = chain.transaction_receipt(tx.hash).await.unwrap();
        assert!(receipt.success);
        assert_eq!(receipt.block_number, Some(6));
    }

    #[tokio::test]
    async fn outage_and_failing_blocks_are_connection_errors() {
        let chain = InMemoryChain::new(1);
        chain.set_head(10);
        chain.fail_block(4);
        assert!(chain.block_by_number(4).await.unwrap_err().is_transient());
        chain.heal_block(4);
        assert!(chain.block_by_number(4).await.is_ok());

        chain.set_offline(true);
        assert!(chain.block_number().await.unwrap_err().is_transient());
    }
}
