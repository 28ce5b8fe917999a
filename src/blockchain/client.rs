//! JSON-RPC chain connection with timeout, failover and retry.
//!
//! # Responsibilities
//! - Connect to a primary JSON-RPC endpoint plus failovers
//! - Query chain state (block number, blocks, balances, receipts)
//! - Submit signed transactions
//! - Handle timeouts and network errors gracefully

use alloy::eips::BlockNumberOrTag;
use alloy::network::{TransactionBuilder, TransactionResponse};
use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::transports::TransportError;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::blockchain::connection::ChainConnection;
use crate::blockchain::types::{
    ChainBlock, ChainConfig, ChainError, ChainId, ChainResult, ChainTransaction, TxReceipt,
};
use crate::observability::metrics;
use crate::resilience::backoff::calculate_backoff;

type DynProvider = Arc<dyn Provider + Send + Sync>;

/// Alloy-backed [`ChainConnection`] with failover support.
#[derive(Clone)]
pub struct RpcConnection {
    /// List of providers (primary + failovers).
    providers: Vec<DynProvider>,
    config: ChainConfig,
    timeout_duration: Duration,
}

impl RpcConnection {
    /// Create a connection from its chain entry.
    ///
    /// Fails only on an unusable primary URL; an unreachable node is logged and
    /// tolerated so the chain can come back later.
    pub async fn new(config: ChainConfig) -> ChainResult<Self> {
        let timeout_duration = Duration::from_secs(config.rpc_timeout_secs);
        let mut providers = Vec::new();

        let primary_url: url::Url = config.rpc_url.parse().map_err(|e| {
            ChainError::NotAvailable(format!("Invalid RPC URL '{}': {}", config.rpc_url, e))
        })?;
        providers.push(Arc::new(ProviderBuilder::new().connect_http(primary_url)) as DynProvider);

        for url_str in &config.failover_urls {
            if let Ok(url) = url_str.parse::<url::Url>() {
                providers.push(Arc::new(ProviderBuilder::new().connect_http(url)) as DynProvider);
            } else {
                tracing::warn!(url = %url_str, "Ignoring invalid failover RPC URL");
            }
        }

        let connection = Self {
            providers,
            config: config.clone(),
            timeout_duration,
        };

        match connection.verify_chain_id().await {
            Ok(()) => {
                tracing::info!(
                    chain = %config.chain_type,
                    rpc_url = %config.rpc_url,
                    chain_id = config.chain_id,
                    "Chain connection initialized"
                );
            }
            Err(e) => {
                tracing::warn!(
                    chain = %config.chain_type,
                    error = %e,
                    "Chain connection initialized but chain verification failed"
                );
            }
        }

        Ok(connection)
    }

    /// Verify the connected chain ID matches configuration.
    pub async fn verify_chain_id(&self) -> ChainResult<()> {
        let chain_id = self.remote_chain_id().await?;
        if chain_id.0 != self.config.chain_id {
            return Err(ChainError::ChainMismatch {
                expected: self.config.chain_id,
                actual: chain_id.0,
            });
        }
        Ok(())
    }

    /// Chain ID as reported by the node.
    pub async fn remote_chain_id(&self) -> ChainResult<ChainId> {
        self.call("get chain id", |p| async move { p.get_chain_id().await })
            .await
            .map(ChainId)
    }

    /// Run `f` against each provider in turn, for up to `retry_attempts` rounds.
    async fn call<T, F, Fut>(&self, op: &'static str, f: F) -> ChainResult<T>
    where
        F: Fn(DynProvider) -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let rounds = self.config.retry_attempts.max(1);
        for round in 0..rounds {
            if round > 0 {
                let delay = calculate_backoff(
                    round,
                    self.config.retry_base_delay_ms,
                    self.config.retry_max_delay_ms,
                );
                tokio::time::sleep(delay).await;
            }
            for (i, provider) in self.providers.iter().enumerate() {
                match timeout(self.timeout_duration, f(provider.clone())).await {
                    Ok(Ok(result)) => return Ok(result),
                    Ok(Err(e)) => tracing::warn!(provider_idx = i, round, op, error = %e, "RPC error"),
                    Err(_) => tracing::warn!(provider_idx = i, round, op, "RPC timeout"),
                }
            }
        }
        metrics::record_rpc_failure(self.config.chain_type.as_str(), op);
        Err(ChainError::Connection(format!("All providers failed to {}", op)))
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }
}

#[async_trait]
impl ChainConnection for RpcConnection {
    fn chain_id(&self) -> u64 {
        self.config.chain_id
    }

    async fn block_number(&self) -> ChainResult<u64> {
        self.call("get block number", |p| async move { p.get_block_number().await })
            .await
    }

    async fn block_by_number(&self, number: u64) -> ChainResult<ChainBlock> {
        let block = self
            .call("get block", move |p| async move {
                p.get_block_by_number(BlockNumberOrTag::Number(number))
                    .full()
                    .await
            })
            .await?
            .ok_or_else(|| ChainError::NotFound(format!("block {}", number)))?;

        let transactions = block
            .transactions
            .into_transactions()
            .map(|tx| ChainTransaction {
                hash: TransactionResponse::tx_hash(&tx),
                from: TransactionResponse::from(&tx),
                to: alloy::consensus::Transaction::to(&tx),
                value: alloy::consensus::Transaction::value(&tx),
            })
            .collect();

        Ok(ChainBlock {
            number: block.header.number,
            transactions,
        })
    }

    async fn transaction_receipt(&self, hash: TxHash) -> ChainResult<TxReceipt> {
        let receipt = self
            .call("get receipt", move |p| async move {
                p.get_transaction_receipt(hash).await
            })
            .await?
            .ok_or_else(|| ChainError::NotFound(format!("receipt {}", hash)))?;

        Ok(TxReceipt {
            tx_hash: receipt.transaction_hash,
            success: receipt.status(),
            block_number: receipt.block_number,
            gas_used: receipt.gas_used,
            effective_gas_price: receipt.effective_gas_price,
        })
    }

    async fn balance(&self, address: Address) -> ChainResult<U256> {
        self.call("get balance", move |p| async move { p.get_balance(address).await })
            .await
    }

    async fn estimate_gas(&self, from: Address, to: Address, value: U256) -> ChainResult<u64> {
        self.call("estimate gas", move |p| async move {
            let request = TransactionRequest::default()
                .with_from(from)
                .with_to(to)
                .with_value(value);
            p.estimate_gas(request).await
        })
        .await
    }

    async fn pending_nonce(&self, address: Address) -> ChainResult<u64> {
        self.call("get pending nonce", move |p| async move {
            p.get_transaction_count(address).pending().await
        })
        .await
    }

    async fn transaction_count(&self, address: Address) -> ChainResult<u64> {
        self.call("get transaction count", move |p| async move {
            p.get_transaction_count(address).latest().await
        })
        .await
    }

    async fn gas_price(&self) -> ChainResult<u128> {
        self.call("get gas price", |p| async move { p.get_gas_price().await })
            .await
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> ChainResult<TxHash> {
        // No retry rounds: a node-level rejection is final and resubmission is left
        // to the next collection cycle.
        for (i, provider) in self.providers.iter().enumerate() {
            match timeout(self.timeout_duration, provider.send_raw_transaction(&raw)).await {
                Ok(Ok(pending)) => return Ok(*pending.tx_hash()),
                Ok(Err(e)) if e.as_error_resp().is_some() => {
                    return Err(ChainError::Rejected(e.to_string()));
                }
                Ok(Err(e)) => tracing::warn!(provider_idx = i, error = %e, "RPC error on submit"),
                Err(_) => tracing::warn!(provider_idx = i, "RPC timeout on submit"),
            }
        }
        metrics::record_rpc_failure(self.config.chain_type.as_str(), "send raw transaction");
        Err(ChainError::Connection(
            "All providers failed to send raw transaction".to_string(),
        ))
    }
}

impl std::fmt::Debug for RpcConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcConnection")
            .field("chain", &self.config.chain_type)
            .field("rpc_url", &self.config.rpc_url)
            .field("chain_id", &self.config.chain_id)
            .field("providers", &self.providers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::types::ChainType;

    fn test_config() -> ChainConfig {
        ChainConfig {
            chain_type: ChainType::Ethereum,
            enabled: true,
            // Nothing listens here; calls fail fast with connection refused.
            rpc_url: "http://127.0.0.1:1".to_string(),
            failover_urls: Vec::new(),
            chain_id: 31337,
            rpc_timeout_secs: 2,
            retry_attempts: 1,
            retry_base_delay_ms: 10,
            retry_max_delay_ms: 20,
        }
    }

    #[tokio::test]
    async fn test_connection_creation_tolerates_unreachable_node() {
        let result = RpcConnection::new(test_config()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_primary_url_is_rejected() {
        let mut config = test_config();
        config.rpc_url = "not a url".to_string();
        let err = RpcConnection::new(config).await.unwrap_err();
        assert!(err.to_string().contains("Invalid RPC URL"));
    }

    #[tokio::test]
    async fn test_rpc_failover_exhaustion_is_connection_error() {
        let mut config = test_config();
        config.failover_urls.push("http://127.0.0.1:2".to_string());
        config.failover_urls.push("::bad::".to_string());

        let connection = RpcConnection::new(config).await.unwrap();
        assert_eq!(connection.providers.len(), 2);

        let err = connection.block_number().await.unwrap_err();
        assert!(err.is_transient());
        assert!(err.to_string().contains("All providers failed"));
    }
}
