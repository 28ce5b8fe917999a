//! Currency symbol to chain connection routing.

use std::collections::HashMap;
use std::sync::Arc;

use crate::blockchain::client::RpcConnection;
use crate::blockchain::connection::ChainConnection;
use crate::blockchain::types::{ChainConfig, ChainError, ChainResult, ChainType};
use crate::config::schema::{CurrencyConfig, RoutingConfig};

/// Built-in symbol routes; configured currencies and `[routing.symbols]` extend them.
pub fn default_routes() -> HashMap<String, ChainType> {
    [
        ("ETH", ChainType::Ethereum),
        ("USDT", ChainType::Ethereum),
        ("USDC", ChainType::Ethereum),
        ("BNB", ChainType::Bsc),
        ("BUSD", ChainType::Bsc),
    ]
    .into_iter()
    .map(|(symbol, chain)| (symbol.to_string(), chain))
    .collect()
}

/// One connection per chain plus the symbol routing table.
///
/// Built once at startup and shared by `Arc`; there is no global instance.
pub struct ChainRegistry {
    connections: HashMap<ChainType, Arc<dyn ChainConnection>>,
    routes: HashMap<String, ChainType>,
    fallback: ChainType,
}

impl ChainRegistry {
    /// Assemble a registry from already-built connections.
    pub fn new(
        connections: HashMap<ChainType, Arc<dyn ChainConnection>>,
        routing: &RoutingConfig,
        currencies: &[CurrencyConfig],
    ) -> Self {
        let mut routes = default_routes();
        for (symbol, chain) in &routing.symbols {
            routes.insert(symbol.to_ascii_uppercase(), *chain);
        }
        for currency in currencies {
            routes.insert(currency.symbol.to_ascii_uppercase(), currency.chain_type);
        }
        Self {
            connections,
            routes,
            fallback: routing.fallback_chain,
        }
    }

    /// Connect every enabled chain entry.
    ///
    /// A chain whose connection cannot be created is logged and left out, so
    /// its symbols resolve through the fallback chain.
    pub async fn connect(
        chains: &[ChainConfig],
        routing: &RoutingConfig,
        currencies: &[CurrencyConfig],
    ) -> Self {
        let mut connections: HashMap<ChainType, Arc<dyn ChainConnection>> = HashMap::new();
        for chain in chains.iter().filter(|c| c.enabled) {
            match RpcConnection::new(chain.clone()).await {
                Ok(connection) => {
                    connections.insert(chain.chain_type, Arc::new(connection));
                }
                Err(e) => {
                    tracing::warn!(
                        chain = %chain.chain_type,
                        error = %e,
                        "Failed to initialize chain connection"
                    );
                }
            }
        }
        if connections.is_empty() {
            tracing::error!("No chain connections available; scanning and collection will fail");
        }
        Self::new(connections, routing, currencies)
    }

    /// Chain a symbol is routed to, before any fallback.
    pub fn chain_for(&self, symbol: &str) -> ChainType {
        self.routes
            .get(&symbol.to_ascii_uppercase())
            .copied()
            .unwrap_or(self.fallback)
    }

    /// Connection serving `symbol`.
    pub fn resolve(&self, symbol: &str) -> ChainResult<Arc<dyn ChainConnection>> {
        let chain = self.chain_for(symbol);
        if let Some(connection) = self.connections.get(&chain) {
            return Ok(connection.clone());
        }
        if let Some(connection) = self.connections.get(&self.fallback) {
            tracing::debug!(
                symbol,
                routed = %chain,
                fallback = %self.fallback,
                "Routed chain unavailable, using fallback connection"
            );
            return Ok(connection.clone());
        }
        Err(ChainError::NoClientAvailable(symbol.to_string()))
    }

    /// Connection for a chain, without symbol routing or fallback.
    pub fn connection(&self, chain: ChainType) -> Option<Arc<dyn ChainConnection>> {
        self.connections.get(&chain).cloned()
    }

    pub fn chains(&self) -> Vec<ChainType> {
        let mut chains: Vec<_> = self.connections.keys().copied().collect();
        chains.sort();
        chains
    }
}

impl std::fmt::Debug for ChainRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainRegistry")
            .field("chains", &self.chains())
            .field("fallback", &self.fallback)
            .finish()
    }
}
