//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use alloy::primitives::utils::parse_ether;
use alloy::primitives::{Address, TxHash, U256};
use std::collections::HashMap;
use std::sync::Arc;

use custodial_wallet::blockchain::{
    ChainConnection, ChainRegistry, ChainTransaction, ChainType, InMemoryChain, SigningKey,
};
use custodial_wallet::collection::CollectionEngine;
use custodial_wallet::config::schema::{CollectionConfig, RoutingConfig, ScannerConfig};
use custodial_wallet::config::{CurrencyConfig, CurrencyTable, WalletConfig};
use custodial_wallet::custody::{
    AddressBook, AddressInventory, AddressRole, KeyCustody, ManagedAddress, StaticKeyCustody,
};
use custodial_wallet::events::{BroadcastNotifier, NotificationSink, WalletEvent};
use custodial_wallet::ledger::{BalanceKey, Ledger};
use custodial_wallet::lifecycle::WalletRuntime;
use custodial_wallet::scanner::BlockScanner;

pub const CHAIN_ID: u64 = 1;
pub const GWEI: u128 = 1_000_000_000;

/// Well-known development key; derives 0xf39F…2266.
pub const HOT_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

pub const DEPOSIT_USER: u64 = 7;

pub fn eth(amount: &str) -> U256 {
    parse_ether(amount).unwrap()
}

pub fn deposit_address() -> Address {
    Address::repeat_byte(0xd1)
}

pub fn outsider() -> Address {
    Address::repeat_byte(0x55)
}

pub fn cold_address() -> Address {
    Address::with_last_byte(0xc0)
}

pub fn hot_key() -> SigningKey {
    SigningKey::from_private_key(HOT_KEY).unwrap()
}

pub fn eth_currency(confirmations_required: u64) -> CurrencyConfig {
    CurrencyConfig {
        symbol: "ETH".to_string(),
        chain_type: ChainType::Ethereum,
        confirmations_required,
        collection_enabled: true,
        collection_threshold: "0.5".to_string(),
        ..CurrencyConfig::default()
    }
}

pub fn transfer(seed: u8, from: Address, to: Address, value: U256) -> ChainTransaction {
    ChainTransaction {
        hash: TxHash::repeat_byte(seed),
        from,
        to: Some(to),
        value,
    }
}

pub fn eth_key(address: Address) -> BalanceKey {
    BalanceKey::new(address, "ETH", ChainType::Ethereum)
}

pub fn collection_config(cold: Address) -> CollectionConfig {
    CollectionConfig {
        cold_address: format!("{:#x}", cold),
        ..CollectionConfig::default()
    }
}

/// One in-memory Ethereum chain with every collaborator around it.
pub struct Harness {
    pub chain: Arc<InMemoryChain>,
    pub registry: Arc<ChainRegistry>,
    pub ledger: Arc<Ledger>,
    pub book: Arc<AddressBook>,
    pub custody: Arc<StaticKeyCustody>,
    pub notifier: BroadcastNotifier,
    pub currencies: Arc<CurrencyTable>,
}

impl Harness {
    pub fn new(currencies: Vec<CurrencyConfig>) -> Self {
        Self::with_chain(InMemoryChain::new(CHAIN_ID), currencies)
    }

    pub fn with_chain(chain: InMemoryChain, currencies: Vec<CurrencyConfig>) -> Self {
        let chain = Arc::new(chain);
        let connection: Arc<dyn ChainConnection> = chain.clone();
        let mut connections = HashMap::new();
        connections.insert(ChainType::Ethereum, connection);
        let registry = Arc::new(ChainRegistry::new(
            connections,
            &RoutingConfig::default(),
            &currencies,
        ));

        let book = Arc::new(AddressBook::new());
        book.insert(
            ManagedAddress::new(deposit_address(), ChainType::Ethereum, AddressRole::Deposit)
                .with_user(DEPOSIT_USER),
        );

        Self {
            chain,
            registry,
            ledger: Arc::new(Ledger::new()),
            book,
            custody: Arc::new(StaticKeyCustody::new()),
            notifier: BroadcastNotifier::default(),
            currencies: Arc::new(CurrencyTable::new(currencies)),
        }
    }

    /// Register the development key as a hot address and return it.
    pub fn add_hot_address(&self) -> Address {
        let address = self.custody.insert(hot_key());
        self.book
            .insert(ManagedAddress::new(address, ChainType::Ethereum, AddressRole::Hot));
        address
    }

    pub fn inventory(&self) -> Arc<dyn AddressInventory> {
        self.book.clone()
    }

    pub fn sink(&self) -> Arc<dyn NotificationSink> {
        Arc::new(self.notifier.clone())
    }

    pub fn scanner(&self, config: ScannerConfig) -> Arc<BlockScanner> {
        Arc::new(BlockScanner::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.ledger),
            self.inventory(),
            Arc::clone(&self.currencies),
            self.sink(),
            config,
        ))
    }

    pub async fn collector(&self, config: CollectionConfig) -> Arc<CollectionEngine> {
        let custody: Arc<dyn KeyCustody> = self.custody.clone();
        Arc::new(
            CollectionEngine::new(
                Arc::clone(&self.registry),
                Arc::clone(&self.ledger),
                self.inventory(),
                custody,
                Arc::clone(&self.currencies),
                self.sink(),
                config,
            )
            .await,
        )
    }

    /// Full runtime over this harness' chain and ledger.
    pub async fn runtime(&self, config: WalletConfig) -> WalletRuntime {
        let custody: Arc<dyn KeyCustody> = self.custody.clone();
        WalletRuntime::assemble(
            config,
            Arc::clone(&self.registry),
            Arc::clone(&self.ledger),
            custody,
        )
        .await
    }

    pub fn balance(&self, address: Address) -> U256 {
        self.ledger.get_balance(&eth_key(address)).available
    }
}

/// Drain whatever is buffered on an event receiver.
pub fn drain(rx: &mut tokio::sync::broadcast::Receiver<WalletEvent>) -> Vec<WalletEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
