//! Assembly of the wallet core from a validated config.
//!
//! Order: ledger → registry → inventory → currency table → scanner →
//! collector → scheduler. Nothing starts running here.

use std::sync::Arc;
use std::time::Duration;

use crate::admin::AdminState;
use crate::blockchain::ChainRegistry;
use crate::collection::CollectionEngine;
use crate::config::schema::WalletConfig;
use crate::config::CurrencyTable;
use crate::custody::{AddressBook, AddressInventory, KeyCustody};
use crate::events::{BroadcastNotifier, NotificationSink};
use crate::ledger::Ledger;
use crate::scanner::BlockScanner;
use crate::scheduler::{CadencePolicy, Scheduler, SchedulerSettings};

/// Every long-lived component, wired together.
pub struct WalletRuntime {
    pub config: WalletConfig,
    pub ledger: Arc<Ledger>,
    pub registry: Arc<ChainRegistry>,
    pub address_book: Arc<AddressBook>,
    pub currencies: Arc<CurrencyTable>,
    pub notifier: BroadcastNotifier,
    pub scheduler: Arc<Scheduler>,
}

impl WalletRuntime {
    pub async fn assemble(
        config: WalletConfig,
        registry: Arc<ChainRegistry>,
        ledger: Arc<Ledger>,
        custody: Arc<dyn KeyCustody>,
    ) -> Self {
        let address_book = Arc::new(AddressBook::from_config(&config.addresses));
        let inventory: Arc<dyn AddressInventory> = address_book.clone();
        let currencies = Arc::new(CurrencyTable::new(config.currencies.clone()));
        let notifier = BroadcastNotifier::default();
        let sink: Arc<dyn NotificationSink> = Arc::new(notifier.clone());

        let scanner = Arc::new(
            BlockScanner::new(
                Arc::clone(&registry),
                Arc::clone(&ledger),
                Arc::clone(&inventory),
                Arc::clone(&currencies),
                Arc::clone(&sink),
                config.scanner.clone(),
            )
            .with_cadence(CadencePolicy::from_config(&config.scheduler)),
        );

        let collector = Arc::new(
            CollectionEngine::new(
                Arc::clone(&registry),
                Arc::clone(&ledger),
                Arc::clone(&inventory),
                custody,
                Arc::clone(&currencies),
                sink,
                config.collection.clone(),
            )
            .await,
        );

        let scheduler = Arc::new(Scheduler::new(
            scanner,
            collector,
            Arc::clone(&ledger),
            inventory,
            Arc::clone(&registry),
            Arc::clone(&currencies),
            SchedulerSettings::from_config(&config),
        ));

        tracing::info!(
            chains = registry.chains().len(),
            currencies = config.currencies.len(),
            addresses = address_book.len(),
            "Wallet core assembled"
        );

        Self {
            config,
            ledger,
            registry,
            address_book,
            currencies,
            notifier,
            scheduler,
        }
    }

    pub fn admin_state(&self) -> AdminState {
        AdminState {
            scheduler: Arc::clone(&self.scheduler),
            ledger: Arc::clone(&self.ledger),
            registry: Arc::clone(&self.registry),
            notifier: self.notifier.clone(),
            api_key: Arc::from(self.config.admin.api_key.as_str()),
            collection_interval_secs: self.config.collection.interval_secs,
        }
    }

    pub fn admin_request_timeout(&self) -> Duration {
        Duration::from_secs(self.config.admin.request_timeout_secs)
    }
}
