//! Owns every periodic task of the wallet core.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::blockchain::ChainRegistry;
use crate::collection::{CollectionEngine, CollectionError};
use crate::config::schema::{CurrencyConfig, SchedulerConfig, WalletConfig};
use crate::config::CurrencyTable;
use crate::custody::AddressInventory;
use crate::ledger::Ledger;
use crate::lifecycle::{ControlError, Shutdown};
use crate::scanner::{BlockScanner, ScanError};
use crate::scheduler::jobs::{check_address_pool, ledger_report, spawn_periodic};

/// Startup switches taken from the wider config.
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub timers: SchedulerConfig,
    pub scanner_autostart: bool,
    pub collection_autostart: bool,
    pub collection_interval: Duration,
    pub snapshot_path: Option<PathBuf>,
}

impl SchedulerSettings {
    pub fn from_config(config: &WalletConfig) -> Self {
        Self {
            timers: config.scheduler.clone(),
            scanner_autostart: config.scanner.autostart,
            collection_autostart: config.collection.autostart,
            collection_interval: Duration::from_secs(config.collection.interval_secs),
            snapshot_path: config.ledger.snapshot_path.as_ref().map(PathBuf::from),
        }
    }
}

struct RunningJobs {
    shutdown: Shutdown,
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

pub struct Scheduler {
    scanner: Arc<BlockScanner>,
    collector: Arc<CollectionEngine>,
    ledger: Arc<Ledger>,
    inventory: Arc<dyn AddressInventory>,
    registry: Arc<ChainRegistry>,
    currencies: Arc<CurrencyTable>,
    settings: SchedulerSettings,
    running: Mutex<Option<RunningJobs>>,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        scanner: Arc<BlockScanner>,
        collector: Arc<CollectionEngine>,
        ledger: Arc<Ledger>,
        inventory: Arc<dyn AddressInventory>,
        registry: Arc<ChainRegistry>,
        currencies: Arc<CurrencyTable>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            scanner,
            collector,
            ledger,
            inventory,
            registry,
            currencies,
            settings,
            running: Mutex::new(None),
        }
    }

    /// Start the loops that are set to autostart plus the auxiliary jobs.
    pub async fn start(&self) -> Result<(), ControlError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(ControlError::AlreadyRunning("scheduler"));
        }

        if self.settings.scanner_autostart {
            match self.scanner.start_continuous() {
                Ok(()) | Err(ScanError::Control(ControlError::AlreadyRunning(_))) => {}
                Err(e) => tracing::error!(error = %e, "Failed to start block scanner"),
            }
        }
        if self.settings.collection_autostart {
            match self.collector.start_loop(self.settings.collection_interval) {
                Ok(()) | Err(CollectionError::Control(ControlError::AlreadyRunning(_))) => {}
                Err(e) => tracing::error!(error = %e, "Failed to start collection loop"),
            }
        }

        let shutdown = Shutdown::new();
        let timers = &self.settings.timers;
        let mut handles = Vec::new();

        let inventory = Arc::clone(&self.inventory);
        let chains = self.registry.chains();
        let min_pool_size = timers.min_pool_size;
        handles.push((
            "address pool monitor",
            spawn_periodic(
                "address pool monitor",
                Duration::from_secs(timers.address_pool_interval_secs),
                shutdown.subscribe(),
                move || {
                    let inventory = Arc::clone(&inventory);
                    let chains = chains.clone();
                    async move {
                        check_address_pool(inventory.as_ref(), &chains, min_pool_size).await;
                    }
                },
            ),
        ));

        let scanner = Arc::clone(&self.scanner);
        handles.push((
            "confirmation refresh",
            spawn_periodic(
                "confirmation refresh",
                Duration::from_millis(timers.confirmation_refresh_ms),
                shutdown.subscribe(),
                move || {
                    let scanner = Arc::clone(&scanner);
                    async move {
                        match scanner.refresh_confirmations().await {
                            Ok(0) => {}
                            Ok(finalised) => tracing::debug!(finalised, "Pending bills finalised"),
                            Err(e) => tracing::warn!(error = %e, "Confirmation refresh failed"),
                        }
                    }
                },
            ),
        ));

        let ledger = Arc::clone(&self.ledger);
        let snapshot_path = self.settings.snapshot_path.clone();
        handles.push((
            "ledger report",
            spawn_periodic(
                "ledger report",
                Duration::from_secs(timers.report_interval_secs),
                shutdown.subscribe(),
                move || ledger_report(Arc::clone(&ledger), snapshot_path.clone()),
            ),
        ));

        tracing::info!(
            scanner = self.scanner.is_running(),
            collection = self.collector.is_running(),
            jobs = handles.len(),
            "Scheduler started"
        );
        *running = Some(RunningJobs { shutdown, handles });
        Ok(())
    }

    /// Stop everything, wait for acknowledgement and write a final snapshot.
    pub async fn shutdown(&self) -> Result<(), ControlError> {
        let Some(jobs) = self.running.lock().await.take() else {
            return Err(ControlError::NotRunning("scheduler"));
        };
        tracing::info!("Scheduler shutting down");

        jobs.shutdown.trigger();
        self.scanner.stop();
        self.collector.stop();

        let deadline = Duration::from_secs(self.settings.timers.shutdown_timeout_secs.max(1));
        let mut handles = jobs.handles;
        let drained = tokio::time::timeout(deadline, async {
            self.scanner.stop_and_wait().await;
            self.collector.stop_and_wait().await;
            for (name, handle) in handles.iter_mut() {
                if let Err(e) = handle.await {
                    tracing::error!(job = *name, error = %e, "Job ended abnormally");
                }
            }
        })
        .await;

        if drained.is_err() {
            tracing::warn!(timeout = ?deadline, "Shutdown deadline passed, aborting remaining jobs");
            for (_, handle) in &handles {
                handle.abort();
            }
        }

        ledger_report(Arc::clone(&self.ledger), self.settings.snapshot_path.clone()).await;
        tracing::info!("Scheduler stopped");
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Swap the currency table seen by the scanner and the collector.
    pub fn reload_currencies(&self, currencies: Vec<CurrencyConfig>) {
        let symbols: Vec<_> = currencies.iter().map(|c| c.symbol.clone()).collect();
        self.currencies.replace(currencies);
        tracing::info!(?symbols, "Currencies reloaded");
    }

    pub fn scanner(&self) -> &Arc<BlockScanner> {
        &self.scanner
    }

    pub fn collector(&self) -> &Arc<CollectionEngine> {
        &self.collector
    }
}
