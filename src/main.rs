//! Custodial wallet core service.
//!
//! ```text
//!   ┌──────────────────────────────── custodial-wallet ────────────────────────────────┐
//!   │                                                                                  │
//!   │   Scheduler ──tick──▶ BlockScanner ──blocks──▶ ChainRegistry ──RPC──▶ nodes      │
//!   │       │                    │                        ▲                            │
//!   │       │                    ▼                        │ signed sweeps              │
//!   │       │                  Ledger ◀── bills ── CollectionEngine ◀── KeyCustody      │
//!   │       │                    │                        │                            │
//!   │       └── jobs (pool, confirmations, snapshot)      └──▶ notifications           │
//!   │                                                                                  │
//!   │   admin (axum, bearer key)   config watcher (notify)   metrics (prometheus)      │
//!   └──────────────────────────────────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;

use custodial_wallet::admin::setup_admin_router;
use custodial_wallet::blockchain::ChainRegistry;
use custodial_wallet::config::load_config;
use custodial_wallet::config::watcher::ConfigWatcher;
use custodial_wallet::custody::EnvKeyCustody;
use custodial_wallet::ledger::Ledger;
use custodial_wallet::lifecycle::signals::wait_for_termination;
use custodial_wallet::lifecycle::{Shutdown, WalletRuntime};
use custodial_wallet::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "custodial-wallet")]
#[command(about = "Chain scanning, ledger and fund collection service", long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "wallet.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(&args.config)?;

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), config = ?args.config, "custodial-wallet starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let ledger = match &config.ledger.snapshot_path {
        Some(path) => Ledger::load_from_file(Path::new(path))?,
        None => Ledger::new(),
    };
    let ledger = Arc::new(ledger);

    let registry = Arc::new(
        ChainRegistry::connect(&config.chains, &config.routing, &config.currencies).await,
    );
    let custody = Arc::new(EnvKeyCustody::from_config(&config.addresses));
    let runtime = WalletRuntime::assemble(config, registry, ledger, custody).await;

    runtime.scheduler.start().await?;

    // Admin surface
    let shutdown = Shutdown::new();
    let admin_task = if runtime.config.admin.enabled {
        let router = setup_admin_router(runtime.admin_state(), runtime.admin_request_timeout());
        let listener = TcpListener::bind(&runtime.config.admin.bind_address).await?;
        tracing::info!(address = %listener.local_addr()?, "Admin surface listening");
        let mut stop = shutdown.subscribe();
        Some(tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = stop.recv().await;
                })
                .await;
            if let Err(e) = served {
                tracing::error!(error = %e, "Admin server failed");
            }
        }))
    } else {
        None
    };

    // Currency hot reload
    let (watcher, mut updates) = ConfigWatcher::new(&args.config);
    let _watcher = match watcher.run() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "Config watcher unavailable, hot reload disabled");
            None
        }
    };
    let scheduler = Arc::clone(&runtime.scheduler);
    let mut reload_stop = shutdown.subscribe();
    let reload_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                update = updates.recv() => match update {
                    Some(config) => scheduler.reload_currencies(config.currencies),
                    None => break,
                },
                _ = reload_stop.recv() => break,
            }
        }
    });

    wait_for_termination().await;
    tracing::info!("Shutting down");

    // Stop intake first, then the core, then persist.
    shutdown.trigger();
    if let Some(task) = admin_task {
        let _ = task.await;
    }
    let _ = reload_task.await;
    if let Err(e) = runtime.scheduler.shutdown().await {
        tracing::warn!(error = %e, "Scheduler was not running at shutdown");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
