//! Auxiliary periodic jobs.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::blockchain::types::ChainType;
use crate::custody::{AddressInventory, AddressRole, AddressStatus};
use crate::ledger::Ledger;
use crate::observability::metrics;

/// Run `job` every `period` until the shutdown broadcast fires.
///
/// The first run happens immediately. A job in progress is never cut short.
pub fn spawn_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
    mut job: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::debug!(job = name, period = ?period, "Job started");
        loop {
            tokio::select! {
                _ = ticker.tick() => job().await,
                _ = shutdown.recv() => break,
            }
        }
        tracing::debug!(job = name, "Job stopped");
    })
}

/// Count unused deposit addresses per chain and warn when a pool runs low.
pub async fn check_address_pool(
    inventory: &dyn AddressInventory,
    chains: &[ChainType],
    min_pool_size: usize,
) -> Vec<(ChainType, usize)> {
    let mut pools = Vec::with_capacity(chains.len());
    for chain in chains {
        let unused = inventory
            .list_managed_addresses(*chain)
            .await
            .iter()
            .filter(|a| a.role == AddressRole::Deposit && a.status == AddressStatus::Unused)
            .count();
        metrics::record_address_pool(chain.as_str(), unused);
        if unused < min_pool_size {
            tracing::warn!(
                chain = %chain,
                unused,
                min_pool_size,
                "Deposit address pool below minimum, provision more addresses"
            );
        }
        pools.push((*chain, unused));
    }
    pools
}

/// Publish ledger gauges and write the snapshot when a path is configured.
pub async fn ledger_report(ledger: Arc<Ledger>, snapshot_path: Option<PathBuf>) {
    let counts = ledger.bill_counts();
    metrics::record_bill_counts(&counts);
    tracing::debug!(
        pending = counts.pending,
        confirmed = counts.confirmed,
        failed = counts.failed,
        "Ledger report"
    );

    let Some(path) = snapshot_path else {
        return;
    };
    let written = tokio::task::spawn_blocking(move || ledger.save_to_file(&path)).await;
    match written {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "Failed to write ledger snapshot"),
        Err(e) => tracing::error!(error = %e, "Snapshot task panicked"),
    }
}
