//! Ledger persistence to a JSON snapshot file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::ledger::store::Ledger;
use crate::ledger::types::{Balance, BalanceKey, ChainBill, LedgerResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceRecord {
    pub key: BalanceKey,
    pub balance: Balance,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub balances: Vec<BalanceRecord>,
    pub bills: Vec<ChainBill>,
    pub cursors: BTreeMap<String, u64>,
}

impl Ledger {
    /// Load from file if it exists, otherwise start empty.
    pub fn load_from_file(path: &Path) -> LedgerResult<Self> {
        if !path.exists() {
            tracing::info!(path = ?path, "No ledger snapshot found, starting empty");
            return Ok(Self::new());
        }
        let reader = BufReader::new(File::open(path)?);
        let snapshot: LedgerSnapshot = serde_json::from_reader(reader)?;
        tracing::info!(
            path = ?path,
            balances = snapshot.balances.len(),
            bills = snapshot.bills.len(),
            cursors = snapshot.cursors.len(),
            "Loaded ledger snapshot"
        );
        Ok(Self::from_snapshot(snapshot))
    }

    /// Write the snapshot next to `path` and rename it into place.
    pub fn save_to_file(&self, path: &Path) -> LedgerResult<()> {
        let snapshot = self.snapshot();
        let tmp = path.with_extension("tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer(&mut writer, &snapshot)?;
            writer.flush()?;
        }
        std::fs::rename(&tmp, path)?;
        tracing::debug!(
            path = ?path,
            balances = snapshot.balances.len(),
            bills = snapshot.bills.len(),
            "Saved ledger snapshot"
        );
        Ok(())
    }
}
