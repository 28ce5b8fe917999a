//! Live currency table shared by the scanner and the collector.

use arc_swap::ArcSwap;
use std::sync::Arc;

use crate::config::schema::CurrencyConfig;

/// Currency configs behind an atomically swappable pointer.
///
/// Readers take a cheap snapshot per cycle; a reload never blocks them and
/// never hands out a half-updated table.
#[derive(Debug)]
pub struct CurrencyTable {
    inner: ArcSwap<Vec<CurrencyConfig>>,
}

impl CurrencyTable {
    pub fn new(currencies: Vec<CurrencyConfig>) -> Self {
        Self {
            inner: ArcSwap::from_pointee(normalize(currencies)),
        }
    }

    pub fn snapshot(&self) -> Arc<Vec<CurrencyConfig>> {
        self.inner.load_full()
    }

    /// Case-insensitive lookup.
    pub fn get(&self, symbol: &str) -> Option<CurrencyConfig> {
        self.inner
            .load()
            .iter()
            .find(|c| c.symbol.eq_ignore_ascii_case(symbol))
            .cloned()
    }

    pub fn enabled(&self) -> Vec<CurrencyConfig> {
        self.inner
            .load()
            .iter()
            .filter(|c| c.is_enabled)
            .cloned()
            .collect()
    }

    pub fn replace(&self, currencies: Vec<CurrencyConfig>) {
        let currencies = normalize(currencies);
        tracing::info!(currencies = currencies.len(), "Currency table replaced");
        self.inner.store(Arc::new(currencies));
    }
}

fn normalize(mut currencies: Vec<CurrencyConfig>) -> Vec<CurrencyConfig> {
    for currency in &mut currencies {
        currency.symbol = currency.symbol.to_ascii_uppercase();
    }
    currencies
}
