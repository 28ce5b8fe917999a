//! Per-currency scan cadence.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::schema::{CurrencyConfig, SchedulerConfig};

/// Resolves how often each currency is scanned.
///
/// Precedence: the currency's own `scan_interval_ms`, then the per-symbol
/// table, then the default. Nothing goes below `min_tick_ms`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CadencePolicy {
    per_symbol: BTreeMap<String, u64>,
    default_ms: u64,
    min_tick_ms: u64,
}

impl CadencePolicy {
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self {
            per_symbol: config
                .cadence_ms
                .iter()
                .map(|(symbol, ms)| (symbol.to_ascii_uppercase(), *ms))
                .collect(),
            default_ms: config.default_cadence_ms,
            min_tick_ms: config.min_tick_ms.max(1),
        }
    }

    pub fn interval_for(&self, currency: &CurrencyConfig) -> Duration {
        let ms = currency
            .scan_interval_ms
            .or_else(|| self.per_symbol.get(&currency.symbol.to_ascii_uppercase()).copied())
            .unwrap_or(self.default_ms);
        Duration::from_millis(ms.max(self.min_tick_ms))
    }

    /// Loop tick: the fastest enabled currency's cadence.
    pub fn tick(&self, currencies: &[CurrencyConfig]) -> Duration {
        currencies
            .iter()
            .filter(|c| c.is_enabled)
            .map(|c| self.interval_for(c))
            .min()
            .unwrap_or_else(|| Duration::from_millis(self.default_ms.max(self.min_tick_ms)))
    }
}

impl Default for CadencePolicy {
    fn default() -> Self {
        Self::from_config(&SchedulerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::types::ChainType;

    fn currency(symbol: &str) -> CurrencyConfig {
        CurrencyConfig {
            symbol: symbol.into(),
            ..Default::default()
        }
    }

    #[test]
    fn reference_cadences() {
        let policy = CadencePolicy::default();
        assert_eq!(policy.interval_for(&currency("ETH")), Duration::from_millis(500));
        assert_eq!(policy.interval_for(&currency("usdc")), Duration::from_millis(500));
        assert_eq!(
            policy.interval_for(&CurrencyConfig {
                symbol: "BNB".into(),
                chain_type: ChainType::Bsc,
                ..Default::default()
            }),
            Duration::from_secs(2)
        );
        assert_eq!(policy.interval_for(&currency("DOGE")), Duration::from_secs(10));
    }

    #[test]
    fn currency_override_and_floor() {
        let policy = CadencePolicy::default();
        let mut eth = currency("ETH");
        eth.scan_interval_ms = Some(5);
        assert_eq!(policy.interval_for(&eth), Duration::from_millis(100));
        eth.scan_interval_ms = Some(1_500);
        assert_eq!(policy.interval_for(&eth), Duration::from_millis(1_500));
    }

    #[test]
    fn tick_follows_fastest_enabled_currency() {
        let policy = CadencePolicy::default();
        let mut eth = currency("ETH");
        let bnb = currency("BNB");
        assert_eq!(policy.tick(&[eth.clone(), bnb.clone()]), Duration::from_millis(500));
        eth.is_enabled = false;
        assert_eq!(policy.tick(&[eth, bnb]), Duration::from_secs(2));
        assert_eq!(policy.tick(&[]), Duration::from_secs(10));
    }
}
