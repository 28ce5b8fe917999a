//! Configuration validation.
//!
//! Semantic checks that serde cannot express: parsable addresses, referential
//! integrity between currencies, chains and addresses, and value ranges. Every
//! problem is collected so a bad file is reported in one pass.

use alloy::primitives::utils::parse_units;
use alloy::primitives::Address;
use std::collections::HashSet;

use crate::config::schema::WalletConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &WalletConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let mut chains = HashSet::new();
    for (i, chain) in config.chains.iter().enumerate() {
        if !chains.insert(chain.chain_type) {
            errors.push(ValidationError::new(
                format!("chains[{}].chain_type", i),
                format!("duplicate chain {}", chain.chain_type),
            ));
        }
        if chain.rpc_url.parse::<url::Url>().is_err() {
            errors.push(ValidationError::new(
                format!("chains[{}].rpc_url", i),
                format!("invalid URL '{}'", chain.rpc_url),
            ));
        }
        if chain.rpc_timeout_secs == 0 {
            errors.push(ValidationError::new(
                format!("chains[{}].rpc_timeout_secs", i),
                "must be greater than zero",
            ));
        }
    }

    let mut symbols = HashSet::new();
    let mut any_collection = false;
    for (i, currency) in config.currencies.iter().enumerate() {
        let field = |name: &str| format!("currencies[{}].{}", i, name);
        if currency.symbol.trim().is_empty() {
            errors.push(ValidationError::new(field("symbol"), "must not be empty"));
        }
        if !symbols.insert(currency.symbol.to_ascii_uppercase()) {
            errors.push(ValidationError::new(
                field("symbol"),
                format!("duplicate currency {}", currency.symbol),
            ));
        }
        if currency.decimals > 77 {
            errors.push(ValidationError::new(field("decimals"), "must be at most 77"));
        }
        if parse_units(&currency.collection_threshold, currency.decimals).is_err() {
            errors.push(ValidationError::new(
                field("collection_threshold"),
                format!("invalid amount '{}'", currency.collection_threshold),
            ));
        }
        if currency.scan_interval_ms == Some(0) {
            errors.push(ValidationError::new(field("scan_interval_ms"), "must be greater than zero"));
        }
        if currency.is_enabled && !config.chains.is_empty() && !chains.contains(&currency.chain_type) {
            errors.push(ValidationError::new(
                field("chain_type"),
                format!("no [[chains]] entry for {}", currency.chain_type),
            ));
        }
        any_collection |= currency.is_enabled && currency.collection_enabled;
    }

    for (i, entry) in config.addresses.iter().enumerate() {
        if entry.address.parse::<Address>().is_err() {
            errors.push(ValidationError::new(
                format!("addresses[{}].address", i),
                format!("invalid address '{}'", entry.address),
            ));
        }
    }

    if any_collection || config.collection.autostart {
        match config.collection.cold_address.parse::<Address>() {
            Ok(address) if address == Address::ZERO => errors.push(ValidationError::new(
                "collection.cold_address",
                "must not be the zero address",
            )),
            Ok(_) => {}
            Err(_) => errors.push(ValidationError::new(
                "collection.cold_address",
                "must be set to a valid address when collection is enabled",
            )),
        }
    }
    if config.collection.interval_secs == 0 {
        errors.push(ValidationError::new("collection.interval_secs", "must be greater than zero"));
    }
    if !config.collection.gas_price_multiplier.is_finite() || config.collection.gas_price_multiplier <= 0.0 {
        errors.push(ValidationError::new(
            "collection.gas_price_multiplier",
            "must be a positive number",
        ));
    }

    if config.scanner.max_blocks_per_scan == 0 {
        errors.push(ValidationError::new("scanner.max_blocks_per_scan", "must be greater than zero"));
    }

    let scheduler = &config.scheduler;
    for (name, value) in [
        ("scheduler.default_cadence_ms", scheduler.default_cadence_ms),
        ("scheduler.min_tick_ms", scheduler.min_tick_ms),
        ("scheduler.address_pool_interval_secs", scheduler.address_pool_interval_secs),
        ("scheduler.confirmation_refresh_ms", scheduler.confirmation_refresh_ms),
        ("scheduler.report_interval_secs", scheduler.report_interval_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(name, "must be greater than zero"));
        }
    }
    for (symbol, ms) in &scheduler.cadence_ms {
        if *ms == 0 {
            errors.push(ValidationError::new(
                format!("scheduler.cadence_ms.{}", symbol),
                "must be greater than zero",
            ));
        }
    }

    if config.admin.enabled && config.admin.api_key.len() < 16 {
        errors.push(ValidationError::new("admin.api_key", "must be at least 16 characters"));
    }
    if config.admin.enabled && config.admin.bind_address.parse::<std::net::SocketAddr>().is_err() {
        errors.push(ValidationError::new("admin.bind_address", "must be host:port"));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<std::net::SocketAddr>().is_err()
    {
        errors.push(ValidationError::new("observability.metrics_address", "must be host:port"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{AddressConfig, ChainConfig, CurrencyConfig};
    use crate::blockchain::types::ChainType;

    fn valid_config() -> WalletConfig {
        let mut config = WalletConfig::default();
        config.chains.push(ChainConfig::default());
        config.currencies.push(CurrencyConfig {
            collection_enabled: true,
            collection_threshold: "0.5".to_string(),
            ..CurrencyConfig::default()
        });
        config.collection.cold_address = "0x00000000000000000000000000000000000000c0".to_string();
        config
    }

    #[test]
    fn accepts_valid_config() {
        assert!(validate_config(&valid_config()).is_ok());
        assert!(validate_config(&WalletConfig::default()).is_ok());
    }

    #[test]
    fn rejects_zero_cold_address_when_collecting() {
        let mut config = valid_config();
        config.collection.cold_address = format!("{}", Address::ZERO);
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "collection.cold_address");
    }

    #[test]
    fn reports_every_problem() {
        let mut config = valid_config();
        config.currencies.push(CurrencyConfig {
            symbol: "eth".to_string(),
            chain_type: ChainType::Bsc,
            collection_threshold: "lots".to_string(),
            ..CurrencyConfig::default()
        });
        config.addresses.push(AddressConfig {
            address: "0xnothex".to_string(),
            chain_type: ChainType::Ethereum,
            role: Default::default(),
            status: Default::default(),
            user_id: None,
            index: 0,
            note: String::new(),
            bind_time: None,
            key_env: None,
        });
        config.scanner.max_blocks_per_scan = 0;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"currencies[1].symbol"));
        assert!(fields.contains(&"currencies[1].collection_threshold"));
        assert!(fields.contains(&"currencies[1].chain_type"));
        assert!(fields.contains(&"addresses[0].address"));
        assert!(fields.contains(&"scanner.max_blocks_per_scan"));
    }
}
