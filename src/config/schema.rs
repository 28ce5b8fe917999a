//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the wallet core.
//! All types derive Serde traits for deserialization from config files.

use alloy::primitives::utils::{format_units, parse_units, UnitsError};
use alloy::primitives::U256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::blockchain::types::ChainType;
use crate::custody::addresses::{AddressRole, AddressStatus};

/// Root configuration for the wallet core.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct WalletConfig {
    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,

    /// Administrative HTTP surface.
    pub admin: AdminConfig,

    /// Ledger persistence.
    pub ledger: LedgerConfig,

    /// Block scanner settings.
    pub scanner: ScannerConfig,

    /// Fund collection settings.
    pub collection: CollectionConfig,

    /// Timers for the scheduler and its auxiliary jobs.
    pub scheduler: SchedulerConfig,

    /// Symbol routing overrides.
    pub routing: RoutingConfig,

    /// One entry per chain connection.
    pub chains: Vec<ChainConfig>,

    /// Currencies to scan and collect.
    pub currencies: Vec<CurrencyConfig>,

    /// Managed addresses.
    pub addresses: Vec<AddressConfig>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    pub log_level: String,

    /// Human-readable text or one JSON object per line.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin control surface configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin HTTP surface.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Bind address.
    pub bind_address: String,

    /// Per-request timeout in seconds. Range scans may need a generous value.
    pub request_timeout_secs: u64,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
            request_timeout_secs: 120,
        }
    }
}

/// Ledger persistence configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct LedgerConfig {
    /// JSON snapshot path. When unset the ledger lives in memory only.
    pub snapshot_path: Option<String>,
}

/// How far the scan cursor moves when a block inside the range fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CursorMode {
    /// Skip blocks that cannot be read and move the cursor to the end of the
    /// range; a connection error aborts the cycle without moving it.
    #[default]
    PerRange,
    /// Move the cursor after every completed block and stop at the first failure.
    PerBlock,
}

/// Block scanner configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Start the continuous scan loop with the scheduler.
    pub autostart: bool,

    /// Upper bound on blocks scanned per currency per cycle.
    pub max_blocks_per_scan: u64,

    /// Cursor advancement policy.
    pub cursor_mode: CursorMode,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            autostart: true,
            max_blocks_per_scan: 100,
            cursor_mode: CursorMode::PerRange,
        }
    }
}

/// When the ledger is debited for a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DebitMode {
    /// Debit right after submission; settle the difference on confirmation.
    #[default]
    Optimistic,
    /// Debit only once the scanner sees the sweep confirmed.
    OnConfirmation,
}

/// Fund collection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CollectionConfig {
    /// Start the collection loop with the scheduler.
    pub autostart: bool,

    /// Seconds between collection passes.
    pub interval_secs: u64,

    /// Cold-storage destination for every sweep.
    pub cold_address: String,

    /// Ledger debit timing.
    pub debit_mode: DebitMode,

    /// Gas price multiplier (1.0 = as suggested, 1.2 = 20% buffer).
    pub gas_price_multiplier: f64,

    /// Maximum gas price in gwei (protection against spikes).
    pub max_gas_price_gwei: u64,

    /// Seconds after which an unmined sweep the node no longer holds is
    /// failed and refunded. 0 disables the timeout; a sweep whose nonce was
    /// taken by another transaction is always failed.
    pub pending_sweep_timeout_secs: u64,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            autostart: false,
            interval_secs: 300,
            cold_address: String::new(),
            debit_mode: DebitMode::Optimistic,
            gas_price_multiplier: 1.0,
            max_gas_price_gwei: 500,
            pending_sweep_timeout_secs: 3600,
        }
    }
}

/// Scheduler timers.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Scan cadence per currency symbol, in milliseconds.
    pub cadence_ms: BTreeMap<String, u64>,

    /// Cadence for symbols missing from `cadence_ms`.
    pub default_cadence_ms: u64,

    /// Floor for the scanner loop tick.
    pub min_tick_ms: u64,

    /// Address pool monitor interval.
    pub address_pool_interval_secs: u64,

    /// Unused deposit addresses below which the pool monitor warns.
    pub min_pool_size: usize,

    /// Pending-bill confirmation refresh interval.
    pub confirmation_refresh_ms: u64,

    /// Ledger snapshot and gauge interval.
    pub report_interval_secs: u64,

    /// Upper bound on waiting for loops to acknowledge shutdown.
    pub shutdown_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let cadence_ms = [
            ("ETH", 500),
            ("USDT", 500),
            ("USDC", 500),
            ("BNB", 2_000),
            ("BUSD", 2_000),
        ]
        .into_iter()
        .map(|(symbol, ms)| (symbol.to_string(), ms))
        .collect();

        Self {
            cadence_ms,
            default_cadence_ms: 10_000,
            min_tick_ms: 100,
            address_pool_interval_secs: 30,
            min_pool_size: 10,
            confirmation_refresh_ms: 2_000,
            report_interval_secs: 5,
            shutdown_timeout_secs: 30,
        }
    }
}

/// Symbol routing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Chain used for unknown symbols and when a routed chain is unavailable.
    pub fallback_chain: ChainType,

    /// Extra `symbol = "Chain"` routes.
    pub symbols: BTreeMap<String, ChainType>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            fallback_chain: ChainType::Ethereum,
            symbols: BTreeMap::new(),
        }
    }
}

/// Chain connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Chain this entry connects to.
    pub chain_type: ChainType,

    /// Disabled entries are skipped at startup.
    pub enabled: bool,

    /// JSON-RPC endpoint URL.
    pub rpc_url: String,

    /// Failover JSON-RPC endpoint URLs.
    pub failover_urls: Vec<String>,

    /// Chain ID (e.g., 1 for Ethereum mainnet, 56 for BSC).
    pub chain_id: u64,

    /// RPC request timeout in seconds.
    pub rpc_timeout_secs: u64,

    /// Rounds over all providers before a call fails.
    pub retry_attempts: u32,

    /// Base delay for exponential backoff between rounds.
    pub retry_base_delay_ms: u64,

    /// Backoff ceiling.
    pub retry_max_delay_ms: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            chain_type: ChainType::Ethereum,
            enabled: true,
            rpc_url: "http://localhost:8545".to_string(),
            failover_urls: Vec::new(),
            chain_id: 1,
            rpc_timeout_secs: 10,
            retry_attempts: 3,
            retry_base_delay_ms: 200,
            retry_max_delay_ms: 2_000,
        }
    }
}

/// Per-currency scan and collection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CurrencyConfig {
    /// Ticker, e.g. "ETH".
    pub symbol: String,

    /// Chain the currency lives on.
    pub chain_type: ChainType,

    pub is_enabled: bool,

    /// Minor-unit exponent (18 for wei).
    pub decimals: u8,

    /// Blocks that must follow a transaction before it is confirmed.
    pub confirmations_required: u64,

    /// First block to scan when no cursor exists. Unset means "from the head".
    pub start_block: Option<u64>,

    /// Per-currency override of the scheduler cadence.
    pub scan_interval_ms: Option<u64>,

    pub collection_enabled: bool,

    /// Sweep threshold in whole units, e.g. "0.5".
    pub collection_threshold: String,
}

impl Default for CurrencyConfig {
    fn default() -> Self {
        Self {
            symbol: "ETH".to_string(),
            chain_type: ChainType::Ethereum,
            is_enabled: true,
            decimals: 18,
            confirmations_required: 3,
            start_block: None,
            scan_interval_ms: None,
            collection_enabled: false,
            collection_threshold: "0".to_string(),
        }
    }
}

impl CurrencyConfig {
    /// Collection threshold in minor units.
    pub fn threshold_units(&self) -> Result<U256, UnitsError> {
        Ok(parse_units(&self.collection_threshold, self.decimals)?.get_absolute())
    }

    /// Render a minor-unit amount in whole units for logs.
    pub fn display_amount(&self, amount: U256) -> String {
        format_units(amount, self.decimals).unwrap_or_else(|_| amount.to_string())
    }
}

/// A managed address.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AddressConfig {
    pub address: String,

    #[serde(default = "default_chain_type")]
    pub chain_type: ChainType,

    #[serde(default)]
    pub role: AddressRole,

    #[serde(default)]
    pub status: AddressStatus,

    /// Owning user, for notifications.
    #[serde(default)]
    pub user_id: Option<u64>,

    /// HD derivation index.
    #[serde(default)]
    pub index: u32,

    #[serde(default)]
    pub note: String,

    /// Unix seconds when the address was bound to its user.
    #[serde(default)]
    pub bind_time: Option<u64>,

    /// Environment variable holding the hex private key (hot addresses).
    #[serde(default)]
    pub key_env: Option<String>,
}

fn default_chain_type() -> ChainType {
    ChainType::Ethereum
}
