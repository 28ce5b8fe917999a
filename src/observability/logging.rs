//! Structured logging setup.
//!
//! `RUST_LOG` wins over the configured level. JSON output writes one object
//! per line for log shippers; text output is for terminals.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::schema::{LogFormat, ObservabilityConfig};

/// Directive used when neither `RUST_LOG` nor the config yields a valid filter.
const FALLBACK_DIRECTIVE: &str = "custodial_wallet=info,tower_http=info";

pub fn env_filter(config: &ObservabilityConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| {
            EnvFilter::try_new(format!(
                "custodial_wallet={level},tower_http={level}",
                level = config.log_level
            ))
        })
        .unwrap_or_else(|_| EnvFilter::new(FALLBACK_DIRECTIVE))
}

/// Install the global subscriber. Returns false if one was already set.
pub fn init_logging(config: &ObservabilityConfig) -> bool {
    let layer = match config.log_format {
        LogFormat::Text => fmt::layer().with_target(true).boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter(config))
        .with(layer)
        .try_init()
        .is_ok()
}
