//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! scanner / collection / ledger / chain clients
//!     → logging.rs (tracing events, text or JSON)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (log shipping)
//!     → Prometheus scrape endpoint
//! ```

pub mod logging;
pub mod metrics;
