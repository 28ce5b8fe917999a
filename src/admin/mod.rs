//! Administrative control surface.
//!
//! Every route sits behind a bearer API key. Successful calls answer
//! `{"data": ...}`; failures answer `{"error": {"kind", "message"}}` with a
//! status derived from the error kind.

pub mod auth;
pub mod events;
pub mod handlers;
pub mod response;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::blockchain::ChainRegistry;
use crate::events::BroadcastNotifier;
use crate::ledger::Ledger;
use crate::scheduler::Scheduler;

#[derive(Clone)]
pub struct AdminState {
    pub scheduler: Arc<Scheduler>,
    pub ledger: Arc<Ledger>,
    pub registry: Arc<ChainRegistry>,
    pub notifier: BroadcastNotifier,
    pub api_key: Arc<str>,
    /// Interval used when a collection start request names none.
    pub collection_interval_secs: u64,
}

#[allow(deprecated)]
pub fn setup_admin_router(state: AdminState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/scanner/start", post(start_scanner))
        .route("/admin/scanner/stop", post(stop_scanner))
        .route("/admin/scanner/status", get(scanner_status))
        .route("/admin/scanner/scan-once", post(scan_once))
        .route("/admin/scanner/scan-range", post(scan_range))
        .route("/admin/collection/start", post(start_collection))
        .route("/admin/collection/stop", post(stop_collection))
        .route("/admin/collection/status", get(collection_status))
        .route("/admin/collection/trigger", post(trigger_collection))
        .route("/admin/collection/collect", post(collect_from_address))
        .route("/admin/balances/{address}", get(get_balances))
        .route("/admin/cursors", get(get_cursors))
        .route("/admin/bills/{txid}", get(get_bill))
        .route("/admin/events", get(events::stream_events))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ))
        .with_state(state)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
}
