//! Sync ingress: the HTTP contract between gate terminals and the master.
//!
//! All endpoints are synchronous request/response with JSON bodies; no
//! streaming, no batching. Terminals retry on their side, which is why every
//! write path below is idempotent.

mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::aggregator::LiveStateAggregator;
use crate::reconciler::Reconciler;
use crate::store::Store;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub reconciler: Arc<Reconciler>,
    pub aggregator: Arc<LiveStateAggregator>,
}

impl AppState {
    pub fn new(store: Store) -> Self {
        Self {
            reconciler: Arc::new(Reconciler::new(store.clone())),
            aggregator: Arc::new(LiveStateAggregator::new(store.clone())),
            store,
        }
    }
}

/// Build the API router.
///
/// # Endpoints
///
/// ## Sync (terminal-facing writes)
/// - `POST /sync/movement` - Reconcile one movement event
/// - `POST /sync/live-state` - Replace the live lot snapshot
/// - `POST /sync/cashout` - Append a shift closure report
/// - `POST /sync/alert` - Upsert security alert metadata
///
/// ## Queries (dashboard-facing reads)
/// - `GET /summary` - Live state plus today's alert count
/// - `GET /history?limit=N` - Recent movements, newest entry first
/// - `GET /cashouts` - Shift closure reports, newest close first
/// - `GET /alerts?limit=N` - Recent alerts
///
/// ## System
/// - `GET /health` - Liveness probe
/// - `GET /metrics` - Prometheus exposition
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::prometheus_metrics))
        .route("/sync/movement", post(handlers::submit_movement))
        .route("/sync/live-state", post(handlers::push_live_state))
        .route("/sync/cashout", post(handlers::report_cashout))
        .route("/sync/alert", post(handlers::sync_alert))
        .route("/summary", get(handlers::get_summary))
        .route("/history", get(handlers::get_history))
        .route("/cashouts", get(handlers::list_cashouts))
        .route("/alerts", get(handlers::list_alerts))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
