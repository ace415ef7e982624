//! # Patio Core
//!
//! Master synchronization node for multi-gate parking deployments.
//!
//! Independent gate terminals ("porterías") record vehicle movements locally
//! and push them here over HTTP. This crate reconciles those
//! possibly-duplicated, possibly-out-of-order events into one consistent
//! global ledger and keeps the live occupancy/revenue snapshot that
//! dashboards read.
//!
//! ## Architecture
//!
//! - **Store**: SQLite-backed keyed storage for movement records, the
//!   live-state singleton, cashout reports, and alert metadata
//! - **Reconciler**: idempotent upsert-by-id over movement events, with
//!   per-id serialization of the read-modify-write
//! - **Aggregator**: last-write-wins replacement of the live lot snapshot,
//!   plus the dashboard summary read-model
//! - **API**: the axum ingress terminals talk to

pub mod aggregator;
pub mod api;
pub mod config;
pub mod error;
pub mod model;
pub mod reconciler;
pub mod store;
pub mod telemetry;

pub use error::{Error, ErrorCode, ErrorSeverity, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::aggregator::LiveStateAggregator;
    pub use crate::api::{build_router, AppState};
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCode, ErrorSeverity, Result};
    pub use crate::model::{
        AlertRecord, CashoutReport, DailySummary, ExitUpdate, LiveState, LiveStateSnapshot,
        MovementEvent, MovementRecord, OccupancySlot, SessionStatus,
    };
    pub use crate::reconciler::{ReconcileOutcome, Reconciler};
    pub use crate::store::Store;
}
