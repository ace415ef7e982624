//! Live-state aggregation.
//!
//! Terminals push the full lot picture rather than incremental deltas, so
//! the aggregator is deliberately simple: stamp the snapshot and replace the
//! singleton row. Two terminals pushing concurrently resolve to last write
//! wins with no conflict detection, an accepted tradeoff under the
//! single-active-gate deployment.

use chrono::Utc;
use metrics::counter;
use tracing::debug;

use crate::error::Result;
use crate::model::{DailySummary, LiveState, LiveStateSnapshot};
use crate::store::Store;

pub struct LiveStateAggregator {
    store: Store,
}

impl LiveStateAggregator {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Persist a terminal's snapshot verbatim, stamping the update time.
    pub async fn push(&self, snapshot: LiveStateSnapshot) -> Result<()> {
        let state = LiveState::from_snapshot(snapshot, Utc::now());
        self.store.write_live_state(&state).await?;

        counter!("patio_live_state_pushes_total").increment(1);
        debug!(
            total_occupancy = state.total_occupancy,
            "Live state replaced"
        );
        Ok(())
    }

    /// Assemble the dashboard read-model: live state joined with the
    /// current-day alert count.
    pub async fn summary(&self) -> Result<DailySummary> {
        let state = self.store.read_live_state().await?;
        let pending_alerts = self.store.count_alerts_today().await?;

        Ok(DailySummary {
            today_revenue: state.today_revenue,
            total_occupancy: state.total_occupancy,
            pending_alerts,
            occupancy_detail: state.occupancy_detail,
        })
    }
}
