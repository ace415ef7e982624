//! Movement reconciliation.
//!
//! Terminals deliver movement events at-least-once: the same payload can
//! arrive twice, and the two halves of a session can race each other when a
//! gate replays its outbox after an offline period. The reconciler absorbs
//! all of that into upsert-by-id semantics over the ledger.
//!
//! Decision table, executed under a per-id critical section:
//!
//! | record exists | event has `salida` | action                       | outcome          |
//! |---------------|--------------------|------------------------------|------------------|
//! | no            | either             | insert record as delivered   | `entry-recorded` |
//! | yes           | no                 | none (entry redelivery)      | `entry-recorded` |
//! | yes           | yes                | overwrite exit fields, close | `exit-recorded`  |
//!
//! A resent exit overwrites the exit fields again (last write wins) and the
//! record stays closed; entry fields are never touched after insert.

use chrono::Utc;
use dashmap::DashMap;
use metrics::counter;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::Result;
use crate::model::{ExitUpdate, MovementEvent, MovementRecord};
use crate::store::Store;

/// What a movement event turned into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReconcileOutcome {
    EntryRecorded,
    ExitRecorded,
}

impl ReconcileOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileOutcome::EntryRecorded => "entry-recorded",
            ReconcileOutcome::ExitRecorded => "exit-recorded",
        }
    }

    /// Human acknowledgement shown on terminal consoles.
    pub fn message(&self) -> &'static str {
        match self {
            ReconcileOutcome::EntryRecorded => "Entrada registrada",
            ReconcileOutcome::ExitRecorded => "Salida registrada",
        }
    }
}

/// Applies movement events to the store with per-id serialization.
pub struct Reconciler {
    store: Store,
    /// One async mutex per movement id. Two concurrent events for the same id
    /// (a resent entry racing a genuine exit) must not interleave their
    /// read-modify-write.
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl Reconciler {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            locks: DashMap::new(),
        }
    }

    /// Apply one movement event. Safe to call again with the same payload.
    pub async fn apply(&self, event: MovementEvent) -> Result<ReconcileOutcome> {
        let lock = self.locks.entry(event.id.clone()).or_default().clone();
        let _guard = lock.lock().await;

        let existing = self.store.get_movement(&event.id).await?;

        let outcome = match (existing, event.exited_at) {
            (None, _) => {
                let record = MovementRecord::from_event(&event, Utc::now());
                self.store.insert_movement(&record).await?;
                info!(
                    movement_id = %event.id,
                    plate = %event.plate,
                    terminal_id = %event.terminal_id,
                    attended_by = %event.employee_name,
                    "Entry recorded"
                );
                ReconcileOutcome::EntryRecorded
            }
            (Some(_), None) => {
                // Redelivered entry: the record already exists and the event
                // carries no exit half. Acknowledge without mutating, so a
                // closed session can never be reopened by a replay.
                debug!(movement_id = %event.id, "Duplicate entry event ignored");
                ReconcileOutcome::EntryRecorded
            }
            (Some(_), Some(exited_at)) => {
                let exit = ExitUpdate::from_event(&event, exited_at);
                self.store.close_movement(&event.id, &exit).await?;
                info!(
                    movement_id = %event.id,
                    plate = %event.plate,
                    invoiced_by = %event.employee_name,
                    "Exit recorded"
                );
                ReconcileOutcome::ExitRecorded
            }
        };

        counter!("patio_movements_total", "outcome" => outcome.as_str()).increment(1);
        Ok(outcome)
    }
}
