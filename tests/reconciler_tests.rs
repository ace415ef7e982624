//! Concurrency tests for movement reconciliation.
//!
//! Terminals replay their outbox after offline periods, so the master sees
//! bursts of duplicate and racing events for the same session id. These
//! tests verify the per-id critical section: no interleaved half-written
//! records, no reopened sessions.

use chrono::{TimeZone, Utc};
use patio_core::model::{MovementEvent, SessionStatus};
use patio_core::reconciler::{ReconcileOutcome, Reconciler};
use patio_core::store::Store;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

async fn setup() -> (Store, Arc<Reconciler>) {
    let store = Store::connect("sqlite::memory:", 1).await.unwrap();
    store.migrate().await.unwrap();
    let reconciler = Arc::new(Reconciler::new(store.clone()));
    (store, reconciler)
}

fn entry_event(id: &str) -> MovementEvent {
    MovementEvent {
        id: id.to_string(),
        plate: "RST654".to_string(),
        category: "carro".to_string(),
        entered_at: Some(Utc.with_ymd_and_hms(2025, 6, 1, 7, 0, 0).unwrap()),
        exited_at: None,
        amount_paid: None,
        payment_method: None,
        employee_name: "Laura".to_string(),
        duration_minutes: None,
        terminal_id: "porteria-1".to_string(),
    }
}

/// Exit event whose payload is tagged by `seq`, so the final record reveals
/// which event each stored field came from.
fn tagged_exit_event(id: &str, seq: i64) -> MovementEvent {
    MovementEvent {
        exited_at: Some(Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap()),
        amount_paid: Some(Decimal::from(1000 + seq)),
        payment_method: Some(format!("pago-{}", seq)),
        employee_name: format!("empleado-{}", seq),
        duration_minutes: Some(100 + seq),
        ..entry_event(id)
    }
}

#[tokio::test]
async fn fifty_concurrent_duplicate_exits_never_interleave() {
    let (store, reconciler) = setup().await;
    let id = Uuid::new_v4().to_string();

    reconciler.apply(entry_event(&id)).await.unwrap();

    let mut handles = Vec::new();
    for seq in 0..50 {
        let reconciler = reconciler.clone();
        let event = tagged_exit_event(&id, seq);
        handles.push(tokio::spawn(async move { reconciler.apply(event).await }));
    }

    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome, ReconcileOutcome::ExitRecorded);
    }

    let record = store.get_movement(&id).await.unwrap().unwrap();
    assert_eq!(record.status, SessionStatus::Closed);

    // Every exit field must come from the same applied event - a mix of
    // seq tags would mean two writes interleaved.
    let seq = record.duration_minutes.unwrap() - 100;
    assert!((0..50).contains(&seq));
    assert_eq!(record.amount_paid, Some(Decimal::from(1000 + seq)));
    assert_eq!(
        record.payment_method.as_deref(),
        Some(format!("pago-{}", seq).as_str())
    );
    assert_eq!(
        record.invoiced_by.as_deref(),
        Some(format!("empleado-{}", seq).as_str())
    );

    // Entry half untouched throughout
    assert_eq!(record.attended_by, "Laura");
    assert_eq!(record.plate, "RST654");
    assert_eq!(
        record.entered_at,
        Utc.with_ymd_and_hms(2025, 6, 1, 7, 0, 0).unwrap()
    );
}

#[tokio::test]
async fn entry_replays_racing_an_exit_leave_a_closed_record() {
    let (store, reconciler) = setup().await;
    let id = Uuid::new_v4().to_string();

    reconciler.apply(entry_event(&id)).await.unwrap();

    let mut handles = Vec::new();
    for seq in 0..20 {
        let reconciler = reconciler.clone();
        // Interleave entry replays with genuine exits
        let event = if seq % 2 == 0 {
            entry_event(&id)
        } else {
            tagged_exit_event(&id, seq)
        };
        handles.push(tokio::spawn(async move { reconciler.apply(event).await }));
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // At least one exit applied and no replay reopened the session.
    let record = store.get_movement(&id).await.unwrap().unwrap();
    assert_eq!(record.status, SessionStatus::Closed);
    assert!(record.exited_at.is_some());
    assert_eq!(record.attended_by, "Laura");
}

#[tokio::test]
async fn concurrent_events_for_distinct_ids_do_not_block_each_other() {
    let (store, reconciler) = setup().await;

    let mut handles = Vec::new();
    for i in 0..20 {
        let reconciler = reconciler.clone();
        let event = entry_event(&format!("distinct-{}", i));
        handles.push(tokio::spawn(async move { reconciler.apply(event).await }));
    }

    for handle in handles {
        assert_eq!(
            handle.await.unwrap().unwrap(),
            ReconcileOutcome::EntryRecorded
        );
    }

    let records = store.recent_movements(50).await.unwrap();
    assert_eq!(records.len(), 20);
}
