//! Domain types for the master ledger.
//!
//! Wire field names are the Spanish terminal protocol and are fixed: gate
//! terminals in the field already speak it. Rust-side names are English;
//! serde renames bridge the two.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ═══════════════════════════════════════════════════════════════════════════════
// Movement Records
// ═══════════════════════════════════════════════════════════════════════════════

/// Lifecycle of a parking session.
///
/// `Open → Closed` is a one-way transition; a closed session is never
/// reopened, no matter what a terminal resends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Open,
    Closed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Open => "open",
            SessionStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(SessionStatus::Open),
            "closed" => Some(SessionStatus::Closed),
            _ => None,
        }
    }
}

/// One vehicle's full parking session in the global ledger.
///
/// Keyed by the terminal-generated `id`; created by the entry half of a
/// session, completed by the exit half.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementRecord {
    pub id: String,

    #[serde(rename = "placa")]
    pub plate: String,

    #[serde(rename = "tipo_vehiculo")]
    pub category: String,

    #[serde(rename = "entrada")]
    pub entered_at: DateTime<Utc>,

    #[serde(rename = "salida")]
    pub exited_at: Option<DateTime<Utc>>,

    #[serde(rename = "total_pagado", default, with = "rust_decimal::serde::float_option")]
    pub amount_paid: Option<Decimal>,

    #[serde(rename = "metodo_pago")]
    pub payment_method: Option<String>,

    /// Employee who attended the entry.
    #[serde(rename = "usuario_nombre")]
    pub attended_by: String,

    /// Employee who invoiced the exit.
    #[serde(rename = "facturo")]
    pub invoiced_by: Option<String>,

    #[serde(rename = "duracion_minutos")]
    pub duration_minutes: Option<i64>,

    #[serde(rename = "porteria_id")]
    pub terminal_id: String,

    #[serde(rename = "estado")]
    pub status: SessionStatus,
}

impl MovementRecord {
    /// Build the record for the first event seen for an id.
    ///
    /// Events without an entry timestamp get the master's receipt time.
    /// Whatever exit fields the event already carries land on the fresh
    /// record too, so a session whose entry sync was lost still keeps its
    /// totals when the exit arrives first. The invoicing employee is only
    /// ever set by a later exit event.
    pub fn from_event(event: &MovementEvent, received_at: DateTime<Utc>) -> Self {
        let status = if event.exited_at.is_some() {
            SessionStatus::Closed
        } else {
            SessionStatus::Open
        };

        Self {
            id: event.id.clone(),
            plate: event.plate.clone(),
            category: event.category.clone(),
            entered_at: event.entered_at.unwrap_or(received_at),
            exited_at: event.exited_at,
            amount_paid: event.amount_paid,
            payment_method: event.payment_method.clone(),
            attended_by: event.employee_name.clone(),
            invoiced_by: None,
            duration_minutes: event.duration_minutes,
            terminal_id: event.terminal_id.clone(),
            status,
        }
    }
}

/// A validated movement event from a gate terminal.
///
/// `id` and `plate` are guaranteed non-empty by the ingress boundary;
/// everything else is whatever the terminal reported.
#[derive(Debug, Clone)]
pub struct MovementEvent {
    pub id: String,
    pub plate: String,
    pub category: String,
    pub entered_at: Option<DateTime<Utc>>,
    pub exited_at: Option<DateTime<Utc>>,
    pub amount_paid: Option<Decimal>,
    pub payment_method: Option<String>,
    pub employee_name: String,
    pub duration_minutes: Option<i64>,
    pub terminal_id: String,
}

/// The exit half of a session, applied onto an existing record.
#[derive(Debug, Clone)]
pub struct ExitUpdate {
    pub exited_at: DateTime<Utc>,
    pub amount_paid: Option<Decimal>,
    pub payment_method: Option<String>,
    pub invoiced_by: Option<String>,
    pub duration_minutes: Option<i64>,
}

impl ExitUpdate {
    pub fn from_event(event: &MovementEvent, exited_at: DateTime<Utc>) -> Self {
        Self {
            exited_at,
            amount_paid: event.amount_paid,
            payment_method: event.payment_method.clone(),
            invoiced_by: (!event.employee_name.is_empty())
                .then(|| event.employee_name.clone()),
            duration_minutes: event.duration_minutes,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Live State
// ═══════════════════════════════════════════════════════════════════════════════

/// Occupancy of one vehicle category: current count vs configured maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupancySlot {
    pub actual: i64,
    pub max: i64,
}

/// A terminal's wholesale snapshot of the lot, as pushed over the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveStateSnapshot {
    #[serde(rename = "ingresos_hoy", with = "rust_decimal::serde::float")]
    pub today_revenue: Decimal,

    #[serde(rename = "ocupacion_total")]
    pub total_occupancy: i64,

    #[serde(rename = "detalle_ocupacion")]
    pub occupancy_detail: HashMap<String, OccupancySlot>,
}

/// The persisted singleton lot snapshot. Replaced wholesale on every push;
/// last writer wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveState {
    #[serde(rename = "ingresos_hoy", with = "rust_decimal::serde::float")]
    pub today_revenue: Decimal,

    #[serde(rename = "ocupacion_total")]
    pub total_occupancy: i64,

    #[serde(rename = "detalle_ocupacion")]
    pub occupancy_detail: HashMap<String, OccupancySlot>,

    #[serde(rename = "ultima_actualizacion")]
    pub updated_at: DateTime<Utc>,
}

impl LiveState {
    pub fn from_snapshot(snapshot: LiveStateSnapshot, updated_at: DateTime<Utc>) -> Self {
        Self {
            today_revenue: snapshot.today_revenue,
            total_occupancy: snapshot.total_occupancy,
            occupancy_detail: snapshot.occupancy_detail,
            updated_at,
        }
    }
}

/// Dashboard read-model: live state joined with the current-day alert count.
#[derive(Debug, Clone, Serialize)]
pub struct DailySummary {
    #[serde(rename = "ingresosHoy", with = "rust_decimal::serde::float")]
    pub today_revenue: Decimal,

    #[serde(rename = "ocupacionTotal")]
    pub total_occupancy: i64,

    #[serde(rename = "alertasPendientes")]
    pub pending_alerts: i64,

    #[serde(rename = "detallesOcupacion")]
    pub occupancy_detail: HashMap<String, OccupancySlot>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Cashout Reports
// ═══════════════════════════════════════════════════════════════════════════════

/// Shift closure report from a terminal. Append-only; immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashoutReport {
    /// Assigned by the store on insert.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    #[serde(rename = "porteria_turno_id")]
    pub shift_id: i64,

    #[serde(rename = "usuario_nombre")]
    pub employee_name: String,

    #[serde(rename = "hora_apertura")]
    pub opened_at: DateTime<Utc>,

    #[serde(rename = "hora_cierre")]
    pub closed_at: DateTime<Utc>,

    #[serde(rename = "base_inicial", with = "rust_decimal::serde::float")]
    pub opening_float: Decimal,

    #[serde(rename = "total_efectivo_sistema", with = "rust_decimal::serde::float")]
    pub system_cash_total: Decimal,

    #[serde(rename = "total_digital_sistema", with = "rust_decimal::serde::float")]
    pub system_digital_total: Decimal,

    #[serde(rename = "total_efectivo_reportado", with = "rust_decimal::serde::float")]
    pub reported_cash_total: Decimal,

    #[serde(rename = "total_digital_reportado", with = "rust_decimal::serde::float")]
    pub reported_digital_total: Decimal,

    #[serde(rename = "observaciones")]
    pub observations: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Security Alerts
// ═══════════════════════════════════════════════════════════════════════════════

/// Security alert metadata synced from a gate camera.
///
/// The photo itself stays on the terminal side; only the metadata row lands
/// here. Resending the same alert id replaces the row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: String,

    #[serde(rename = "camara_id")]
    pub camera_id: String,

    #[serde(rename = "tipo")]
    pub kind: String,

    #[serde(rename = "descripcion")]
    pub description: Option<String>,

    #[serde(rename = "archivo_url")]
    pub file_url: Option<String>,

    #[serde(rename = "fecha")]
    pub occurred_at: DateTime<Utc>,

    #[serde(rename = "sincronizado_el")]
    pub synced_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_record() -> MovementRecord {
        MovementRecord {
            id: "porteria-1:42".to_string(),
            plate: "ABC123".to_string(),
            category: "moto".to_string(),
            entered_at: Utc.with_ymd_and_hms(2025, 6, 1, 8, 30, 0).unwrap(),
            exited_at: None,
            amount_paid: None,
            payment_method: None,
            attended_by: "Laura".to_string(),
            invoiced_by: None,
            duration_minutes: None,
            terminal_id: "porteria-1".to_string(),
            status: SessionStatus::Open,
        }
    }

    #[test]
    fn record_serializes_with_wire_names() {
        let json = serde_json::to_value(sample_record()).unwrap();

        assert_eq!(json["placa"], "ABC123");
        assert_eq!(json["tipo_vehiculo"], "moto");
        assert_eq!(json["usuario_nombre"], "Laura");
        assert_eq!(json["porteria_id"], "porteria-1");
        assert_eq!(json["estado"], "open");
        assert!(json["salida"].is_null());
        assert!(json.get("plate").is_none());
    }

    #[test]
    fn session_status_round_trips() {
        assert_eq!(SessionStatus::parse("open"), Some(SessionStatus::Open));
        assert_eq!(SessionStatus::parse("closed"), Some(SessionStatus::Closed));
        assert_eq!(SessionStatus::parse("voided"), None);
        assert_eq!(SessionStatus::Closed.as_str(), "closed");
    }

    #[test]
    fn snapshot_deserializes_typed_occupancy() {
        let snapshot: LiveStateSnapshot = serde_json::from_str(
            r#"{
                "ingresos_hoy": 4500.5,
                "ocupacion_total": 12,
                "detalle_ocupacion": {
                    "moto": {"actual": 4, "max": 20},
                    "carro": {"actual": 8, "max": 30}
                }
            }"#,
        )
        .unwrap();

        assert_eq!(snapshot.total_occupancy, 12);
        assert_eq!(
            snapshot.occupancy_detail["moto"],
            OccupancySlot { actual: 4, max: 20 }
        );
        assert_eq!(snapshot.today_revenue.to_string(), "4500.5");
    }

    #[test]
    fn summary_uses_dashboard_names() {
        let summary = DailySummary {
            today_revenue: Decimal::from(150),
            total_occupancy: 4,
            pending_alerts: 2,
            occupancy_detail: HashMap::new(),
        };

        let json = serde_json::to_value(summary).unwrap();
        assert_eq!(json["ingresosHoy"], 150.0);
        assert_eq!(json["ocupacionTotal"], 4);
        assert_eq!(json["alertasPendientes"], 2);
        assert!(json["detallesOcupacion"].is_object());
    }

    fn bare_event(id: &str) -> MovementEvent {
        MovementEvent {
            id: id.to_string(),
            plate: "XYZ789".to_string(),
            category: String::new(),
            entered_at: None,
            exited_at: None,
            amount_paid: None,
            payment_method: None,
            employee_name: String::new(),
            duration_minutes: None,
            terminal_id: String::new(),
        }
    }

    #[test]
    fn first_write_defaults_entry_to_receipt_time() {
        let received = Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap();
        let record = MovementRecord::from_event(&bare_event("m-1"), received);

        assert_eq!(record.entered_at, received);
        assert_eq!(record.status, SessionStatus::Open);
        assert!(record.exited_at.is_none());
    }

    #[test]
    fn first_write_keeps_exit_fields_when_exit_arrives_first() {
        let mut event = bare_event("m-2");
        event.exited_at = Some(Utc.with_ymd_and_hms(2025, 6, 1, 11, 0, 0).unwrap());
        event.amount_paid = Some(Decimal::from(2500));

        let record = MovementRecord::from_event(&event, Utc::now());
        assert_eq!(record.status, SessionStatus::Closed);
        assert_eq!(record.exited_at, event.exited_at);
        assert_eq!(record.amount_paid, Some(Decimal::from(2500)));
        assert!(record.invoiced_by.is_none());
    }
}
