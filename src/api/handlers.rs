//! API request handlers with proper error propagation.
//!
//! All fallible handlers return `Result<impl IntoResponse, Error>` so that
//! errors are automatically converted to appropriate HTTP status codes via
//! the `IntoResponse` implementation on `Error`.
//!
//! Validation happens here, before anything touches storage: a rejected
//! request never leaves a partial write behind.

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::error::Error;
use crate::model::{AlertRecord, CashoutReport, LiveStateSnapshot, MovementEvent};
use crate::reconciler::ReconcileOutcome;

// ═══════════════════════════════════════════════════════════════════════════════
// System
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

pub async fn prometheus_metrics() -> impl IntoResponse {
    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        crate::telemetry::render_metrics(),
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// Movement Sync
// ═══════════════════════════════════════════════════════════════════════════════

/// Raw movement payload as terminals send it. Everything is optional at the
/// wire level; `into_event` enforces what is actually required.
#[derive(Debug, Deserialize)]
pub struct SubmitMovementRequest {
    pub id: Option<String>,
    pub placa: Option<String>,
    pub tipo_vehiculo: Option<String>,
    pub entrada: Option<DateTime<Utc>>,
    pub salida: Option<DateTime<Utc>>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub total_pagado: Option<Decimal>,
    pub metodo_pago: Option<String>,
    pub usuario_nombre: Option<String>,
    pub duracion_minutos: Option<i64>,
    pub porteria_id: Option<String>,
}

impl SubmitMovementRequest {
    fn into_event(self) -> Result<MovementEvent, Error> {
        let id = self
            .id
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| Error::missing_field("id"))?;
        let plate = self
            .placa
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| Error::missing_field("placa"))?;

        Ok(MovementEvent {
            id,
            plate,
            category: self.tipo_vehiculo.unwrap_or_default(),
            entered_at: self.entrada,
            exited_at: self.salida,
            amount_paid: self.total_pagado,
            payment_method: self.metodo_pago,
            employee_name: self.usuario_nombre.unwrap_or_default(),
            duration_minutes: self.duracion_minutos,
            terminal_id: self.porteria_id.unwrap_or_default(),
        })
    }
}

/// Acknowledgement for a reconciled movement.
#[derive(Debug, Serialize)]
pub struct MovementAck {
    pub status: &'static str,
    pub mensaje: &'static str,
}

impl From<ReconcileOutcome> for MovementAck {
    fn from(outcome: ReconcileOutcome) -> Self {
        Self {
            status: outcome.as_str(),
            mensaje: outcome.message(),
        }
    }
}

pub async fn submit_movement(
    State(state): State<AppState>,
    Json(req): Json<SubmitMovementRequest>,
) -> Result<impl IntoResponse, Error> {
    let event = req.into_event()?;
    let outcome = state.reconciler.apply(event).await?;

    Ok(Json(MovementAck::from(outcome)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Live State Sync
// ═══════════════════════════════════════════════════════════════════════════════

/// Plain status acknowledgement, as terminals expect it.
#[derive(Debug, Serialize)]
pub struct StatusAck {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mensaje: Option<&'static str>,
}

impl StatusAck {
    fn ok() -> Self {
        Self {
            status: "OK",
            mensaje: None,
        }
    }

    fn with_message(mensaje: &'static str) -> Self {
        Self {
            status: "OK",
            mensaje: Some(mensaje),
        }
    }
}

pub async fn push_live_state(
    State(state): State<AppState>,
    Json(snapshot): Json<LiveStateSnapshot>,
) -> Result<impl IntoResponse, Error> {
    state.aggregator.push(snapshot).await?;

    Ok(Json(StatusAck::ok()))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Cashout Sync
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn report_cashout(
    State(state): State<AppState>,
    Json(report): Json<CashoutReport>,
) -> Result<impl IntoResponse, Error> {
    let id = state.store.append_cashout(&report).await?;
    counter!("patio_cashouts_total").increment(1);
    tracing::info!(
        cashout_id = id,
        shift_id = report.shift_id,
        employee = %report.employee_name,
        "Cashout report received"
    );

    Ok(Json(StatusAck::with_message("Arqueo de caja recibido en central")))
}

pub async fn list_cashouts(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, Error> {
    let reports = state.store.recent_cashouts().await?;
    Ok(Json(reports))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Alert Sync
// ═══════════════════════════════════════════════════════════════════════════════

/// Alert metadata as sent by gate cameras. The photo itself never reaches
/// the master; `archivo_url` is an opaque pointer owned by the terminal.
#[derive(Debug, Deserialize)]
pub struct SyncAlertRequest {
    pub id: Option<String>,
    pub camara_id: Option<String>,
    pub tipo: Option<String>,
    pub descripcion: Option<String>,
    pub archivo_url: Option<String>,
    pub fecha: Option<DateTime<Utc>>,
}

pub async fn sync_alert(
    State(state): State<AppState>,
    Json(req): Json<SyncAlertRequest>,
) -> Result<impl IntoResponse, Error> {
    let id = req
        .id
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| Error::missing_field("id"))?;

    let now = Utc::now();
    let alert = AlertRecord {
        id,
        camera_id: req.camara_id.unwrap_or_default(),
        kind: req.tipo.unwrap_or_default(),
        description: req.descripcion,
        file_url: req.archivo_url,
        occurred_at: req.fecha.unwrap_or(now),
        synced_at: now,
    };

    state.store.upsert_alert(&alert).await?;
    counter!("patio_alerts_total").increment(1);

    Ok(Json(StatusAck::with_message("Alerta sincronizada en central")))
}

#[derive(Debug, Deserialize)]
pub struct AlertParams {
    pub limit: Option<i64>,
}

pub async fn list_alerts(
    State(state): State<AppState>,
    Query(params): Query<AlertParams>,
) -> Result<impl IntoResponse, Error> {
    let limit = params.limit.unwrap_or(50).clamp(1, 200);
    let alerts = state.store.recent_alerts(limit).await?;
    Ok(Json(alerts))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Dashboard Queries
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn get_summary(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, Error> {
    let summary = state.aggregator.summary().await?;
    Ok(Json(summary))
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<i64>,
}

pub async fn get_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<impl IntoResponse, Error> {
    let limit = params.limit.unwrap_or(100).clamp(1, 500);
    let records = state.store.recent_movements(limit).await?;
    Ok(Json(records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn full_request() -> SubmitMovementRequest {
        serde_json::from_str(
            r#"{
                "id": "porteria-1:77",
                "placa": "JKL321",
                "tipo_vehiculo": "carro",
                "entrada": "2025-06-01T08:00:00Z",
                "salida": "2025-06-01T10:15:00Z",
                "total_pagado": 6500.5,
                "metodo_pago": "efectivo",
                "usuario_nombre": "Carlos",
                "duracion_minutos": 135,
                "porteria_id": "porteria-1"
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn into_event_maps_all_fields() {
        let event = full_request().into_event().unwrap();

        assert_eq!(event.id, "porteria-1:77");
        assert_eq!(event.plate, "JKL321");
        assert_eq!(event.category, "carro");
        assert!(event.entered_at.is_some());
        assert!(event.exited_at.is_some());
        assert_eq!(event.amount_paid.unwrap().to_string(), "6500.5");
        assert_eq!(event.employee_name, "Carlos");
        assert_eq!(event.duration_minutes, Some(135));
        assert_eq!(event.terminal_id, "porteria-1");
    }

    #[test]
    fn into_event_rejects_missing_id() {
        let mut req = full_request();
        req.id = None;

        let err = req.into_event().unwrap_err();
        assert_eq!(err.code(), ErrorCode::MissingRequiredField);
        assert!(err.user_message().contains("id"));
    }

    #[test]
    fn into_event_rejects_blank_plate() {
        let mut req = full_request();
        req.placa = Some("   ".to_string());

        let err = req.into_event().unwrap_err();
        assert_eq!(err.code(), ErrorCode::MissingRequiredField);
        assert!(err.user_message().contains("placa"));
    }

    #[test]
    fn movement_ack_wire_shape() {
        let ack = MovementAck::from(ReconcileOutcome::EntryRecorded);
        let json = serde_json::to_value(&ack).unwrap();

        assert_eq!(json["status"], "entry-recorded");
        assert_eq!(json["mensaje"], "Entrada registrada");
    }

    #[test]
    fn status_ack_omits_empty_message() {
        let json = serde_json::to_value(StatusAck::ok()).unwrap();
        assert_eq!(json["status"], "OK");
        assert!(json.get("mensaje").is_none());
    }
}
