//! Record store for the master ledger.
//!
//! SQLite through sqlx: the master node is a single process owning a single
//! ledger file, so an embedded engine is the right fit. All operations are
//! atomic at single-record granularity; no multi-record transactions are
//! needed by the sync pipeline.
//!
//! Monetary values are stored as TEXT and carried as `rust_decimal::Decimal`
//! so repeated overwrites never accumulate floating-point drift.

use chrono::{DateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, ErrorCode, Result};
use crate::model::{
    AlertRecord, CashoutReport, ExitUpdate, LiveState, MovementRecord, SessionStatus,
};

/// Database connection and operations.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if missing) the ledger database.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(Error::from)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Run migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::from(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Movement Operations
    // ═══════════════════════════════════════════════════════════════════════════

    /// Look up a movement record by its terminal-generated id.
    pub async fn get_movement(&self, id: &str) -> Result<Option<MovementRecord>> {
        let row = sqlx::query_as::<_, MovementRow>(
            r#"
            SELECT id, plate, category, entered_at, exited_at, amount_paid,
                   payment_method, attended_by, invoiced_by, duration_minutes,
                   terminal_id, status
            FROM movements
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(MovementRow::into_record).transpose()
    }

    /// Insert the entry half of a session.
    pub async fn insert_movement(&self, record: &MovementRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO movements (id, plate, category, entered_at, exited_at, amount_paid,
                                   payment_method, attended_by, invoiced_by, duration_minutes,
                                   terminal_id, status)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.plate)
        .bind(&record.category)
        .bind(record.entered_at)
        .bind(record.exited_at)
        .bind(record.amount_paid.map(|d| d.to_string()))
        .bind(&record.payment_method)
        .bind(&record.attended_by)
        .bind(&record.invoiced_by)
        .bind(record.duration_minutes)
        .bind(&record.terminal_id)
        .bind(record.status.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Apply the exit half onto an existing record. Entry fields are left
    /// untouched; the session becomes (or stays) closed.
    pub async fn close_movement(&self, id: &str, exit: &ExitUpdate) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE movements
            SET exited_at = ?,
                amount_paid = ?,
                payment_method = ?,
                invoiced_by = ?,
                duration_minutes = ?,
                status = 'closed'
            WHERE id = ?
            "#,
        )
        .bind(exit.exited_at)
        .bind(exit.amount_paid.map(|d| d.to_string()))
        .bind(&exit.payment_method)
        .bind(&exit.invoiced_by)
        .bind(exit.duration_minutes)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Recent movement records, newest entry first.
    pub async fn recent_movements(&self, limit: i64) -> Result<Vec<MovementRecord>> {
        let rows = sqlx::query_as::<_, MovementRow>(
            r#"
            SELECT id, plate, category, entered_at, exited_at, amount_paid,
                   payment_method, attended_by, invoiced_by, duration_minutes,
                   terminal_id, status
            FROM movements
            ORDER BY entered_at DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(MovementRow::into_record).collect()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Live State Operations
    // ═══════════════════════════════════════════════════════════════════════════

    /// Read the singleton lot snapshot. The row is seeded by the schema
    /// migration, so this never returns "not found".
    pub async fn read_live_state(&self) -> Result<LiveState> {
        let row = sqlx::query_as::<_, LiveStateRow>(
            r#"
            SELECT today_revenue, total_occupancy, occupancy_detail, updated_at
            FROM live_state
            WHERE id = 1
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        row.into_state()
    }

    /// Replace the singleton lot snapshot wholesale. A single UPDATE, so the
    /// fields of one push always land together.
    pub async fn write_live_state(&self, state: &LiveState) -> Result<()> {
        let detail = serde_json::to_string(&state.occupancy_detail)?;

        sqlx::query(
            r#"
            UPDATE live_state
            SET today_revenue = ?, total_occupancy = ?, occupancy_detail = ?, updated_at = ?
            WHERE id = 1
            "#,
        )
        .bind(state.today_revenue.to_string())
        .bind(state.total_occupancy)
        .bind(detail)
        .bind(state.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Cashout Operations
    // ═══════════════════════════════════════════════════════════════════════════

    /// Append a shift closure report. Returns the assigned row id.
    pub async fn append_cashout(&self, report: &CashoutReport) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO cashout_reports (shift_id, employee_name, opened_at, closed_at,
                                         opening_float, system_cash_total, system_digital_total,
                                         reported_cash_total, reported_digital_total, observations)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(report.shift_id)
        .bind(&report.employee_name)
        .bind(report.opened_at)
        .bind(report.closed_at)
        .bind(report.opening_float.to_string())
        .bind(report.system_cash_total.to_string())
        .bind(report.system_digital_total.to_string())
        .bind(report.reported_cash_total.to_string())
        .bind(report.reported_digital_total.to_string())
        .bind(&report.observations)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// All shift closure reports, newest close first.
    pub async fn recent_cashouts(&self) -> Result<Vec<CashoutReport>> {
        let rows = sqlx::query_as::<_, CashoutRow>(
            r#"
            SELECT id, shift_id, employee_name, opened_at, closed_at,
                   opening_float, system_cash_total, system_digital_total,
                   reported_cash_total, reported_digital_total, observations
            FROM cashout_reports
            ORDER BY closed_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(CashoutRow::into_report).collect()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Alert Operations
    // ═══════════════════════════════════════════════════════════════════════════

    /// Insert or replace an alert metadata row. Terminals resend alerts after
    /// offline periods, so delivery is at-least-once.
    pub async fn upsert_alert(&self, alert: &AlertRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO security_alerts (id, camera_id, kind, description, file_url,
                                         occurred_at, synced_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                camera_id = excluded.camera_id,
                kind = excluded.kind,
                description = excluded.description,
                file_url = excluded.file_url,
                occurred_at = excluded.occurred_at,
                synced_at = excluded.synced_at
            "#,
        )
        .bind(&alert.id)
        .bind(&alert.camera_id)
        .bind(&alert.kind)
        .bind(&alert.description)
        .bind(&alert.file_url)
        .bind(alert.occurred_at)
        .bind(alert.synced_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Count alerts that occurred since UTC midnight.
    pub async fn count_alerts_today(&self) -> Result<i64> {
        let day_start = Utc::now().date_naive().and_time(NaiveTime::MIN).and_utc();

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM security_alerts WHERE occurred_at >= ?",
        )
        .bind(day_start)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Recent alerts, newest first.
    pub async fn recent_alerts(&self, limit: i64) -> Result<Vec<AlertRecord>> {
        let rows = sqlx::query_as::<_, AlertRow>(
            r#"
            SELECT id, camera_id, kind, description, file_url, occurred_at, synced_at
            FROM security_alerts
            ORDER BY occurred_at DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(AlertRow::into_record).collect())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Row Types (for sqlx queries)
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, sqlx::FromRow)]
struct MovementRow {
    id: String,
    plate: String,
    category: String,
    entered_at: DateTime<Utc>,
    exited_at: Option<DateTime<Utc>>,
    amount_paid: Option<String>,
    payment_method: Option<String>,
    attended_by: String,
    invoiced_by: Option<String>,
    duration_minutes: Option<i64>,
    terminal_id: String,
    status: String,
}

impl MovementRow {
    fn into_record(self) -> Result<MovementRecord> {
        let status = SessionStatus::parse(&self.status).ok_or_else(|| {
            Error::with_internal(
                ErrorCode::SerializationError,
                "Stored movement record is corrupt",
                format!("unknown session status {:?} for movement {}", self.status, self.id),
            )
        })?;

        Ok(MovementRecord {
            amount_paid: self.amount_paid.as_deref().map(parse_decimal).transpose()?,
            id: self.id,
            plate: self.plate,
            category: self.category,
            entered_at: self.entered_at,
            exited_at: self.exited_at,
            payment_method: self.payment_method,
            attended_by: self.attended_by,
            invoiced_by: self.invoiced_by,
            duration_minutes: self.duration_minutes,
            terminal_id: self.terminal_id,
            status,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LiveStateRow {
    today_revenue: String,
    total_occupancy: i64,
    occupancy_detail: String,
    updated_at: DateTime<Utc>,
}

impl LiveStateRow {
    fn into_state(self) -> Result<LiveState> {
        Ok(LiveState {
            today_revenue: parse_decimal(&self.today_revenue)?,
            total_occupancy: self.total_occupancy,
            occupancy_detail: serde_json::from_str(&self.occupancy_detail)?,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CashoutRow {
    id: i64,
    shift_id: i64,
    employee_name: String,
    opened_at: DateTime<Utc>,
    closed_at: DateTime<Utc>,
    opening_float: String,
    system_cash_total: String,
    system_digital_total: String,
    reported_cash_total: String,
    reported_digital_total: String,
    observations: Option<String>,
}

impl CashoutRow {
    fn into_report(self) -> Result<CashoutReport> {
        Ok(CashoutReport {
            id: Some(self.id),
            shift_id: self.shift_id,
            employee_name: self.employee_name,
            opened_at: self.opened_at,
            closed_at: self.closed_at,
            opening_float: parse_decimal(&self.opening_float)?,
            system_cash_total: parse_decimal(&self.system_cash_total)?,
            system_digital_total: parse_decimal(&self.system_digital_total)?,
            reported_cash_total: parse_decimal(&self.reported_cash_total)?,
            reported_digital_total: parse_decimal(&self.reported_digital_total)?,
            observations: self.observations,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AlertRow {
    id: String,
    camera_id: String,
    kind: String,
    description: Option<String>,
    file_url: Option<String>,
    occurred_at: DateTime<Utc>,
    synced_at: DateTime<Utc>,
}

impl AlertRow {
    fn into_record(self) -> AlertRecord {
        AlertRecord {
            id: self.id,
            camera_id: self.camera_id,
            kind: self.kind,
            description: self.description,
            file_url: self.file_url,
            occurred_at: self.occurred_at,
            synced_at: self.synced_at,
        }
    }
}

fn parse_decimal(raw: &str) -> Result<Decimal> {
    raw.parse::<Decimal>().map_err(|e| {
        Error::with_internal(
            ErrorCode::SerializationError,
            "Stored monetary value is corrupt",
            format!("{}: {:?}", e, raw),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MovementEvent, OccupancySlot};
    use chrono::TimeZone;
    use std::collections::HashMap;

    async fn test_store() -> Store {
        let store = Store::connect("sqlite::memory:", 1).await.unwrap();
        store.migrate().await.unwrap();
        store
    }

    fn event(id: &str) -> MovementEvent {
        MovementEvent {
            id: id.to_string(),
            plate: "ABC123".to_string(),
            category: "carro".to_string(),
            entered_at: Some(Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap()),
            exited_at: None,
            amount_paid: None,
            payment_method: None,
            employee_name: "Laura".to_string(),
            duration_minutes: None,
            terminal_id: "porteria-1".to_string(),
        }
    }

    #[tokio::test]
    async fn movement_round_trips_decimal_exactly() {
        let store = test_store().await;
        let mut record = MovementRecord::from_event(&event("m-1"), Utc::now());
        record.amount_paid = Some("4500.50".parse().unwrap());
        store.insert_movement(&record).await.unwrap();

        let loaded = store.get_movement("m-1").await.unwrap().unwrap();
        assert_eq!(loaded.amount_paid.unwrap().to_string(), "4500.50");
        assert_eq!(loaded, record);
    }

    #[tokio::test]
    async fn close_preserves_entry_fields() {
        let store = test_store().await;
        let record = MovementRecord::from_event(&event("m-2"), Utc::now());
        store.insert_movement(&record).await.unwrap();

        let exit = ExitUpdate {
            exited_at: Utc.with_ymd_and_hms(2025, 6, 1, 10, 30, 0).unwrap(),
            amount_paid: Some("7000".parse().unwrap()),
            payment_method: Some("efectivo".to_string()),
            invoiced_by: Some("Carlos".to_string()),
            duration_minutes: Some(150),
        };
        store.close_movement("m-2", &exit).await.unwrap();

        let loaded = store.get_movement("m-2").await.unwrap().unwrap();
        assert_eq!(loaded.status, SessionStatus::Closed);
        assert_eq!(loaded.attended_by, "Laura");
        assert_eq!(loaded.invoiced_by.as_deref(), Some("Carlos"));
        assert_eq!(loaded.entered_at, record.entered_at);
        assert_eq!(loaded.exited_at, Some(exit.exited_at));
    }

    #[tokio::test]
    async fn recent_movements_newest_entry_first() {
        let store = test_store().await;
        for (i, hour) in [(1, 8), (2, 9), (3, 10)] {
            let mut e = event(&format!("m-{}", i));
            e.entered_at = Some(Utc.with_ymd_and_hms(2025, 6, 1, hour, 0, 0).unwrap());
            store
                .insert_movement(&MovementRecord::from_event(&e, Utc::now()))
                .await
                .unwrap();
        }

        let recent = store.recent_movements(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, "m-3");
        assert_eq!(recent[1].id, "m-2");
    }

    #[tokio::test]
    async fn live_state_seeded_with_zeros() {
        let store = test_store().await;
        let state = store.read_live_state().await.unwrap();
        assert_eq!(state.today_revenue, Decimal::ZERO);
        assert_eq!(state.total_occupancy, 0);
        assert!(state.occupancy_detail.is_empty());
    }

    #[tokio::test]
    async fn live_state_write_replaces_wholesale() {
        let store = test_store().await;
        let mut detail = HashMap::new();
        detail.insert("moto".to_string(), OccupancySlot { actual: 2, max: 10 });

        let state = LiveState {
            today_revenue: "100".parse().unwrap(),
            total_occupancy: 5,
            occupancy_detail: detail,
            updated_at: Utc::now(),
        };
        store.write_live_state(&state).await.unwrap();

        let loaded = store.read_live_state().await.unwrap();
        assert_eq!(loaded.today_revenue, Decimal::from(100));
        assert_eq!(loaded.total_occupancy, 5);
        assert_eq!(loaded.occupancy_detail["moto"].max, 10);
    }

    #[tokio::test]
    async fn alert_upsert_is_idempotent() {
        let store = test_store().await;
        let alert = AlertRecord {
            id: "a-1".to_string(),
            camera_id: "cam-4".to_string(),
            kind: "intrusion".to_string(),
            description: None,
            file_url: None,
            occurred_at: Utc::now(),
            synced_at: Utc::now(),
        };

        store.upsert_alert(&alert).await.unwrap();
        store.upsert_alert(&alert).await.unwrap();

        assert_eq!(store.recent_alerts(50).await.unwrap().len(), 1);
        assert_eq!(store.count_alerts_today().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn connect_creates_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        let url = format!("sqlite:{}", path.display());

        let store = Store::connect(&url, 1).await.unwrap();
        store.migrate().await.unwrap();

        assert!(path.exists());
    }
}
