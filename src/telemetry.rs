//! Telemetry: structured logging and Prometheus metrics.

use metrics::describe_counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

/// Global Prometheus handle, installed once at startup.
static PROMETHEUS: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` takes precedence; otherwise the configured level applies
/// globally. JSON output is the production default, pretty output is for
/// development.
pub fn init(config: &ObservabilityConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    if config.json_logging {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    Ok(())
}

/// Install the Prometheus metrics recorder and register metric descriptions.
pub fn init_metrics() -> anyhow::Result<()> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {}", e))?;
    let _ = PROMETHEUS.set(handle);

    describe_counter!(
        "patio_movements_total",
        "Movement events reconciled, labeled by outcome"
    );
    describe_counter!(
        "patio_live_state_pushes_total",
        "Live-state snapshots accepted from terminals"
    );
    describe_counter!(
        "patio_cashouts_total",
        "Cashout reports appended to the audit trail"
    );
    describe_counter!(
        "patio_alerts_total",
        "Security alerts synced from gate cameras"
    );
    describe_counter!(
        "patio_errors_total",
        "Errors raised, labeled by code and category"
    );

    Ok(())
}

/// Render all metrics in Prometheus text format.
///
/// Returns an empty string when no recorder is installed (e.g. in tests).
pub fn render_metrics() -> String {
    PROMETHEUS.get().map(|h| h.render()).unwrap_or_default()
}
