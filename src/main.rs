//! Patio Server - Main entry point
//!
//! Master synchronization node for multi-gate parking deployments.

use std::net::SocketAddr;

use patio_core::{
    api::{self, AppState},
    config::{Config, DatabaseConfig},
    store::Store,
    telemetry,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config: {}. Using defaults.", e);
        Config {
            server: Default::default(),
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite:patio_central.db".to_string()),
                max_connections: 5,
            },
            observability: Default::default(),
        }
    });

    // Initialize telemetry
    telemetry::init(&config.observability)?;
    telemetry::init_metrics()?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting Patio Central master node"
    );

    // Open the ledger database and apply migrations
    let store = Store::connect(&config.database.url, config.database.max_connections).await?;
    store.migrate().await?;
    tracing::info!(url = %config.database.url, "Ledger database ready");

    // Create app state and router
    let state = AppState::new(store);
    let app = api::build_router(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!(address = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Wait for shutdown signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
