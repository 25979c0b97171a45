//! Back-office API Server Binary
//!
//! # Usage
//!
//! ```bash
//! # In-memory storage, defaults
//! cargo run --bin backoffice-api
//!
//! # PostgreSQL storage
//! API_STORAGE=postgres API_DATABASE__URL=postgres://... cargo run --bin backoffice-api
//! ```
//!
//! # Environment Variables
//!
//! * `API_HOST` - Server host (default: 0.0.0.0)
//! * `API_PORT` - Server port (default: 8080)
//! * `API_STORAGE` - `memory` or `postgres` (default: memory)
//! * `API_DATABASE__URL` - PostgreSQL connection string
//! * `API_DATABASE__MAX_CONNECTIONS` - Pool ceiling (default: 10)
//! * `API_LOG_LEVEL` - Log level or filter directive (default: info)
//! * `API_LOG_FORMAT` - `text` or `json` (default: text)
//! * `API_REQUEST_TIMEOUT_SECS` - Per-request deadline (default: 30)
//! * `API_MAX_CONFLICT_RETRIES` - Version conflict retries (default: 5)
//! * `API_RETRY_PENDING_INTERVAL_SECS` - Pending posting drain interval, 0 disables (default: 60)
//! * `API_CURRENCY` - Ledger currency (default: USD)

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use infra_db::{create_pool, run_migrations, DatabaseConfig};
use interface_api::config::{ApiConfig, LogFormat, StorageBackend};
use interface_api::{create_router, AppState, Ports};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (useful for local development)
    dotenvy::dotenv().ok();

    let config = ApiConfig::from_env().context("invalid API configuration")?;

    init_tracing(&config.log_level, config.log_format);

    tracing::info!(
        host = %config.host,
        port = %config.port,
        storage = ?config.storage,
        "Starting back-office API server"
    );

    let currency = config.ledger_currency().context("invalid ledger currency")?;
    let ports = match config.storage {
        StorageBackend::Memory => Ports::in_memory(currency),
        StorageBackend::Postgres => {
            let db_config = DatabaseConfig::new(config.database.url.clone())
                .max_connections(config.database.max_connections);
            let pool = create_pool(db_config).await?;
            run_migrations(&pool).await?;
            Ports::postgres(pool, currency).await?
        }
    };

    let state = AppState::new(ports, config.clone()).await?;

    if let Some(interval) = config.retry_pending_interval() {
        spawn_pending_drain(state.clone(), interval);
    }

    let app = create_router(state);

    let addr: SocketAddr = config.server_addr().parse()?;
    tracing::info!(%addr, "Server listening");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Initializes the tracing subscriber; `RUST_LOG` wins over the configured level
fn init_tracing(log_level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer().with_target(true)).init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
    }
}

/// Periodically re-attempts queued ledger postings
fn spawn_pending_drain(state: AppState, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match state.poster.retry_pending().await {
                Ok(report) if !report.posted.is_empty() || !report.still_pending.is_empty() => {
                    tracing::info!(
                        posted = report.posted.len(),
                        still_pending = report.still_pending.len(),
                        "Pending postings drained"
                    );
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "Pending posting drain failed"),
            }
        }
    });
}

/// Waits for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
