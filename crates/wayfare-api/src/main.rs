//! Wayfare API server entry point.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;
use wayfare_api::catalog::FileCatalog;
use wayfare_api::config::AppConfig;
use wayfare_api::error::AppError;
use wayfare_api::gateway::SimulatedGateway;
use wayfare_api::state::AppState;
use wayfare_api::{build_router, workers};
use wayfare_booking::application::refund_queue::RefundRetryQueue;
use wayfare_booking::gateway::TimeoutGateway;
use wayfare_booking::ledger::{InMemoryLedgerStore, LedgerStore};
use wayfare_core::catalog::CatalogLookup;
use wayfare_core::clock::SystemClock;
use wayfare_ledger_store::pg_ledger_store::PgLedgerStore;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting Wayfare API server");

    let config = AppConfig::from_env()?;
    let addr = config.bind_addr()?;

    // Select the ledger.
    let ledger: Arc<dyn LedgerStore> = match &config.database_url {
        Some(database_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(database_url)
                .await?;
            let store = PgLedgerStore::new(pool);
            store.ensure_schema().await?;
            tracing::info!("Using PostgreSQL ledger");
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; bookings are kept in memory only");
            Arc::new(InMemoryLedgerStore::new())
        }
    };

    let catalog: Arc<dyn CatalogLookup> = match &config.catalog_path {
        Some(path) => Arc::new(FileCatalog::load(path).await?),
        None => {
            tracing::warn!("CATALOG_PATH not set; no packages can be booked");
            Arc::new(FileCatalog::empty())
        }
    };

    let gateway = Arc::new(TimeoutGateway::new(
        Arc::new(SimulatedGateway),
        config.gateway_timeout,
    ));

    // Build application state.
    let app_state = AppState::new(
        Arc::new(SystemClock),
        catalog,
        ledger,
        gateway,
        RefundRetryQueue::new(config.refund_policy()),
    );

    // Start background workers.
    let _refund_worker =
        workers::spawn_refund_worker(app_state.clone(), config.refund_retry_interval);
    let _match_sweeper = config
        .match_sweep_interval
        .map(|every| workers::spawn_match_sweeper(app_state.clone(), every));

    let app = build_router(app_state);

    // Start server.
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app).await?;

    Ok(())
}
