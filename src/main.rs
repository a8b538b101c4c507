//! stats-engine server entry point.
//!
//! Seeds the statistics, starts the collection listeners and serves the
//! REST and WebSocket endpoints until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

use stats_engine::api;
use stats_engine::app_state::AppState;
use stats_engine::config::StatsConfig;
use stats_engine::domain::EventBus;
use stats_engine::persistence::{MemorySnapshotStore, PostgresSnapshotStore, SnapshotStore};
use stats_engine::service::{ListenerSupervisor, RecomputeEngine, StatsService, SupervisorConfig};
use stats_engine::source::{
    ChangeSource, MemoryDocumentStore, PgChangeSource, PgCollections, SourceCollections,
};

type Backend = (
    Arc<dyn SnapshotStore>,
    Arc<dyn ChangeSource>,
    Arc<dyn SourceCollections>,
);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = StatsConfig::from_env().context("invalid LISTEN_ADDR")?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.log_json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    tracing::info!(addr = %config.listen_addr, "starting stats-engine");

    let (store, source, collections) = build_backend(&config).await?;

    // Build service layer
    let event_bus = EventBus::new(config.event_bus_capacity);
    let engine = Arc::new(RecomputeEngine::new(
        Arc::clone(&store),
        collections,
        event_bus.clone(),
        config.snapshot_conflict_retries,
    ));
    let supervisor = ListenerSupervisor::new(engine, source, SupervisorConfig::from(&config));
    let listeners = supervisor.start().await.context("seeding statistics")?;

    // Build application state
    let app_state = AppState {
        stats_service: StatsService::new(store),
        event_bus,
        health: listeners.health().clone(),
    };
    let app = api::build_app(app_state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
        })
        .await?;

    tracing::info!("shutting down");
    listeners.stop().await;

    Ok(())
}

async fn build_backend(config: &StatsConfig) -> anyhow::Result<Backend> {
    if !config.persistence_enabled {
        tracing::warn!("persistence disabled; using the in-memory backend");
        let documents = Arc::new(MemoryDocumentStore::new(config.change_history_capacity));
        return Ok((
            Arc::new(MemorySnapshotStore::new()) as Arc<dyn SnapshotStore>,
            Arc::clone(&documents) as Arc<dyn ChangeSource>,
            documents as Arc<dyn SourceCollections>,
        ));
    }

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .min_connections(config.database_min_connections)
        .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
        .connect(&config.database_url)
        .await
        .context("connecting to PostgreSQL")?;

    let store = PostgresSnapshotStore::new(pool.clone());
    store.migrate().await.context("running migrations")?;
    tracing::info!("database ready");

    Ok((
        Arc::new(store) as Arc<dyn SnapshotStore>,
        Arc::new(PgChangeSource::new(pool.clone())) as Arc<dyn ChangeSource>,
        Arc::new(PgCollections::new(pool)) as Arc<dyn SourceCollections>,
    ))
}
