//! # Pipeline Server
//!
//! Loads configuration, connects to PostgreSQL, applies migrations, then runs
//! the timer scheduler and the HTTP surface until Ctrl-C.

use anyhow::Context;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

use pipeline_core::clients::{HttpComputeProvisioner, HttpDeliverySink};
use pipeline_core::config::ConfigManager;
use pipeline_core::logging::init_structured_logging;
use pipeline_core::orchestration::{BatchOrchestrator, TimerScheduler};
use pipeline_core::phases::PhaseRegistry;
use pipeline_core::state_store::PgBatchStore;
use pipeline_core::web::{create_app, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_structured_logging();

    let manager = ConfigManager::load().context("loading configuration")?;
    let config = manager.config().clone();
    info!(
        environment = %manager.environment(),
        config = ?config.sanitized(),
        "Configuration loaded"
    );

    let store = Arc::new(
        PgBatchStore::connect(&config.database)
            .await
            .context("connecting to PostgreSQL")?,
    );
    store.migrate().await.context("applying migrations")?;

    let orchestrator = Arc::new(BatchOrchestrator::new(
        PhaseRegistry::standard()?,
        store.clone(),
        store.clone(),
        Arc::new(HttpDeliverySink::new(&config.delivery)?),
        Arc::new(HttpComputeProvisioner::new(&config.compute)?),
        &config,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler = TimerScheduler::new(orchestrator.clone(), store.clone(), config.scheduler.clone());
    let scheduler_handle = tokio::spawn(async move {
        if let Err(e) = scheduler.run(shutdown_rx).await {
            error!(error = %e, "Timer scheduler failed");
        }
    });

    let app = create_app(AppState::new(orchestrator, manager.environment()));
    let listener = tokio::net::TcpListener::bind(&config.web.bind_address)
        .await
        .with_context(|| format!("binding {}", config.web.bind_address))?;
    info!(address = %config.web.bind_address, "Pipeline server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await
        .context("serving HTTP")?;

    let _ = shutdown_tx.send(true);
    let _ = scheduler_handle.await;
    info!("Pipeline server stopped");
    Ok(())
}
