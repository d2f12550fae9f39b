//! Application setup and initialization
//!
//! Wires configuration, the database pool, blob storage and the pipeline
//! services into an `AppState`, then builds the router. `main` only loads the
//! config and serves what this returns.

pub mod database;
pub mod routes;
pub mod server;
pub mod services;

use crate::state::AppState;
use anyhow::{Context, Result};
use reclaim_core::Config;
use reclaim_services::ReapParams;
use std::sync::Arc;
use std::time::Duration;

const SERVICE_NAME: &str = "reclaim-api";

/// Initialize the entire application
pub async fn initialize_app(config: Config) -> Result<(Arc<AppState>, axum::Router)> {
    // Fail fast on misconfiguration
    config.validate().context("Configuration validation failed")?;

    reclaim_infra::init_telemetry(SERVICE_NAME, config.environment(), config.log_json())
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    tracing::info!("Configuration loaded and validated successfully");

    let pool = database::setup_database(&config).await?;

    let storage = reclaim_storage::create_storage(&config)
        .await
        .context("Failed to initialize receipt storage")?;
    tracing::info!(backend = ?storage.backend_type(), "Receipt storage initialized");

    let state = services::initialize_services(&config, pool, storage)?;

    if config.reaper_schedule_secs() > 0 {
        let params = ReapParams::new(
            Some(config.reaper_threshold_minutes()),
            Some(config.reaper_batch_limit()),
        );
        state
            .reaper
            .clone()
            .start(Duration::from_secs(config.reaper_schedule_secs()), params);
        tracing::info!(
            every_secs = config.reaper_schedule_secs(),
            threshold_minutes = params.threshold_minutes(),
            limit = params.limit(),
            "Stuck-job reaper scheduled"
        );
    }

    let router = routes::setup_routes(state.clone())?;

    Ok((state, router))
}
