use anyhow::{Context, Result};
use reclaim_core::Config;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::path::Path;
use std::time::Duration;

const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(10 * 60);
const POOL_MAX_LIFETIME: Duration = Duration::from_secs(30 * 60);

/// Connect to Postgres and bring the receipt schema up to date.
pub async fn setup_database(config: &Config) -> Result<PgPool> {
    let pool = connect(config).await?;
    apply_migrations(&pool).await?;
    Ok(pool)
}

async fn connect(config: &Config) -> Result<PgPool> {
    let max_connections = config.db_max_connections();
    let acquire_timeout = Duration::from_secs(config.db_timeout_seconds());

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(acquire_timeout)
        .idle_timeout(POOL_IDLE_TIMEOUT)
        .max_lifetime(POOL_MAX_LIFETIME)
        .connect(config.database_url())
        .await
        .context("Failed to connect to the receipt database")?;

    tracing::info!(
        max_connections,
        acquire_timeout_secs = acquire_timeout.as_secs(),
        "Receipt database pool ready"
    );
    Ok(pool)
}

async fn apply_migrations(pool: &PgPool) -> Result<()> {
    // migrations/ lives at the workspace root.
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../migrations");
    let migrator = Migrator::new(dir.clone())
        .await
        .with_context(|| format!("Failed to load migrations from {}", dir.display()))?;

    migrator
        .run(pool)
        .await
        .context("Failed to apply receipt schema migrations")?;

    tracing::info!(
        migrations = migrator.iter().count(),
        "Receipt schema up to date"
    );
    Ok(())
}
