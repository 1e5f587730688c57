//! Control tables used by the bulkloader

use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::info;

/// Create or upgrade `running_jobflows`, `jobflow_instance_lock` and `export_temp_table`
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    info!("Running database migrations...");
    sqlx::migrate!("../../migrations")
        .run(pool)
        .await
        .context("Failed to run database migrations")?;
    info!("Database migrations completed");
    Ok(())
}
