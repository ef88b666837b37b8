//! Database migrations.

use crate::error::{PulseError, Result};
use sqlx::SqlitePool;
use tracing::{info, instrument};

const SCHEMA_VERSION: i64 = 1;

#[instrument(skip(pool))]
pub async fn run(pool: &SqlitePool) -> Result<()> {
    // Create schema_version table if not exists
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| PulseError::MigrationFailed { reason: e.to_string() })?;

    // Get current schema version
    let current_version: Option<i64> =
        sqlx::query_scalar("SELECT version FROM schema_version LIMIT 1")
            .fetch_optional(pool)
            .await
            .map_err(|e| PulseError::MigrationFailed { reason: e.to_string() })?;

    let current_version = current_version.unwrap_or(0);

    if current_version >= SCHEMA_VERSION {
        info!("Database schema is up to date (version {})", current_version);
        return Ok(());
    }

    info!("Migrating database from version {} to {}", current_version, SCHEMA_VERSION);

    if current_version < 1 {
        migrate_to_v1(pool).await?;
    }

    Ok(())
}

#[instrument(skip(pool))]
async fn migrate_to_v1(pool: &SqlitePool) -> Result<()> {
    info!("Running migration to schema version 1");

    // Metrics history table for time-series data
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS metrics_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            recorded_at INTEGER NOT NULL,
            timestamp INTEGER NOT NULL,
            total_cpu_percent REAL NOT NULL DEFAULT 0,
            per_core_cpu_percent TEXT NOT NULL DEFAULT '[]',
            system_memory_total_mb REAL NOT NULL DEFAULT 0,
            system_memory_used_mb REAL NOT NULL DEFAULT 0,
            top_processes TEXT NOT NULL DEFAULT '[]'
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| PulseError::MigrationFailed { reason: e.to_string() })?;

    // Newest-first index for time-range queries on agent timestamps
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_metrics_history_timestamp \
         ON metrics_history(timestamp DESC)",
    )
    .execute(pool)
    .await
    .map_err(|e| PulseError::MigrationFailed { reason: e.to_string() })?;

    // Newest-first index for recency reads and retention pruning
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_metrics_history_recorded \
         ON metrics_history(recorded_at DESC)",
    )
    .execute(pool)
    .await
    .map_err(|e| PulseError::MigrationFailed { reason: e.to_string() })?;

    // Update schema version
    sqlx::query("DELETE FROM schema_version")
        .execute(pool)
        .await
        .map_err(|e| PulseError::MigrationFailed { reason: e.to_string() })?;

    sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
        .bind(1i64)
        .execute(pool)
        .await
        .map_err(|e| PulseError::MigrationFailed { reason: e.to_string() })?;

    info!("Migration to schema version 1 complete");
    Ok(())
}
