//! Durable snapshot storage backed by SQLite.
//!
//! Persistence is best effort: the live pipeline never waits on the
//! database, and a failing or missing store must not take ingest down.
//! The daemon hands writes to this layer fire-and-forget and a background
//! pruner enforces the retention policy.

use crate::error::{PulseError, Result};
use crate::types::MetricSnapshot;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{ConnectOptions, Row};
use std::path::Path;
use std::str::FromStr;
use tracing::{info, instrument};

pub mod migrations;
pub mod pruner;


/// Write-side interface of the durable store.
///
/// The pipeline and pruner talk to this trait, which keeps them testable
/// against recording or failing stores. Ingest must stay available no
/// matter what the database does.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Persist one admitted snapshot. `recorded_at` is server receive time
    /// in epoch seconds, distinct from the agent's own timestamp.
    async fn insert_snapshot(&self, recorded_at: i64, snapshot: &MetricSnapshot) -> Result<()>;

    /// Delete rows recorded before `cutoff`. Returns the number removed.
    async fn prune_older_than(&self, cutoff: i64) -> Result<u64>;

    /// Cheap connectivity probe for health reporting.
    async fn ping(&self) -> Result<()>;
}

/// SQLite-backed metrics store.
#[derive(Clone)]
pub struct SqliteMetricsStore {
    pool: SqlitePool,
}

impl SqliteMetricsStore {
    /// Create a store with an in-memory database (for tests).
    pub async fn new_in_memory() -> Result<Self> {
        Self::new(":memory:").await
    }

    /// Get a reference to the underlying SQLite pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create a store with a database at the specified path. The file and
    /// its schema are created on first use.
    #[instrument(skip(db_path))]
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        info!("Opening metrics store at {:?}", db_path);

        // Create parent directory if it doesn't exist (but not for :memory:)
        if db_path != Path::new(":memory:") {
            if let Some(parent) = db_path.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    PulseError::InvalidConfig {
                        reason: format!("Failed to create directory {}: {}", parent.display(), e),
                    }
                })?;
            }
        }

        let mut options = SqliteConnectOptions::from_str(db_path.to_str().ok_or_else(|| {
            PulseError::InvalidConfig { reason: "Invalid database path".to_string() }
        })?)
        .map_err(|e| PulseError::DatabaseError(e.to_string()))?;

        options = options.create_if_missing(true).log_statements(tracing::log::LevelFilter::Debug);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| PulseError::DatabaseError(e.to_string()))?;

        let store = Self { pool };
        migrations::run(&store.pool).await?;

        info!("Metrics store ready");
        Ok(store)
    }

    /// Most recently recorded snapshots, newest first. Rows with JSON
    /// columns that no longer parse are returned with those fields empty
    /// rather than failing the whole read.
    #[instrument(skip(self))]
    pub async fn fetch_recent(&self, limit: u32) -> Result<Vec<MetricSnapshot>> {
        let rows = sqlx::query(
            "SELECT * FROM metrics_history ORDER BY recorded_at DESC, id DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PulseError::DatabaseError(e.to_string()))?;

        Ok(rows.into_iter().map(row_to_snapshot).collect())
    }
}

fn row_to_snapshot(row: sqlx::sqlite::SqliteRow) -> MetricSnapshot {
    let per_core_json: String = row.get("per_core_cpu_percent");
    let per_core_cpu_percent = serde_json::from_str(&per_core_json).unwrap_or_default();

    let processes_json: String = row.get("top_processes");
    let top_processes = serde_json::from_str(&processes_json).unwrap_or_default();

    MetricSnapshot {
        timestamp: row.get("timestamp"),
        total_cpu_percent: row.get("total_cpu_percent"),
        per_core_cpu_percent,
        system_memory_total_mb: row.get("system_memory_total_mb"),
        system_memory_used_mb: row.get("system_memory_used_mb"),
        top_processes,
    }
}

#[async_trait]
impl DurableStore for SqliteMetricsStore {
    #[instrument(skip(self, snapshot), fields(timestamp = snapshot.timestamp))]
    async fn insert_snapshot(&self, recorded_at: i64, snapshot: &MetricSnapshot) -> Result<()> {
        let per_core_json = serde_json::to_string(&snapshot.per_core_cpu_percent).map_err(|e| {
            PulseError::StorageDegraded { reason: format!("Failed to serialize per-core list: {}", e) }
        })?;

        let processes_json = serde_json::to_string(&snapshot.top_processes).map_err(|e| {
            PulseError::StorageDegraded { reason: format!("Failed to serialize process list: {}", e) }
        })?;

        sqlx::query(
            r#"
            INSERT INTO metrics_history (recorded_at, timestamp, total_cpu_percent, per_core_cpu_percent, system_memory_total_mb, system_memory_used_mb, top_processes)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(recorded_at)
        .bind(snapshot.timestamp)
        .bind(snapshot.total_cpu_percent)
        .bind(per_core_json)
        .bind(snapshot.system_memory_total_mb)
        .bind(snapshot.system_memory_used_mb)
        .bind(processes_json)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            metrics::counter!("pulse_db_errors_total", "operation" => "insert").increment(1);
            PulseError::StorageDegraded { reason: e.to_string() }
        })?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn prune_older_than(&self, cutoff: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM metrics_history WHERE recorded_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                metrics::counter!("pulse_db_errors_total", "operation" => "prune").increment(1);
                PulseError::StorageDegraded { reason: e.to_string() }
            })?;

        Ok(result.rows_affected())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| PulseError::DatabaseError(e.to_string()))?;
        Ok(())
    }
}
