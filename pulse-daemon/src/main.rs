use pulse_core::observability::health::HealthStatus;
use pulse_core::storage::pruner::RetentionPruner;
use pulse_core::{
    init_observability, Config, DurableStore, HealthChecker, IngestPipeline, SqliteMetricsStore,
};
use std::sync::Arc;
use tracing::{error, info};

mod api;
mod shutdown;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Config is loaded before observability so the init can see the
    // exporter address; nothing before this point logs.
    let mut config = match std::env::var("PULSE_CONFIG") {
        Ok(path) => Config::load_from(path)?,
        Err(_) => Config::load()?,
    };
    apply_env_overrides(&mut config);

    // Initialize observability FIRST
    init_observability(config.server.prometheus_addr.as_deref())?;

    info!("pulse daemon starting");

    let health_checker = HealthChecker::new();
    health_checker.register_subsystem("storage".to_string()).await;

    let store = open_store(&config, &health_checker).await;

    let pipeline = Arc::new(IngestPipeline::new(&config, store.clone()));

    let shutdown = shutdown::ShutdownManager::new();

    if let Some(store) = store {
        let pruner = RetentionPruner::new(
            store,
            config.storage.retention_days,
            config.storage.prune_interval_seconds,
        );
        tokio::spawn(pruner.run(shutdown.subscribe()));
    }

    let state = Arc::new(api::AppState {
        pipeline,
        health: health_checker,
        storage_configured: config.storage.database_path.is_some(),
    });

    info!(listen_addr = %config.server.listen_addr, "pulse daemon ready");

    // Serves until the shutdown broadcast fires, then drains.
    api::start_api_server(config.server.listen_addr.clone(), state, shutdown.subscribe()).await?;

    info!("pulse daemon stopped");
    Ok(())
}

/// Environment variables override the file-based configuration.
fn apply_env_overrides(config: &mut Config) {
    if let Ok(addr) = std::env::var("PULSE_LISTEN_ADDR") {
        config.server.listen_addr = addr;
    }
    if let Ok(token) = std::env::var("PULSE_INGEST_TOKEN") {
        config.ingest.shared_token = Some(token);
    }
    if let Ok(path) = std::env::var("PULSE_DB_PATH") {
        config.storage.database_path = Some(path.into());
    }
}

/// Open the durable store, degrading to memory-only on failure.
///
/// An unreachable database must never keep the ingest surface from
/// starting; the health endpoint carries the degradation instead.
async fn open_store(config: &Config, health: &HealthChecker) -> Option<Arc<dyn DurableStore>> {
    let Some(db_path) = config.storage.database_path.clone() else {
        info!("no database path configured, durable storage disabled");
        health
            .update_subsystem("storage", HealthStatus::Healthy, Some("disabled".to_string()))
            .await;
        return None;
    };

    info!(path = %db_path.display(), "opening metrics store");
    match SqliteMetricsStore::new(&db_path).await {
        Ok(store) => Some(Arc::new(store) as Arc<dyn DurableStore>),
        Err(e) => {
            error!(error = %e, "metrics store unavailable, running without persistence");
            health
                .update_subsystem(
                    "storage",
                    HealthStatus::Degraded,
                    Some(format!("unavailable: {}", e)),
                )
                .await;
            None
        }
    }
}
