//! Observability infrastructure: tracing, metrics, health checks.

use crate::error::{PulseError, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod health;
pub mod metrics;

/// Initialize the global observability infrastructure.
///
/// Sets up structured logging (filtered by `RUST_LOG`, default INFO) and,
/// when `prometheus_addr` is configured, a Prometheus scrape endpoint.
///
/// This must be called once at daemon startup before any other operations.
pub fn init(prometheus_addr: Option<&str>) -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with(tracing_subscriber::fmt::layer().with_target(true).with_level(true))
        .init();

    if let Some(addr) = prometheus_addr {
        let addr: SocketAddr = addr.parse().map_err(|_| PulseError::InvalidConfig {
            reason: format!("Invalid Prometheus listen address: {}", addr),
        })?;

        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .map_err(|e| anyhow::anyhow!("Failed to start Prometheus exporter: {}", e))?;

        tracing::info!("Prometheus exporter listening on {}", addr);
    }

    metrics::register_core_metrics();

    Ok(())
}
