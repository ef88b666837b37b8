//! The ingest pipeline.
//!
//! One admitted snapshot flows validation, gate, rolling window, alert
//! engine, then live fanout, with the durable write handed off to a
//! background task. A rejection at any stage leaves every downstream
//! stage untouched.

use crate::alerts::AlertEngine;
use crate::config::Config;
use crate::error::{PulseError, Result};
use crate::gate::AdmissionGate;
use crate::hub::{LiveEvent, LiveHub};
use crate::observability::metrics as obs;
use crate::storage::DurableStore;
use crate::types::MetricSnapshot;
use crate::window::RollingWindow;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, instrument, warn};

/// Acknowledgement for an admitted snapshot.
#[derive(Debug, Clone, Copy)]
pub struct IngestReceipt {
    /// The agent timestamp the snapshot carried.
    pub timestamp: i64,
    /// Window append sequence assigned to the snapshot.
    pub seq: u64,
}

/// Orchestrates the path of a snapshot from the wire to subscribers.
pub struct IngestPipeline {
    gate: AdmissionGate,
    window: RollingWindow,
    alerts: AlertEngine,
    hub: LiveHub,
    store: Option<Arc<dyn DurableStore>>,
}

impl IngestPipeline {
    /// Build a pipeline from configuration. `store` is `None` when
    /// persistence is disabled.
    pub fn new(config: &Config, store: Option<Arc<dyn DurableStore>>) -> Self {
        Self {
            gate: AdmissionGate::new(
                config.ingest.shared_token.clone(),
                config.ingest.rate_limit_per_minute,
            ),
            window: RollingWindow::new(config.window.retention_seconds, config.window.max_entries),
            alerts: AlertEngine::new(config.alerts.rules.clone()),
            hub: LiveHub::new(),
            store,
        }
    }

    /// Run one snapshot through the pipeline.
    ///
    /// `source` identifies the submitting agent for rate limiting. On
    /// success the snapshot is in the window, rules have been evaluated,
    /// live events are published, and the durable write is in flight.
    #[instrument(skip(self, snapshot), fields(source = %source, timestamp = snapshot.timestamp))]
    pub async fn ingest(
        &self,
        token: Option<&str>,
        source: &str,
        snapshot: MetricSnapshot,
    ) -> Result<IngestReceipt> {
        if let Err(e) = snapshot.validate() {
            debug!(error = %e, "rejected ingest: invalid snapshot");
            obs::record_ingest_rejected(rejection_reason(&e));
            return Err(e);
        }

        if let Err(e) = self.gate.admit(token, source).await {
            obs::record_ingest_rejected(rejection_reason(&e));
            return Err(e);
        }

        let timestamp = snapshot.timestamp;
        let (seq, shared) = self.window.append(snapshot).await;
        obs::set_window_entries(self.window.len().await);

        let alert_events = self.alerts.evaluate(&shared).await;

        if let Some(store) = &self.store {
            let store = Arc::clone(store);
            let snapshot = Arc::clone(&shared);
            let recorded_at = SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs() as i64;
            tokio::spawn(async move {
                if let Err(e) = store.insert_snapshot(recorded_at, &snapshot).await {
                    warn!(error = %e, "snapshot write failed, continuing without persistence");
                }
            });
        }

        // Subscribers see the snapshot before any alert it caused.
        self.hub.publish(LiveEvent::Snapshot { seq, snapshot: shared });
        for event in alert_events {
            self.hub.publish(LiveEvent::Alert(event));
        }

        obs::record_ingest_accepted();
        Ok(IngestReceipt { timestamp, seq })
    }

    pub fn window(&self) -> &RollingWindow {
        &self.window
    }

    pub fn hub(&self) -> &LiveHub {
        &self.hub
    }

    pub fn alerts(&self) -> &AlertEngine {
        &self.alerts
    }

    pub fn store(&self) -> Option<&Arc<dyn DurableStore>> {
        self.store.as_ref()
    }
}

fn rejection_reason(err: &PulseError) -> &'static str {
    match err {
        PulseError::Unauthorized => "unauthorized",
        PulseError::RateLimited { .. } => "rate_limited",
        PulseError::Validation { .. } => "invalid",
        _ => "other",
    }
}
