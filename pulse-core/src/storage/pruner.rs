//! Background retention enforcement.

use crate::storage::DurableStore;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

const SECONDS_PER_DAY: i64 = 86_400;

/// Periodically deletes rows older than the retention horizon.
///
/// A failed sweep is logged and retried on the next tick; the pruner never
/// exits on storage errors, only on shutdown.
pub struct RetentionPruner {
    store: Arc<dyn DurableStore>,
    retention_days: u32,
    interval: Duration,
}

impl RetentionPruner {
    pub fn new(store: Arc<dyn DurableStore>, retention_days: u32, interval_seconds: u64) -> Self {
        Self {
            store,
            retention_days,
            interval: Duration::from_secs(interval_seconds),
        }
    }

    /// Run the sweep loop until a shutdown signal arrives. The first sweep
    /// happens immediately, which clears out rows accumulated while the
    /// daemon was down.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            retention_days = self.retention_days,
            interval_seconds = self.interval.as_secs(),
            "Retention pruner started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep().await;
                }
                _ = shutdown.recv() => {
                    info!("Retention pruner shutting down");
                    return;
                }
            }
        }
    }

    async fn sweep(&self) {
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;
        let cutoff = now - self.retention_days as i64 * SECONDS_PER_DAY;

        match self.store.prune_older_than(cutoff).await {
            Ok(removed) if removed > 0 => {
                debug!(removed, cutoff, "pruned expired metric rows");
                metrics::counter!("pulse_rows_pruned_total").increment(removed);
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "retention sweep failed, retrying next tick");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{PulseError, Result};
    use crate::types::MetricSnapshot;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingStore {
        sweeps: AtomicU32,
        fail: bool,
    }

    #[async_trait]
    impl DurableStore for CountingStore {
        async fn insert_snapshot(&self, _: i64, _: &MetricSnapshot) -> Result<()> {
            Ok(())
        }

        async fn prune_older_than(&self, _cutoff: i64) -> Result<u64> {
            self.sweeps.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(PulseError::StorageDegraded { reason: "disk unhappy".to_string() })
            } else {
                Ok(3)
            }
        }

        async fn ping(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sweeps_on_schedule_and_stops_on_shutdown() {
        let store = Arc::new(CountingStore { sweeps: AtomicU32::new(0), fail: false });
        let pruner = RetentionPruner::new(store.clone(), 7, 3600);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let handle = tokio::spawn(pruner.run(shutdown_rx));

        // Immediate first sweep, then one per interval.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(store.sweeps.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(store.sweeps.load(Ordering::SeqCst), 2);

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_failure_retries_next_tick() {
        let store = Arc::new(CountingStore { sweeps: AtomicU32::new(0), fail: true });
        let pruner = RetentionPruner::new(store.clone(), 7, 60);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let handle = tokio::spawn(pruner.run(shutdown_rx));

        tokio::time::sleep(Duration::from_secs(130)).await;
        // Pruner survived two failing sweeps after the initial one.
        assert!(store.sweeps.load(Ordering::SeqCst) >= 3);

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
