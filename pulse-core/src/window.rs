//! Rolling in-memory window of recent metric snapshots.
//!
//! The window is the authoritative short-term history behind the recent
//! query surface and the bootstrap payload for new live subscribers.
//! Entries are kept in timestamp order and aged out relative to the newest
//! accepted snapshot, so a stalled pipeline never silently empties it.

use crate::types::MetricSnapshot;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Point-in-time view of the window used to seed a live subscriber.
///
/// `last_seq` is the append sequence observed at capture time. Live events
/// carrying a sequence at or below it are already covered by `snapshots`,
/// which lets a subscriber splice bootstrap and live data without
/// duplicates or gaps.
#[derive(Debug, Clone)]
pub struct BootstrapView {
    /// Snapshots currently held, ascending by timestamp.
    pub snapshots: Vec<Arc<MetricSnapshot>>,
    /// Sequence assigned to the most recent append, 0 if none yet.
    pub last_seq: u64,
}

struct WindowInner {
    entries: VecDeque<Arc<MetricSnapshot>>,
    /// Monotone count of appends over the window's lifetime.
    appended: u64,
}

/// Bounded, timestamp-ordered buffer of the most recent snapshots.
pub struct RollingWindow {
    inner: RwLock<WindowInner>,
    retention_seconds: u64,
    max_entries: usize,
}

impl RollingWindow {
    pub fn new(retention_seconds: u64, max_entries: usize) -> Self {
        Self {
            inner: RwLock::new(WindowInner {
                entries: VecDeque::new(),
                appended: 0,
            }),
            retention_seconds,
            max_entries,
        }
    }

    /// Insert a snapshot in timestamp order, then evict anything that falls
    /// outside the retention span of the newest entry or over the size cap.
    ///
    /// Returns the append sequence together with the shared handle that is
    /// published to live subscribers. Snapshots sharing a timestamp keep
    /// arrival order.
    pub async fn append(&self, snapshot: MetricSnapshot) -> (u64, Arc<MetricSnapshot>) {
        let snapshot = Arc::new(snapshot);
        let mut inner = self.inner.write().await;

        inner.appended += 1;
        let seq = inner.appended;

        // Tail fast path: agents deliver in order almost always.
        let pos = match inner.entries.back() {
            Some(last) if last.timestamp <= snapshot.timestamp => inner.entries.len(),
            _ => inner
                .entries
                .partition_point(|e| e.timestamp <= snapshot.timestamp),
        };
        inner.entries.insert(pos, Arc::clone(&snapshot));

        let evicted = Self::evict_locked(&mut inner, self.retention_seconds, self.max_entries);
        if evicted > 0 {
            debug!(evicted, remaining = inner.entries.len(), "window eviction");
        }

        (seq, snapshot)
    }

    /// Snapshots currently within the window, ascending by timestamp.
    pub async fn recent(&self) -> Vec<Arc<MetricSnapshot>> {
        let inner = self.inner.read().await;
        inner.entries.iter().map(Arc::clone).collect()
    }

    /// Capture the window contents and the current append sequence in one
    /// consistent read.
    pub async fn bootstrap_view(&self) -> BootstrapView {
        let inner = self.inner.read().await;
        BootstrapView {
            snapshots: inner.entries.iter().map(Arc::clone).collect(),
            last_seq: inner.appended,
        }
    }

    /// Re-run eviction without appending. Ages nothing out on its own since
    /// retention is measured against the newest entry, but enforces the cap
    /// after a configuration reload shrinks it.
    pub async fn evict_expired(&self) -> usize {
        let mut inner = self.inner.write().await;
        Self::evict_locked(&mut inner, self.retention_seconds, self.max_entries)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.entries.is_empty()
    }

    fn evict_locked(inner: &mut WindowInner, retention_seconds: u64, max_entries: usize) -> usize {
        let newest = match inner.entries.back() {
            Some(snapshot) => snapshot.timestamp,
            None => return 0,
        };

        let cutoff = newest - retention_seconds as i64;
        let mut evicted = 0;
        while inner
            .entries
            .front()
            .map_or(false, |s| s.timestamp < cutoff)
        {
            inner.entries.pop_front();
            evicted += 1;
        }
        while inner.entries.len() > max_entries {
            inner.entries.pop_front();
            evicted += 1;
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MetricSnapshot;

    fn snapshot(timestamp: i64, cpu: f64) -> MetricSnapshot {
        MetricSnapshot {
            timestamp,
            total_cpu_percent: cpu,
            per_core_cpu_percent: vec![],
            system_memory_total_mb: 16384.0,
            system_memory_used_mb: 8192.0,
            top_processes: vec![],
        }
    }

    async fn timestamps(window: &RollingWindow) -> Vec<i64> {
        window.recent().await.iter().map(|s| s.timestamp).collect()
    }

    #[tokio::test]
    async fn appends_stay_ordered() {
        let window = RollingWindow::new(300, 100);
        for ts in [10, 20, 30] {
            window.append(snapshot(ts, 1.0)).await;
        }
        assert_eq!(timestamps(&window).await, vec![10, 20, 30]);
    }

    #[tokio::test]
    async fn late_arrival_inserts_in_order() {
        let window = RollingWindow::new(300, 100);
        for ts in [10, 30, 40] {
            window.append(snapshot(ts, 1.0)).await;
        }
        window.append(snapshot(20, 1.0)).await;
        assert_eq!(timestamps(&window).await, vec![10, 20, 30, 40]);
    }

    #[tokio::test]
    async fn equal_timestamps_keep_arrival_order() {
        let window = RollingWindow::new(300, 100);
        window.append(snapshot(10, 1.0)).await;
        window.append(snapshot(20, 2.0)).await;
        window.append(snapshot(20, 3.0)).await;

        let cpus: Vec<f64> = window
            .recent()
            .await
            .iter()
            .map(|s| s.total_cpu_percent)
            .collect();
        assert_eq!(cpus, vec![1.0, 2.0, 3.0]);
    }

    #[tokio::test]
    async fn eviction_is_relative_to_newest_entry() {
        let window = RollingWindow::new(50, 100);
        for ts in [0, 20, 40, 60] {
            window.append(snapshot(ts, 1.0)).await;
        }
        // Newest is 60, cutoff 10: the ts=0 entry ages out.
        assert_eq!(timestamps(&window).await, vec![20, 40, 60]);
    }

    #[tokio::test]
    async fn stale_arrival_can_be_evicted_immediately() {
        let window = RollingWindow::new(300, 100);
        window.append(snapshot(1000, 1.0)).await;
        window.append(snapshot(600, 1.0)).await;
        assert_eq!(timestamps(&window).await, vec![1000]);
    }

    #[tokio::test]
    async fn size_cap_drops_oldest() {
        let window = RollingWindow::new(10_000, 3);
        for ts in [1, 2, 3, 4, 5] {
            window.append(snapshot(ts, 1.0)).await;
        }
        assert_eq!(timestamps(&window).await, vec![3, 4, 5]);
    }

    #[tokio::test]
    async fn idle_window_does_not_age_out() {
        let window = RollingWindow::new(50, 100);
        window.append(snapshot(0, 1.0)).await;
        window.append(snapshot(40, 1.0)).await;

        // No new appends: nothing moves the newest edge, nothing expires.
        assert_eq!(window.evict_expired().await, 0);
        assert_eq!(timestamps(&window).await, vec![0, 40]);
    }

    #[tokio::test]
    async fn bootstrap_view_tracks_append_sequence() {
        let window = RollingWindow::new(300, 100);
        assert_eq!(window.bootstrap_view().await.last_seq, 0);

        window.append(snapshot(10, 1.0)).await;
        let (seq, _) = window.append(snapshot(20, 1.0)).await;
        assert_eq!(seq, 2);

        let view = window.bootstrap_view().await;
        assert_eq!(view.last_seq, 2);
        assert_eq!(view.snapshots.len(), 2);
    }

    #[tokio::test]
    async fn sequence_survives_eviction() {
        let window = RollingWindow::new(10_000, 1);
        window.append(snapshot(1, 1.0)).await;
        window.append(snapshot(2, 1.0)).await;
        let (seq, _) = window.append(snapshot(3, 1.0)).await;

        // Capped to one entry, yet the sequence keeps counting appends.
        assert_eq!(seq, 3);
        assert_eq!(window.len().await, 1);
    }
}
