//! Live fanout hub for admitted snapshots and alert transitions.
//!
//! Publishing never blocks on subscribers. Each subscriber owns a bounded
//! ring; when it falls behind, the oldest undelivered events are dropped
//! and the subscriber keeps its place in the stream. Delivery is
//! at-most-once from the point of subscription.
//!
//! # Example
//!
//! ```ignore
//! let hub = LiveHub::new();
//! let mut rx = hub.subscribe();
//!
//! hub.publish(LiveEvent::Snapshot { seq, snapshot });
//!
//! while let Some(event) = rx.recv().await? {
//!     println!("Received: {:?}", event);
//! }
//! ```

use crate::error::{PulseError, Result};
use crate::types::{AlertEvent, MetricSnapshot};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Maximum number of events buffered per subscriber.
const LIVE_BUFFER_SIZE: usize = 256;

/// An event on the live stream.
#[derive(Debug, Clone)]
pub enum LiveEvent {
    /// A snapshot admitted to the rolling window. `seq` is the window's
    /// append sequence, used to splice against a bootstrap view.
    Snapshot {
        seq: u64,
        snapshot: Arc<MetricSnapshot>,
    },
    /// An alert transition from the rule engine.
    Alert(AlertEvent),
}

/// Hub for publishing and subscribing to the live stream.
#[derive(Clone)]
pub struct LiveHub {
    sender: broadcast::Sender<LiveEvent>,
}

impl LiveHub {
    pub fn new() -> Self {
        Self::with_capacity(LIVE_BUFFER_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: LiveEvent) {
        // Ignore send errors (no subscribers)
        let _ = self.sender.send(event);
        metrics::gauge!("pulse_live_subscribers").set(self.sender.receiver_count() as f64);
    }

    /// Subscribe to the live stream starting from this point.
    pub fn subscribe(&self) -> LiveSubscriber {
        LiveSubscriber {
            receiver: self.sender.subscribe(),
        }
    }

    /// Get the number of current subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for LiveHub {
    fn default() -> Self {
        Self::new()
    }
}

/// A subscriber's end of the live stream.
pub struct LiveSubscriber {
    receiver: broadcast::Receiver<LiveEvent>,
}

impl LiveSubscriber {
    /// Receive the next live event.
    ///
    /// `Ok(None)` means the hub shut down. A subscriber that fell behind
    /// gets `BroadcastDropped` once with the number of events it missed;
    /// the next call resumes from the oldest event still buffered.
    pub async fn recv(&mut self) -> Result<Option<LiveEvent>> {
        match self.receiver.recv().await {
            Ok(event) => Ok(Some(event)),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                metrics::counter!("pulse_live_events_dropped_total").increment(skipped);
                Err(PulseError::BroadcastDropped { skipped })
            }
            Err(broadcast::error::RecvError::Closed) => Ok(None),
        }
    }
}
