//! Ingest admission: shared-token auth and per-source rate limiting.

use crate::error::{PulseError, Result};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Length of the rolling rate-limit window.
const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Admission gate in front of the ingest pipeline.
///
/// Checks run in order: token auth, then the per-source rolling rate
/// ceiling. Rejections are side-effect-free: neither an unauthorized nor an
/// over-limit attempt consumes a rate-window slot, so a rejected caller
/// cannot extend its own lockout. Gate state is bounded: sources whose
/// slots have all aged out are dropped on the next admission check.
pub struct AdmissionGate {
    shared_token: Option<String>,
    limit_per_window: u32,
    admissions: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl AdmissionGate {
    pub fn new(shared_token: Option<String>, limit_per_window: u32) -> Self {
        Self {
            shared_token,
            limit_per_window,
            admissions: Mutex::new(HashMap::new()),
        }
    }

    /// Admit or reject one ingest attempt from `source`.
    pub async fn admit(&self, token: Option<&str>, source: &str) -> Result<()> {
        if let Some(expected) = &self.shared_token {
            if token != Some(expected.as_str()) {
                warn!(source, "rejected ingest: bad or missing agent token");
                return Err(PulseError::Unauthorized);
            }
        }
        self.check_rate(source, Instant::now()).await
    }

    async fn check_rate(&self, source: &str, now: Instant) -> Result<()> {
        let mut admissions = self.admissions.lock().await;

        // Slide every window, dropping sources that have gone idle so the
        // map never accumulates entries for agents that stopped reporting.
        admissions.retain(|_, window| {
            while let Some(oldest) = window.front() {
                if now.duration_since(*oldest) >= RATE_WINDOW {
                    window.pop_front();
                } else {
                    break;
                }
            }
            !window.is_empty()
        });

        let window = admissions.entry(source.to_string()).or_default();
        if window.len() >= self.limit_per_window as usize {
            debug!(source, limit = self.limit_per_window, "rejected ingest: rate ceiling reached");
            return Err(PulseError::RateLimited { peer: source.to_string() });
        }

        window.push_back(now);
        Ok(())
    }
}
