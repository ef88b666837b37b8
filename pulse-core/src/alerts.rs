//! Threshold alert engine.
//!
//! Rules fire when a metric stays at or above its threshold for a sustained
//! duration. Time is measured on snapshot timestamps, not wall clock, so
//! the engine's view of "now" is the data stream itself: a gap in delivery
//! neither clears a pending breach nor resolves a firing alert. A firing
//! alert resolves on the first snapshot where the condition no longer
//! holds.

use crate::config::AlertRuleConfig;
use crate::types::{AlertEvent, AlertState, MetricSnapshot};
use std::collections::VecDeque;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Maximum number of alert transitions kept for the recent-events query.
const ALERT_HISTORY_SIZE: usize = 256;

struct RuleSlot {
    rule: AlertRuleConfig,
    /// Timestamp of the first snapshot in the current breach run, if any.
    true_since: Option<i64>,
    /// Timestamp the rule last entered the firing state. `Some` means firing.
    triggered_at: Option<i64>,
}

struct EngineState {
    rules: Vec<RuleSlot>,
    history: VecDeque<AlertEvent>,
    last_evaluated: Option<i64>,
}

/// Evaluates every configured rule against each admitted snapshot.
pub struct AlertEngine {
    state: Mutex<EngineState>,
}

impl AlertEngine {
    pub fn new(rules: Vec<AlertRuleConfig>) -> Self {
        let rules = rules
            .into_iter()
            .map(|rule| RuleSlot {
                rule,
                true_since: None,
                triggered_at: None,
            })
            .collect();
        Self {
            state: Mutex::new(EngineState {
                rules,
                history: VecDeque::new(),
                last_evaluated: None,
            }),
        }
    }

    /// Evaluate all rules against one snapshot and return the transitions
    /// it caused, in rule order.
    ///
    /// Snapshots older than the last evaluated timestamp are ignored; they
    /// still enter the rolling window but must not rewind rule state.
    pub async fn evaluate(&self, snapshot: &MetricSnapshot) -> Vec<AlertEvent> {
        let mut state = self.state.lock().await;

        if let Some(last) = state.last_evaluated {
            if snapshot.timestamp < last {
                debug!(
                    timestamp = snapshot.timestamp,
                    last, "ignoring out-of-order snapshot for alerting"
                );
                return Vec::new();
            }
        }
        state.last_evaluated = Some(snapshot.timestamp);

        let mut events = Vec::new();
        for slot in &mut state.rules {
            let value = slot.rule.metric.value_of(snapshot);
            let breached = value >= slot.rule.threshold;

            match (slot.triggered_at, breached) {
                (None, true) => {
                    let since = *slot.true_since.get_or_insert(snapshot.timestamp);
                    if snapshot.timestamp - since >= slot.rule.duration_seconds as i64 {
                        slot.triggered_at = Some(snapshot.timestamp);
                        info!(
                            rule = %slot.rule.name,
                            value,
                            threshold = slot.rule.threshold,
                            "alert triggered"
                        );
                        events.push(AlertEvent {
                            rule_name: slot.rule.name.clone(),
                            state: AlertState::Triggered,
                            value,
                            threshold: slot.rule.threshold,
                            occurred_at: snapshot.timestamp,
                            duration_seconds: slot.rule.duration_seconds,
                        });
                    }
                }
                (None, false) => {
                    // Breach run broken before it reached the sustain
                    // duration; the clock starts over.
                    slot.true_since = None;
                }
                (Some(_), true) => {
                    // Still firing, nothing to emit.
                }
                (Some(triggered_at), false) => {
                    slot.triggered_at = None;
                    slot.true_since = None;
                    let active = (snapshot.timestamp - triggered_at).max(0) as u64;
                    info!(rule = %slot.rule.name, value, active_seconds = active, "alert resolved");
                    events.push(AlertEvent {
                        rule_name: slot.rule.name.clone(),
                        state: AlertState::Resolved,
                        value,
                        threshold: slot.rule.threshold,
                        occurred_at: snapshot.timestamp,
                        duration_seconds: active,
                    });
                }
            }
        }

        for event in &events {
            metrics::counter!(
                "pulse_alert_events_total",
                "rule" => event.rule_name.clone(),
                "state" => event.state.to_string()
            )
            .increment(1);
            state.history.push_back(event.clone());
            if state.history.len() > ALERT_HISTORY_SIZE {
                state.history.pop_front();
            }
        }

        events
    }

    /// Recent alert transitions, oldest first.
    pub async fn recent_events(&self) -> Vec<AlertEvent> {
        let state = self.state.lock().await;
        state.history.iter().cloned().collect()
    }
}
