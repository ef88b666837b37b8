//! Alert domain types.

use crate::types::MetricSnapshot;
use serde::{Deserialize, Serialize};

/// Lifecycle state carried by an alert event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertState {
    /// Sustained condition reached the configured duration
    Triggered,

    /// A snapshot failed the condition while the rule was triggered
    Resolved,
}

impl std::fmt::Display for AlertState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Triggered => write!(f, "triggered"),
            Self::Resolved => write!(f, "resolved"),
        }
    }
}

/// Metric a rule evaluates against each snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertMetric {
    /// Whole-system CPU utilization
    TotalCpuPercent,

    /// Used memory as a percentage of total
    MemoryUsedPercent,
}

impl AlertMetric {
    /// Extract this metric's value from a snapshot.
    pub fn value_of(&self, snapshot: &MetricSnapshot) -> f64 {
        match self {
            Self::TotalCpuPercent => snapshot.total_cpu_percent,
            Self::MemoryUsedPercent => snapshot.memory_used_percent(),
        }
    }
}

impl std::fmt::Display for AlertMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TotalCpuPercent => write!(f, "total_cpu_percent"),
            Self::MemoryUsedPercent => write!(f, "memory_used_percent"),
        }
    }
}

/// One alert lifecycle transition emitted by the alert engine.
///
/// Events are immutable once emitted; resolution is a new event, not an
/// update of the triggered one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    /// Name of the rule that transitioned
    pub rule_name: String,

    /// Transition kind
    pub state: AlertState,

    /// Metric value that caused the transition
    pub value: f64,

    /// Configured rule threshold
    pub threshold: f64,

    /// Snapshot timestamp at which the transition occurred (epoch seconds)
    pub occurred_at: i64,

    /// For `triggered`: the configured sustained duration. For `resolved`:
    /// seconds the alert had been active.
    pub duration_seconds: u64,
}
