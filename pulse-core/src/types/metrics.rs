//! Metric snapshot domain types.

use crate::error::{PulseError, Result};
use serde::{Deserialize, Serialize};

/// Maximum number of processes an agent may report per snapshot.
pub const MAX_TOP_PROCESSES: usize = 12;

/// Slack allowed on `system_memory_used_mb` above the reported total.
///
/// Agents sample total and used memory at slightly different instants, so a
/// small overshoot is not treated as malformed.
pub const MEMORY_USED_TOLERANCE_MB: f64 = 64.0;

/// One system-metrics sample pushed by a collector agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    /// Sample time in epoch seconds (agent clock)
    pub timestamp: i64,

    /// Whole-system CPU utilization, 0-100
    pub total_cpu_percent: f64,

    /// Per-core CPU utilization, 0-100 each; empty if the agent
    /// does not support per-core sampling
    #[serde(default)]
    pub per_core_cpu_percent: Vec<f64>,

    /// Total physical memory in megabytes
    pub system_memory_total_mb: f64,

    /// Used physical memory in megabytes
    pub system_memory_used_mb: f64,

    /// Heaviest processes, sorted by cpu_percent descending then
    /// memory_mb descending
    #[serde(default)]
    pub top_processes: Vec<ProcessSample>,
}

/// Per-process resource usage within a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessSample {
    /// Process identifier
    pub pid: u32,

    /// Executable name, never empty
    pub name: String,

    /// Process CPU utilization
    pub cpu_percent: f64,

    /// Resident memory in megabytes
    pub memory_mb: f64,

    /// Thread count
    #[serde(default)]
    pub thread_count: u32,

    /// Cumulative read I/O in megabytes
    #[serde(default)]
    pub io_read_mb: f64,

    /// Cumulative write I/O in megabytes
    #[serde(default)]
    pub io_write_mb: f64,

    /// Open handle count
    #[serde(default)]
    pub handle_count: u32,
}

impl MetricSnapshot {
    /// Validate field bounds before the snapshot enters the pipeline.
    ///
    /// Rejected snapshots never reach the window store, alert engine,
    /// or broadcaster.
    pub fn validate(&self) -> Result<()> {
        if self.timestamp < 0 {
            return Err(PulseError::validation("timestamp must be non-negative"));
        }
        if !self.total_cpu_percent.is_finite()
            || !(0.0..=100.0).contains(&self.total_cpu_percent)
        {
            return Err(PulseError::validation(format!(
                "total_cpu_percent out of range: {}",
                self.total_cpu_percent
            )));
        }
        for (core, pct) in self.per_core_cpu_percent.iter().enumerate() {
            if !pct.is_finite() || !(0.0..=100.0).contains(pct) {
                return Err(PulseError::validation(format!(
                    "per_core_cpu_percent[{}] out of range: {}",
                    core, pct
                )));
            }
        }
        if !self.system_memory_total_mb.is_finite() || self.system_memory_total_mb < 0.0 {
            return Err(PulseError::validation(format!(
                "system_memory_total_mb out of range: {}",
                self.system_memory_total_mb
            )));
        }
        if !self.system_memory_used_mb.is_finite() || self.system_memory_used_mb < 0.0 {
            return Err(PulseError::validation(format!(
                "system_memory_used_mb out of range: {}",
                self.system_memory_used_mb
            )));
        }
        if self.system_memory_used_mb > self.system_memory_total_mb + MEMORY_USED_TOLERANCE_MB {
            return Err(PulseError::validation(format!(
                "system_memory_used_mb {} exceeds total {}",
                self.system_memory_used_mb, self.system_memory_total_mb
            )));
        }
        if self.top_processes.len() > MAX_TOP_PROCESSES {
            return Err(PulseError::validation(format!(
                "top_processes has {} entries, maximum is {}",
                self.top_processes.len(),
                MAX_TOP_PROCESSES
            )));
        }
        for process in &self.top_processes {
            process.validate()?;
        }
        Ok(())
    }

    /// Used memory as a percentage of total, 0 when total is unreported.
    pub fn memory_used_percent(&self) -> f64 {
        if self.system_memory_total_mb <= 0.0 {
            return 0.0;
        }
        (self.system_memory_used_mb / self.system_memory_total_mb) * 100.0
    }
}

impl ProcessSample {
    /// Validate per-process field bounds.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(PulseError::validation(format!(
                "process {} has an empty name",
                self.pid
            )));
        }
        for (field, value) in [
            ("cpu_percent", self.cpu_percent),
            ("memory_mb", self.memory_mb),
            ("io_read_mb", self.io_read_mb),
            ("io_write_mb", self.io_write_mb),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(PulseError::validation(format!(
                    "process {} has invalid {}: {}",
                    self.pid, field, value
                )));
            }
        }
        Ok(())
    }
}
