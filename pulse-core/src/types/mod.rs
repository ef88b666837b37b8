//! Core domain types for pulse.

pub mod alert;
pub mod metrics;

// Re-exports
pub use alert::{AlertEvent, AlertMetric, AlertState};
pub use metrics::{MetricSnapshot, ProcessSample};
