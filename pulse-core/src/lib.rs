//! Pulse Core Library
//!
//! Shared pipeline, storage, and configuration for the Pulse system
//! metrics backend.

pub mod alerts;
pub mod config;
pub mod error;
pub mod gate;
pub mod hub;
pub mod ingest;
pub mod observability;
pub mod paths;
pub mod storage;
pub mod types;
pub mod window;

// Re-export commonly used items
pub use alerts::AlertEngine;
pub use config::Config;
pub use error::{PulseError, Result};
pub use hub::{LiveEvent, LiveHub, LiveSubscriber};
pub use ingest::{IngestPipeline, IngestReceipt};
pub use observability::{health::HealthChecker, init as init_observability};
pub use storage::{DurableStore, SqliteMetricsStore};
pub use types::{AlertEvent, AlertMetric, AlertState, MetricSnapshot, ProcessSample};
pub use window::{BootstrapView, RollingWindow};
