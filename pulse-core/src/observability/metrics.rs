//! Core metrics definitions.
//!
//! All metrics follow Prometheus naming conventions:
//! - `_total` suffix for counters
//! - plain nouns for gauges measuring current state

use metrics::{counter, describe_counter, describe_gauge, gauge};

/// Register all core metrics with descriptions.
///
/// This ensures metrics appear in `/metrics` with proper metadata.
pub fn register_core_metrics() {
    // Ingest metrics
    describe_counter!("pulse_ingest_accepted_total", "Total snapshots admitted to the pipeline");
    describe_counter!("pulse_ingest_rejected_total", "Total ingest rejections (by reason)");

    // Rolling window metrics
    describe_gauge!("pulse_window_entries", "Current number of snapshots in the rolling window");

    // Live stream metrics
    describe_gauge!("pulse_live_subscribers", "Current number of live stream subscribers");
    describe_counter!(
        "pulse_live_events_dropped_total",
        "Total live events dropped for lagging subscribers"
    );

    // Alert metrics
    describe_counter!("pulse_alert_events_total", "Total alert transitions (by rule, state)");

    // Database metrics
    describe_counter!("pulse_db_errors_total", "Total database failures (by operation)");
    describe_counter!("pulse_rows_pruned_total", "Total rows removed by retention sweeps");
}

/// Helper functions for common metric patterns
pub fn record_ingest_accepted() {
    counter!("pulse_ingest_accepted_total").increment(1);
}

pub fn record_ingest_rejected(reason: &str) {
    counter!("pulse_ingest_rejected_total", "reason" => reason.to_string()).increment(1);
}

pub fn set_window_entries(count: usize) {
    gauge!("pulse_window_entries").set(count as f64);
}

pub fn set_live_subscribers(count: usize) {
    gauge!("pulse_live_subscribers").set(count as f64);
}
