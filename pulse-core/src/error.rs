//! Error types for pulse.
//!
//! All errors use `thiserror` for ergonomic error handling and proper error chains.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for pulse operations.
pub type Result<T> = std::result::Result<T, PulseError>;

/// Main error type for pulse.
#[derive(Error, Debug)]
pub enum PulseError {
    // Ingest admission errors
    #[error("Invalid snapshot: {reason}")]
    Validation { reason: String },

    #[error("Missing or invalid agent token")]
    Unauthorized,

    #[error("Rate limit exceeded for source {peer}")]
    RateLimited { peer: String },

    // Live fanout errors
    #[error("Subscriber lagged, {skipped} event(s) dropped")]
    BroadcastDropped { skipped: u64 },

    // Durable storage errors
    #[error("Durable store degraded: {reason}")]
    StorageDegraded { reason: String },

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Database migration failed: {reason}")]
    MigrationFailed { reason: String },

    // Configuration errors
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("I/O error at {path:?}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PulseError {
    /// Create a Validation error from any displayable reason.
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation { reason: reason.into() }
    }
}
