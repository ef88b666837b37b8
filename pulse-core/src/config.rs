//! Configuration management.

use crate::error::{PulseError, Result};
use crate::paths;
use crate::types::AlertMetric;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Persistent configuration for the pulse backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub ingest: IngestConfig,
    pub window: WindowConfig,
    pub alerts: AlertsConfig,
    pub storage: StorageConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP/WebSocket server binds to
    pub listen_addr: String,

    /// Prometheus exporter listen address; None disables the exporter
    pub prometheus_addr: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8000".to_string(),
            prometheus_addr: None,
        }
    }
}

/// Ingest admission settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Shared agent token; None disables token auth
    pub shared_token: Option<String>,

    /// Per-source ceiling over a rolling 60-second window
    pub rate_limit_per_minute: u32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            shared_token: None,
            rate_limit_per_minute: 120, // one agent at 2 Hz
        }
    }
}

/// In-memory rolling window settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Age bound relative to the newest accepted snapshot
    pub retention_seconds: u64,

    /// Absolute entry cap, a safety bound on top of age eviction
    pub max_entries: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            retention_seconds: 300, // 5 minutes
            max_entries: 4096,
        }
    }
}

/// Alert engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    pub rules: Vec<AlertRuleConfig>,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            rules: vec![AlertRuleConfig {
                name: "high_cpu".to_string(),
                metric: AlertMetric::TotalCpuPercent,
                threshold: 90.0,
                duration_seconds: 10,
            }],
        }
    }
}

/// One threshold-duration alert rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRuleConfig {
    /// Unique rule name, carried on emitted alert events
    pub name: String,

    /// Metric the rule evaluates
    pub metric: AlertMetric,

    /// Trigger threshold (rule fires on value >= threshold)
    pub threshold: f64,

    /// Seconds the condition must hold before triggering
    pub duration_seconds: u64,
}

/// Durable storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database path; None disables persistence
    pub database_path: Option<PathBuf>,

    /// Age horizon for durable rows
    pub retention_days: u32,

    /// Interval between retention sweeps
    pub prune_interval_seconds: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            retention_days: 7,
            prune_interval_seconds: 3600, // hourly sweep
        }
    }
}

impl Config {
    /// Get the default path to the configuration file.
    pub fn config_path() -> PathBuf {
        paths::config_dir().join("config.json")
    }

    /// Load configuration from the default path, falling back to defaults
    /// when no file exists.
    pub fn load() -> Result<Self> {
        Self::load_from(Self::config_path())
    }

    /// Load configuration from an explicit path, falling back to defaults
    /// when no file exists.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| PulseError::InvalidConfig {
            reason: format!("Failed to read config: {}", e),
        })?;
        let config: Self =
            serde_json::from_str(&content).map_err(|e| PulseError::InvalidConfig {
                reason: format!("Failed to parse config: {}", e),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration to the default path.
    pub fn save(&self) -> Result<()> {
        self.save_to(Self::config_path())
    }

    /// Write the configuration to an explicit path, creating parent
    /// directories as needed.
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PulseError::IoError {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let content = serde_json::to_string_pretty(self).map_err(|e| PulseError::InvalidConfig {
            reason: format!("Failed to serialize config: {}", e),
        })?;
        std::fs::write(path, content).map_err(|e| PulseError::IoError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.ingest.rate_limit_per_minute == 0 {
            return Err(PulseError::InvalidConfig {
                reason: "ingest.rate_limit_per_minute must be at least 1".to_string(),
            });
        }
        if self.window.retention_seconds == 0 {
            return Err(PulseError::InvalidConfig {
                reason: "window.retention_seconds must be at least 1".to_string(),
            });
        }
        if self.window.max_entries == 0 {
            return Err(PulseError::InvalidConfig {
                reason: "window.max_entries must be at least 1".to_string(),
            });
        }
        let mut seen = std::collections::HashSet::new();
        for rule in &self.alerts.rules {
            if rule.name.is_empty() {
                return Err(PulseError::InvalidConfig {
                    reason: "alert rule names must be non-empty".to_string(),
                });
            }
            if !seen.insert(rule.name.as_str()) {
                return Err(PulseError::InvalidConfig {
                    reason: format!("duplicate alert rule name: {}", rule.name),
                });
            }
            if !rule.threshold.is_finite() {
                return Err(PulseError::InvalidConfig {
                    reason: format!("alert rule {} has a non-finite threshold", rule.name),
                });
            }
        }
        if self.storage.retention_days == 0 {
            return Err(PulseError::InvalidConfig {
                reason: "storage.retention_days must be at least 1".to_string(),
            });
        }
        if self.storage.prune_interval_seconds == 0 {
            return Err(PulseError::InvalidConfig {
                reason: "storage.prune_interval_seconds must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = Config::load_from("/nonexistent/pulse/config.json").unwrap();
        assert_eq!(config.window.retention_seconds, 300);
        assert!(config.storage.database_path.is_none());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"window": {"retention_seconds": 60}}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.window.retention_seconds, 60);
        assert_eq!(config.window.max_entries, 4096);
        assert_eq!(config.ingest.rate_limit_per_minute, 120);
    }

    #[test]
    fn round_trip_preserves_fields() {
        let mut config = Config::default();
        config.ingest.shared_token = Some("secret".to_string());
        config.storage.database_path = Some(PathBuf::from("/tmp/metrics.db"));

        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.ingest.shared_token.as_deref(), Some("secret"));
        assert_eq!(
            parsed.storage.database_path,
            Some(PathBuf::from("/tmp/metrics.db"))
        );
    }

    #[test]
    fn saved_file_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.server.listen_addr = "127.0.0.1:9000".to_string();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.server.listen_addr, "127.0.0.1:9000");
    }

    #[test]
    fn zero_rate_limit_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"ingest": {"rate_limit_per_minute": 0}}"#).unwrap();

        assert!(matches!(
            Config::load_from(&path),
            Err(PulseError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn duplicate_rule_names_rejected() {
        let mut config = Config::default();
        let rule = config.alerts.rules[0].clone();
        config.alerts.rules.push(rule);
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_json_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            Config::load_from(&path),
            Err(PulseError::InvalidConfig { .. })
        ));
    }
}
