//! Centralized path configuration for pulse.
//!
//! All data paths should go through this module to ensure consistency
//! whether the daemon runs as a user process or a system service.

use std::path::PathBuf;

/// Get the pulse data directory.
///
/// Resolution order:
/// 1. `PULSE_DATA_DIR` environment variable
/// 2. `/var/lib/pulse` if it exists (system install)
/// 3. `~/.pulse` for user-only installs
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("PULSE_DATA_DIR") {
        return PathBuf::from(dir);
    }

    let system_dir = PathBuf::from("/var/lib/pulse");
    if system_dir.exists() {
        return system_dir;
    }

    dirs::home_dir().map(|h| h.join(".pulse")).unwrap_or(system_dir)
}

/// Get the configuration directory.
///
/// Resolution order mirrors `data_dir`, preferring `/etc/pulse` for system
/// installs so packaged deployments keep config separate from data.
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("PULSE_CONFIG_DIR") {
        return PathBuf::from(dir);
    }

    let system_dir = PathBuf::from("/etc/pulse");
    if system_dir.exists() {
        return system_dir;
    }

    data_dir()
}
