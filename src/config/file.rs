//! TOML configuration file loading
//!
//! Supports `~/.config/fleet/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct FleetConfigFile {
    /// Path to the `SQLite` database holding nodes and audit entries
    #[serde(default)]
    pub database_path: Option<String>,

    /// Fan-out deadlines
    #[serde(default)]
    pub dispatch: DispatchFileConfig,

    /// Device API transport settings
    #[serde(default)]
    pub device: DeviceFileConfig,

    /// Background health monitor
    #[serde(default)]
    pub health: HealthFileConfig,

    /// Audit log retention
    #[serde(default)]
    pub audit: AuditFileConfig,
}

/// Dispatch deadlines, in seconds
#[derive(Debug, Default, Deserialize)]
pub struct DispatchFileConfig {
    pub read_timeout_secs: Option<u64>,
    pub write_timeout_secs: Option<u64>,
}

/// Device transport configuration
#[derive(Debug, Default, Deserialize)]
pub struct DeviceFileConfig {
    /// Talk HTTPS to devices
    pub use_tls: Option<bool>,

    /// Accept self-signed device certificates
    pub accept_invalid_certs: Option<bool>,

    /// Per-request timeout inside the client
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HealthFileConfig {
    pub enabled: Option<bool>,
    pub interval_secs: Option<u64>,
    pub probe_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AuditFileConfig {
    /// Entries older than this are deleted by the retention sweep
    pub retention_days: Option<u32>,
    pub sweep_interval_secs: Option<u64>,
}

/// Load the TOML config file from the standard path
///
/// Returns `FleetConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> FleetConfigFile {
    config_file_path().map_or_else(FleetConfigFile::default, |path| load_from(&path))
}

/// Load a config file from an explicit path, falling back to defaults
pub fn load_from(path: &Path) -> FleetConfigFile {
    if !path.exists() {
        return FleetConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                FleetConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            FleetConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/fleet/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("fleet").join("config.toml"))
}
