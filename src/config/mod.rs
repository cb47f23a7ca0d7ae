//! Configuration management for the fleet orchestrator

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use crate::{Error, Result};

pub use file::FleetConfigFile;

/// Fleet orchestrator configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to data directory (database, etc)
    pub data_dir: PathBuf,

    /// `SQLite` database with nodes and audit entries
    pub database_path: PathBuf,

    /// Fan-out deadlines
    pub dispatch: DispatchConfig,

    /// Device API transport settings
    pub device: DeviceConfig,

    /// Background health monitor
    pub health: HealthConfig,

    /// Audit log retention
    pub audit: AuditConfig,
}

/// Deadlines applied to one dispatch as a whole
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Budget for read-only fan-outs (listing)
    pub read_timeout: Duration,

    /// Budget for mutating fan-outs, including by-name reconciliation
    pub write_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(15),
        }
    }
}

/// Device transport configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceConfig {
    pub use_tls: bool,
    pub accept_invalid_certs: bool,
    pub request_timeout: Duration,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            use_tls: true,
            accept_invalid_certs: false,
            request_timeout: Duration::from_secs(15),
        }
    }
}

/// Health monitor configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthConfig {
    pub enabled: bool,
    pub interval: Duration,
    pub probe_timeout: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(60),
            probe_timeout: Duration::from_secs(5),
        }
    }
}

/// Audit retention configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditConfig {
    pub retention_days: u32,
    pub sweep_interval: Duration,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            retention_days: 90,
            sweep_interval: Duration::from_secs(3600),
        }
    }
}

impl Config {
    /// Load configuration from the config file and `FLEET_*` environment
    ///
    /// # Errors
    ///
    /// Returns error if a configured value is invalid
    pub fn load() -> Result<Self> {
        let file = file::load_config_file();
        Self::from_sources(file, |key| std::env::var(key).ok())
    }

    /// Build configuration from a parsed file and an environment lookup
    ///
    /// Environment values win over file values, which win over defaults.
    ///
    /// # Errors
    ///
    /// Returns error if a timeout or interval resolves to zero, or an
    /// environment value cannot be parsed
    pub fn from_sources<F>(file: FleetConfigFile, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Determine data directory (~/.local/share/fleet on Linux)
        let data_dir = directories::ProjectDirs::from("dev", "omni", "fleet")
            .map_or_else(|| PathBuf::from("."), |d| d.data_dir().to_path_buf());

        let database_path = env("FLEET_DATABASE")
            .or(file.database_path)
            .map_or_else(|| data_dir.join("fleet.db"), PathBuf::from);

        let defaults = DispatchConfig::default();
        let dispatch = DispatchConfig {
            read_timeout: secs(
                "dispatch.read_timeout_secs",
                parse_env(&env, "FLEET_READ_TIMEOUT_SECS")?.or(file.dispatch.read_timeout_secs),
                defaults.read_timeout,
            )?,
            write_timeout: secs(
                "dispatch.write_timeout_secs",
                parse_env(&env, "FLEET_WRITE_TIMEOUT_SECS")?
                    .or(file.dispatch.write_timeout_secs),
                defaults.write_timeout,
            )?,
        };

        let defaults = DeviceConfig::default();
        let device = DeviceConfig {
            use_tls: env_flag(&env, "FLEET_DEVICE_TLS")
                .or(file.device.use_tls)
                .unwrap_or(defaults.use_tls),
            accept_invalid_certs: env_flag(&env, "FLEET_DEVICE_INSECURE")
                .or(file.device.accept_invalid_certs)
                .unwrap_or(defaults.accept_invalid_certs),
            request_timeout: secs(
                "device.request_timeout_secs",
                file.device.request_timeout_secs,
                defaults.request_timeout,
            )?,
        };

        let defaults = HealthConfig::default();
        let health = HealthConfig {
            enabled: file.health.enabled.unwrap_or(defaults.enabled),
            interval: secs(
                "health.interval_secs",
                file.health.interval_secs,
                defaults.interval,
            )?,
            probe_timeout: secs(
                "health.probe_timeout_secs",
                file.health.probe_timeout_secs,
                defaults.probe_timeout,
            )?,
        };

        let defaults = AuditConfig::default();
        let audit = AuditConfig {
            retention_days: parse_env(&env, "FLEET_AUDIT_RETENTION_DAYS")?
                .or(file.audit.retention_days)
                .unwrap_or(defaults.retention_days),
            sweep_interval: secs(
                "audit.sweep_interval_secs",
                file.audit.sweep_interval_secs,
                defaults.sweep_interval,
            )?,
        };

        Ok(Self {
            data_dir,
            database_path,
            dispatch,
            device,
            health,
            audit,
        })
    }
}

/// Resolve an optional seconds value, rejecting zero
fn secs(key: &str, value: Option<u64>, default: Duration) -> Result<Duration> {
    match value {
        Some(0) => Err(Error::Config(format!("{key} must be greater than zero"))),
        Some(s) => Ok(Duration::from_secs(s)),
        None => Ok(default),
    }
}

fn parse_env<F, T>(env: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    env(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|_| Error::Config(format!("{key} has invalid value '{raw}'")))
        })
        .transpose()
}

fn env_flag<F>(env: &F, key: &str) -> Option<bool>
where
    F: Fn(&str) -> Option<String>,
{
    env(key).map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_file_or_env() {
        let config = Config::from_sources(FleetConfigFile::default(), env_from(&[])).unwrap();

        assert_eq!(config.dispatch.read_timeout, Duration::from_secs(10));
        assert_eq!(config.dispatch.write_timeout, Duration::from_secs(15));
        assert!(config.device.use_tls);
        assert_eq!(config.audit.retention_days, 90);
        assert!(config.database_path.ends_with("fleet.db"));
    }

    #[test]
    fn env_overrides_file() {
        let file: FleetConfigFile = toml::from_str(
            r#"
            database_path = "/var/lib/fleet/file.db"

            [dispatch]
            write_timeout_secs = 20
            "#,
        )
        .unwrap();

        let config = Config::from_sources(
            file,
            env_from(&[
                ("FLEET_WRITE_TIMEOUT_SECS", "30"),
                ("FLEET_DEVICE_TLS", "false"),
            ]),
        )
        .unwrap();

        assert_eq!(config.dispatch.write_timeout, Duration::from_secs(30));
        assert!(!config.device.use_tls);
        assert_eq!(config.database_path, PathBuf::from("/var/lib/fleet/file.db"));
    }

    #[test]
    fn zero_timeout_rejected() {
        let file: FleetConfigFile = toml::from_str("[dispatch]\nread_timeout_secs = 0\n").unwrap();
        assert!(matches!(
            Config::from_sources(file, env_from(&[])),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn invalid_env_value_rejected() {
        let result = Config::from_sources(
            FleetConfigFile::default(),
            env_from(&[("FLEET_AUDIT_RETENTION_DAYS", "forever")]),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
