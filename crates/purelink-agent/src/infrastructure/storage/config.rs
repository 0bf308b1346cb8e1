//! TOML-based configuration for the agent.
//!
//! The file is read from `$PURELINK_CONFIG` when set, otherwise from the
//! platform-appropriate config file:
//! - Windows:  `%APPDATA%\purelink\config.toml`
//! - Linux:    `~/.config/purelink/config.toml`
//! - macOS:    `~/Library/Application Support/purelink/config.toml`
//!
//! Example:
//!
//! ```toml
//! [agent]
//! log_level = "info"
//! environment_refresh_secs = 30
//! retry_on_timeout_secs = 30
//! reconnect = true
//!
//! [discovery]
//! port = 24810
//!
//! [hosts]
//! "AB1-UK-0001A" = "10.0.0.5"
//!
//! [[devices]]
//! name = "Living Room"
//! serial = "AB1-UK-0001A"
//! credentials = "..."
//! product_type = "438"
//! ```
//!
//! Every field has a serde default, so a missing file or a file with only a
//! `[[devices]]` list is a valid configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use purelink_core::{Credentials, DeviceRecord, HostOverrides, ProductType};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::application::connection_manager::ManagerSettings;
use crate::infrastructure::network::discovery::DEFAULT_DISCOVERY_PORT;

/// Environment variable that overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "PURELINK_CONFIG";

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The content parsed but holds an unusable value.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level agent configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    /// Static addresses keyed by serial; these devices skip discovery.
    #[serde(default)]
    pub hosts: BTreeMap<String, String>,
    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
}

/// Lifecycle tunables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentSettings {
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_interval_secs")]
    pub environment_refresh_secs: u64,
    #[serde(default = "default_interval_secs")]
    pub retry_on_timeout_secs: u64,
    /// Re-discover devices that drop their connection.
    #[serde(default = "default_true")]
    pub reconnect: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscoveryConfig {
    /// UDP port announcements are received on.
    #[serde(default = "default_discovery_port")]
    pub port: u16,
}

/// One configured appliance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceEntry {
    pub name: String,
    pub serial: String,
    /// Entries without credentials cannot be connected and are skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,
    pub product_type: ProductType,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_interval_secs() -> u64 {
    30
}
fn default_true() -> bool {
    true
}
fn default_discovery_port() -> u16 {
    DEFAULT_DISCOVERY_PORT
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            environment_refresh_secs: default_interval_secs(),
            retry_on_timeout_secs: default_interval_secs(),
            reconnect: default_true(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            port: default_discovery_port(),
        }
    }
}

// ── Conversions ───────────────────────────────────────────────────────────────

impl AgentConfig {
    /// Records for every entry that carries credentials, in file order.
    pub fn device_records(&self) -> Vec<DeviceRecord> {
        self.devices
            .iter()
            .filter_map(|entry| match &entry.credentials {
                Some(credentials) => Some(DeviceRecord::new(
                    entry.name.clone(),
                    entry.serial.clone(),
                    credentials.clone(),
                    entry.product_type.clone(),
                )),
                None => {
                    debug!("skipping {} ({}): no credentials", entry.name, entry.serial);
                    None
                }
            })
            .collect()
    }

    /// The `[hosts]` table with upper-cased serials.
    pub fn host_overrides(&self) -> HostOverrides {
        self.hosts.iter().collect()
    }

    pub fn manager_settings(&self) -> ManagerSettings {
        ManagerSettings {
            environment_refresh: Duration::from_secs(self.agent.environment_refresh_secs),
            retry_delay: Duration::from_secs(self.agent.retry_on_timeout_secs),
            reconnect: self.agent.reconnect,
        }
    }

    /// Rejects values the agent cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a zero interval or an empty
    /// device name or serial.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.environment_refresh_secs == 0 {
            return Err(ConfigError::Invalid(
                "agent.environment_refresh_secs must be greater than zero".to_string(),
            ));
        }
        if self.agent.retry_on_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "agent.retry_on_timeout_secs must be greater than zero".to_string(),
            ));
        }
        for entry in &self.devices {
            if entry.serial.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "device {:?} has an empty serial",
                    entry.name
                )));
            }
            if entry.name.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "device {} has an empty name",
                    entry.serial
                )));
            }
        }
        Ok(())
    }
}

// ── Config loading ────────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the config file path, honouring `$PURELINK_CONFIG`.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the variable is unset and
/// the base directory cannot be determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
        return Ok(PathBuf::from(path));
    }
    Ok(config_dir()?.join("config.toml"))
}

/// Loads and validates the config from [`config_file_path`].
///
/// # Errors
///
/// See [`load_config_from`].
pub fn load_config() -> Result<AgentConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads and validates the config at `path`, returning
/// `AgentConfig::default()` if the file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// [`ConfigError::Parse`] if the TOML is malformed, and
/// [`ConfigError::Invalid`] if validation fails.
pub fn load_config_from(path: &Path) -> Result<AgentConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => parse_config(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("no config at {}; using defaults", path.display());
            Ok(AgentConfig::default())
        }
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Parses and validates config text.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] or [`ConfigError::Invalid`].
pub fn parse_config(content: &str) -> Result<AgentConfig, ConfigError> {
    let config: AgentConfig = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
}

/// Resolves the platform config base directory plus the `purelink` subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("purelink"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("purelink"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME")
            .map(|h| PathBuf::from(h).join("Library").join("Application Support").join("purelink"))
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
[agent]
log_level = "debug"
environment_refresh_secs = 10
retry_on_timeout_secs = 5
reconnect = false

[discovery]
port = 30000

[hosts]
"ab1-uk-0001a" = "10.0.0.5"

[[devices]]
name = "Living Room"
serial = "AB1-UK-0001A"
credentials = "secret"
product_type = "438"

[[devices]]
name = "Bedroom"
serial = "AB1-UK-0002B"
product_type = "455"
"#;

    fn temp_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("purelink_test_{}_{tag}.toml", std::process::id()))
    }

    // ── Defaults ──────────────────────────────────────────────────────────────

    #[test]
    fn test_agent_config_default_values() {
        // Arrange / Act
        let cfg = AgentConfig::default();

        // Assert
        assert_eq!(cfg.agent.log_level, "info");
        assert_eq!(cfg.agent.environment_refresh_secs, 30);
        assert_eq!(cfg.agent.retry_on_timeout_secs, 30);
        assert!(cfg.agent.reconnect);
        assert_eq!(cfg.discovery.port, 24810);
        assert!(cfg.devices.is_empty());
        assert!(cfg.hosts.is_empty());
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let cfg = parse_config("").expect("empty config is valid");
        assert_eq!(cfg, AgentConfig::default());
    }

    // ── Parsing ───────────────────────────────────────────────────────────────

    #[test]
    fn test_parse_full_config() {
        // Arrange / Act
        let cfg = parse_config(FULL).expect("parse");

        // Assert
        assert_eq!(cfg.agent.log_level, "debug");
        assert_eq!(cfg.discovery.port, 30000);
        assert_eq!(cfg.devices.len(), 2);
        assert_eq!(cfg.devices[1].credentials, None);
        assert_eq!(
            cfg.manager_settings(),
            ManagerSettings {
                environment_refresh: Duration::from_secs(10),
                retry_delay: Duration::from_secs(5),
                reconnect: false,
            }
        );
    }

    #[test]
    fn test_device_records_skip_entries_without_credentials() {
        let cfg = parse_config(FULL).unwrap();

        let records = cfg.device_records();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Living Room");
        assert_eq!(records[0].credentials.expose(), "secret");
        assert_eq!(records[0].product_type.as_str(), "438");
    }

    #[test]
    fn test_host_overrides_are_upper_cased() {
        let cfg = parse_config(FULL).unwrap();

        let hosts = cfg.host_overrides();

        assert_eq!(hosts.len(), 1);
        let (serial, address) = hosts.iter().next().unwrap();
        assert_eq!(serial, "AB1-UK-0001A");
        assert_eq!(address, "10.0.0.5");
    }

    #[test]
    fn test_partial_agent_section_keeps_other_defaults() {
        let cfg = parse_config("[agent]\nreconnect = false\n").unwrap();
        assert!(!cfg.agent.reconnect);
        assert_eq!(cfg.agent.retry_on_timeout_secs, 30);
    }

    #[test]
    fn test_invalid_toml_returns_parse_error() {
        let result = parse_config("[[[ not valid toml");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_device_without_serial_field_is_a_parse_error() {
        let result = parse_config("[[devices]]\nname = \"x\"\nproduct_type = \"438\"\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    // ── Validation ────────────────────────────────────────────────────────────

    #[test]
    fn test_zero_refresh_interval_is_rejected() {
        let result = parse_config("[agent]\nenvironment_refresh_secs = 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_zero_retry_interval_is_rejected() {
        let result = parse_config("[agent]\nretry_on_timeout_secs = 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_blank_serial_is_rejected() {
        let toml = "[[devices]]\nname = \"x\"\nserial = \" \"\nproduct_type = \"438\"\n";
        assert!(matches!(parse_config(toml), Err(ConfigError::Invalid(_))));
    }

    // ── Files ─────────────────────────────────────────────────────────────────

    #[test]
    fn test_load_config_from_missing_file_returns_default() {
        let path = PathBuf::from("/nonexistent/path/that/cannot/exist/config.toml");

        let cfg = load_config_from(&path).expect("missing file yields defaults");

        assert_eq!(cfg, AgentConfig::default());
    }

    #[test]
    fn test_load_config_from_reads_file() {
        // Arrange
        let path = temp_path("load");
        std::fs::write(&path, FULL).unwrap();

        // Act
        let cfg = load_config_from(&path);

        // Assert
        std::fs::remove_file(&path).ok();
        let cfg = cfg.expect("load");
        assert_eq!(cfg.devices.len(), 2);
    }

    #[test]
    fn test_load_config_from_directory_is_an_io_error() {
        let dir = std::env::temp_dir();
        let result = load_config_from(&dir);
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_config_file_path_ends_with_config_toml() {
        if std::env::var_os(CONFIG_PATH_ENV).is_some() {
            return;
        }
        if let Ok(path) = config_file_path() {
            assert!(
                path.ends_with("purelink/config.toml"),
                "unexpected config path {path:?}"
            );
        }
        // NoPlatformConfigDir in a stripped environment is also acceptable.
    }
}
