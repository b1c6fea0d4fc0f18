//! Configuration file support for tlflash.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (TLFLASH_*)
//! 3. Local config file (./tlflash.toml)
//! 4. Global config file (~/.config/tlflash/config.toml)
//!
//! A broken local or global file only produces a warning. A file named with
//! `--config` must load, or the command fails with a config error.

use anyhow::Result;
use directories::ProjectDirs;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::{CliError, ResetMode};

/// Name of the local config file.
pub(crate) const LOCAL_CONFIG: &str = "tlflash.toml";

/// Connection configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Preferred serial port (e.g., "/dev/ttyUSB0" or "COM3").
    pub serial: Option<String>,
    /// Transfer baud rate.
    pub baud: Option<u32>,
}

/// Port-specific configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortConfig {
    /// Connection settings.
    #[serde(default)]
    pub connection: ConnectionConfig,
}

/// Flash configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlashConfig {
    /// Bootloader entry method.
    pub reset: Option<ResetMode>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Port configuration.
    #[serde(default)]
    pub port: PortConfig,
    /// Flash configuration.
    #[serde(default)]
    pub flash: FlashConfig,
}

impl Config {
    /// Load configuration from the global and local files.
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load global config
        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_lenient(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        // Load local config (overrides global)
        if let Some(local_config) = Self::load_lenient(Path::new(LOCAL_CONFIG)) {
            debug!("Loaded local config from {LOCAL_CONFIG}");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let config = Self::parse_file(path).map_err(CliError::Config)?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load a file if present, warning instead of failing on bad content.
    fn load_lenient(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match Self::parse_file(path) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!("{e}");
                None
            },
        }
    }

    /// Read and parse one file.
    fn parse_file(path: &Path) -> std::result::Result<Self, String> {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;
        toml::from_str(&content)
            .map_err(|e| format!("Failed to parse config file {}: {e}", path.display()))
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "tlflash").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one.
    fn merge(&mut self, other: Self) {
        if other.port.connection.serial.is_some() {
            self.port.connection.serial = other.port.connection.serial;
        }
        if other.port.connection.baud.is_some() {
            self.port.connection.baud = other.port.connection.baud;
        }
        if other.flash.reset.is_some() {
            self.flash.reset = other.flash.reset;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.port.connection.serial.is_none());
        assert!(config.port.connection.baud.is_none());
        assert!(config.flash.reset.is_none());
    }

    // ---- Config merge ----

    #[test]
    fn test_config_merge_overrides() {
        let mut base = Config::default();
        base.port.connection.baud = Some(460800);

        let mut other = Config::default();
        other.port.connection.serial = Some("/dev/ttyUSB0".to_string());
        other.port.connection.baud = Some(921600);
        other.flash.reset = Some(ResetMode::None);

        base.merge(other);

        assert_eq!(base.port.connection.serial.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(base.port.connection.baud, Some(921600));
        assert_eq!(base.flash.reset, Some(ResetMode::None));
    }

    #[test]
    fn test_config_merge_does_not_overwrite_with_none() {
        let mut base = Config::default();
        base.port.connection.serial = Some("/dev/ttyUSB0".to_string());
        base.flash.reset = Some(ResetMode::Rts);

        base.merge(Config::default());

        assert_eq!(base.port.connection.serial.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(base.flash.reset, Some(ResetMode::Rts));
    }

    // ---- TOML ----

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
[port.connection]
serial = "/dev/ttyUSB0"
baud = 921600

[flash]
reset = "none"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.port.connection.serial.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(config.port.connection.baud, Some(921600));
        assert_eq!(config.flash.reset, Some(ResetMode::None));
    }

    #[test]
    fn test_config_from_empty_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.port.connection.serial.is_none());
        assert!(config.flash.reset.is_none());
    }

    #[test]
    fn test_config_rejects_unknown_reset() {
        assert!(toml::from_str::<Config>("[flash]\nreset = \"dtr\"\n").is_err());
    }

    #[test]
    fn test_config_roundtrip_toml() {
        let mut config = Config::default();
        config.port.connection.serial = Some("COM3".to_string());
        config.port.connection.baud = Some(460800);
        config.flash.reset = Some(ResetMode::Rts);

        let serialized = toml::to_string_pretty(&config).unwrap();
        let deserialized: Config = toml::from_str(&serialized).unwrap();

        assert_eq!(deserialized.port.connection.serial.as_deref(), Some("COM3"));
        assert_eq!(deserialized.port.connection.baud, Some(460800));
        assert_eq!(deserialized.flash.reset, Some(ResetMode::Rts));
    }

    // ---- load_from_path with tempfile ----

    #[test]
    fn test_load_from_path_valid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        fs::write(
            &path,
            r#"
[port.connection]
serial = "/dev/ttyUSB1"
"#,
        )
        .unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.port.connection.serial.as_deref(), Some("/dev/ttyUSB1"));
    }

    #[test]
    fn test_load_from_path_invalid_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "invalid toml [[[").unwrap();

        let err = Config::load_from_path(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CliError>(),
            Some(CliError::Config(_))
        ));
    }

    #[test]
    fn test_load_from_path_nonexistent_is_config_error() {
        let err = Config::load_from_path(Path::new("/nonexistent/path/config.toml")).unwrap_err();
        assert!(err.downcast_ref::<CliError>().is_some());
    }

    #[test]
    fn test_load_lenient_skips_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "[port.connection\nserial = 1").unwrap();
        assert!(Config::load_lenient(&path).is_none());
        assert!(Config::load_lenient(&dir.path().join("missing.toml")).is_none());
    }

    // ---- global_config_path ----

    #[test]
    fn test_global_config_path_is_some() {
        if let Some(p) = Config::global_config_path() {
            assert!(p.to_str().unwrap().contains("tlflash"));
            assert!(p.to_str().unwrap().ends_with("config.toml"));
        }
    }
}
