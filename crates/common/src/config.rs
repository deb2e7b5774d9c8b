//! Configuration file loading
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working configuration.
//!
//! ```toml
//! [logging]
//! level = "debug"
//! with_target = false
//!
//! [calls]
//! failure_level = "error"
//! cleanup_level = "warn"
//! query_level = "info"
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::Level;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingSettings,
    /// Log levels used when native calls fail
    #[serde(default)]
    pub calls: CallSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Default `EnvFilter` directive, overridden by `RUST_LOG`
    #[serde(default = "LoggingSettings::default_level")]
    pub level: String,
    #[serde(default = "LoggingSettings::default_with_target")]
    pub with_target: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            with_target: Self::default_with_target(),
        }
    }
}

impl LoggingSettings {
    fn default_level() -> String {
        "info".to_string()
    }

    fn default_with_target() -> bool {
        true
    }
}

/// Severity of the log line emitted for a failed native call
///
/// `failure_level` applies to calls whose failure is returned to the caller,
/// `cleanup_level` to interface release during teardown, and `query_level` to
/// the non-raising query forms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSettings {
    #[serde(default = "CallSettings::default_level")]
    pub failure_level: String,
    #[serde(default = "CallSettings::default_level")]
    pub cleanup_level: String,
    #[serde(default = "CallSettings::default_level")]
    pub query_level: String,
}

impl Default for CallSettings {
    fn default() -> Self {
        Self {
            failure_level: Self::default_level(),
            cleanup_level: Self::default_level(),
            query_level: Self::default_level(),
        }
    }
}

impl CallSettings {
    fn default_level() -> String {
        "error".to_string()
    }

    pub fn failure_level(&self) -> Result<Level> {
        parse_level("calls.failure_level", &self.failure_level)
    }

    pub fn cleanup_level(&self) -> Result<Level> {
        parse_level("calls.cleanup_level", &self.cleanup_level)
    }

    pub fn query_level(&self) -> Result<Level> {
        parse_level("calls.query_level", &self.query_level)
    }
}

fn parse_level(field: &str, value: &str) -> Result<Level> {
    Level::from_str(value)
        .map_err(|_| Error::Config(format!("{}: invalid log level '{}'", field, value)))
}

impl Config {
    /// Parse and validate a configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let config = Self::from_toml_str(&content)?;
        tracing::info!("Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Load from an explicit path (tilde-expanded) or from the default location
    ///
    /// An explicit path must exist. A missing default file is not an error and
    /// yields the defaults.
    pub fn load_or_default(path: Option<&str>) -> Result<Self> {
        if let Some(path) = path {
            let path_buf = PathBuf::from(shellexpand::tilde(path).as_ref());
            return Self::load(&path_buf);
        }

        let default_path = Self::default_path();
        if default_path.exists() {
            Self::load(&default_path)
        } else {
            tracing::debug!(
                "No configuration file at {}, using defaults",
                default_path.display()
            );
            Ok(Self::default())
        }
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("scoped-usb").join("config.toml")
        } else {
            PathBuf::from(".config/scoped-usb/config.toml")
        }
    }

    fn validate(&self) -> Result<()> {
        if self.logging.level.trim().is_empty() {
            return Err(Error::Config("logging.level must not be empty".to_string()));
        }
        self.calls.failure_level()?;
        self.calls.cleanup_level()?;
        self.calls.query_level()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.logging.level, "info");
        assert!(config.logging.with_target);
        assert_eq!(config.calls.failure_level().unwrap(), Level::ERROR);
        assert_eq!(config.calls.cleanup_level().unwrap(), Level::ERROR);
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_invalid_level_rejected() {
        let err = Config::from_toml_str("[calls]\ncleanup_level = \"loud\"\n").unwrap_err();
        assert!(err.to_string().contains("calls.cleanup_level"));
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }
}
