//! Configuration for the Opengear OM engine.
//!
//! Settings are layered: built-in defaults, then every configuration file
//! found in the standard locations (system, user, project, `OPENGEAR_OM_CONFIG`),
//! then `OPENGEAR_OM_*` environment variables. An explicit path replaces the
//! standard locations.

use crate::error::{Error, ErrorContext, Result};
use crate::telemetry::{LogFormat, LogLevel, LoggingConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const CONFIG_STEM: &str = "opengear-om";
const CONFIG_EXTENSIONS: [&str; 4] = ["toml", "yaml", "yml", "json"];

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Appliance connection settings
    pub device: DeviceConfig,
    /// Reconciliation behaviour
    pub engine: EngineConfig,
    /// Ids that must never be deleted, keyed by resource name
    pub protected: HashMap<String, Vec<String>>,
    /// Logging settings
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: DeviceConfig::default(),
            engine: EngineConfig::default(),
            protected: default_delete_exceptions(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Appliance connection settings handed to the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub host: Option<String>,
    pub username: Option<String>,
    /// REST API base path
    pub api_base: String,
    pub validate_certs: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: None,
            username: None,
            api_base: crate::connection::API_BASE.to_string(),
            validate_certs: true,
        }
    }
}

/// Reconciliation behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Error message prefix accepted as an empty-body success. Empty disables it.
    pub empty_body_marker: String,
    /// Context lines in diff mode
    pub diff_context: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            empty_body_marker: crate::connection::EMPTY_BODY_MARKER.to_string(),
            diff_context: 3,
        }
    }
}

/// Built-in protected ids: the primary admin user and the admin group.
pub fn default_delete_exceptions() -> HashMap<String, Vec<String>> {
    HashMap::from([
        ("users".to_string(), vec!["users-1".to_string()]),
        ("groups".to_string(), vec!["groups-1".to_string()]),
    ])
}

impl Config {
    /// Load configuration from the standard locations, or only `config_path` if given.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = Config::default();

        for path in Self::get_config_paths(config_path) {
            if path.exists() {
                config = config.merge_from_file(&path)?;
            }
        }

        config.apply_env_overrides();

        Ok(config)
    }

    /// Get the list of configuration file paths to check
    fn get_config_paths(explicit_path: Option<&PathBuf>) -> Vec<PathBuf> {
        if let Some(path) = explicit_path {
            return vec![path.clone()];
        }

        let mut dirs_to_check = vec![PathBuf::from("/etc").join(CONFIG_STEM)];
        if let Some(config_dir) = dirs::config_dir() {
            dirs_to_check.push(config_dir.join(CONFIG_STEM));
        }

        let mut paths = Vec::new();
        for dir in dirs_to_check {
            for ext in CONFIG_EXTENSIONS {
                paths.push(dir.join(format!("config.{}", ext)));
            }
        }

        for ext in CONFIG_EXTENSIONS {
            paths.push(PathBuf::from(format!("{}.{}", CONFIG_STEM, ext)));
        }

        if let Ok(env_config) = std::env::var("OPENGEAR_OM_CONFIG") {
            paths.push(PathBuf::from(env_config));
        }

        paths
    }

    /// Parse a single configuration file, picking the format from its extension.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let config: Config = match extension {
            "yml" | "yaml" => serde_yaml::from_str(&content)?,
            "json" => serde_json::from_str(&content)?,
            "toml" => toml::from_str(&content)?,
            _ => toml::from_str(&content)
                .or_else(|_| serde_yaml::from_str(&content))
                .map_err(|e| Error::config_file(path, e.to_string()))?,
        };

        Ok(config)
    }

    fn merge_from_file(&self, path: &Path) -> Result<Self> {
        let file_config = Self::from_file(path)?;
        Ok(self.merge(file_config))
    }

    /// Merge another config into this one; the other side wins where it differs from defaults.
    fn merge(&self, other: Config) -> Config {
        let device_defaults = DeviceConfig::default();
        let engine_defaults = EngineConfig::default();
        let logging_defaults = LoggingConfig::default();

        let mut protected = self.protected.clone();
        protected.extend(other.protected);

        Config {
            device: DeviceConfig {
                host: other.device.host.or_else(|| self.device.host.clone()),
                username: other.device.username.or_else(|| self.device.username.clone()),
                api_base: if other.device.api_base != device_defaults.api_base {
                    other.device.api_base
                } else {
                    self.device.api_base.clone()
                },
                validate_certs: if other.device.validate_certs != device_defaults.validate_certs {
                    other.device.validate_certs
                } else {
                    self.device.validate_certs
                },
            },
            engine: EngineConfig {
                empty_body_marker: if other.engine.empty_body_marker
                    != engine_defaults.empty_body_marker
                {
                    other.engine.empty_body_marker
                } else {
                    self.engine.empty_body_marker.clone()
                },
                diff_context: if other.engine.diff_context != engine_defaults.diff_context {
                    other.engine.diff_context
                } else {
                    self.engine.diff_context
                },
            },
            protected,
            logging: LoggingConfig {
                level: if other.logging.level != logging_defaults.level {
                    other.logging.level
                } else {
                    self.logging.level
                },
                format: if other.logging.format != logging_defaults.format {
                    other.logging.format
                } else {
                    self.logging.format
                },
                filter: other.logging.filter.or_else(|| self.logging.filter.clone()),
                ..other.logging
            },
        }
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("OPENGEAR_OM_HOST") {
            self.device.host = Some(host);
        }

        if let Ok(user) = std::env::var("OPENGEAR_OM_USERNAME") {
            self.device.username = Some(user);
        }

        if let Ok(base) = std::env::var("OPENGEAR_OM_API_BASE") {
            self.device.api_base = base;
        }

        if let Ok(level) = std::env::var("OPENGEAR_OM_LOG_LEVEL") {
            if let Ok(level) = level.parse::<LogLevel>() {
                self.logging.level = level;
            }
        }

        if let Ok(format) = std::env::var("OPENGEAR_OM_LOG_FORMAT") {
            if let Ok(format) = format.parse::<LogFormat>() {
                self.logging.format = format;
            }
        }

        if let Ok(marker) = std::env::var("OPENGEAR_OM_EMPTY_BODY_MARKER") {
            self.engine.empty_body_marker = marker;
        }
    }

    /// Protected ids for a resource.
    pub fn delete_exceptions(&self, resource: &str) -> &[String] {
        self.protected
            .get(resource)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
