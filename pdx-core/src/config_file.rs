//! Declarative configuration loading from YAML and TOML files.
//!
//! File contents are deserialized into the serde mirror struct [`FileConfig`]
//! and then converted into [`PdxConfig`] through its builder, so the same
//! validation applies as for programmatic configuration.
//!
//! # Example TOML
//!
//! ```toml
//! ignore-unread-fields = false
//! read-serialized = true
//! preserved-data-expiry-ms = 20000
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, PdxConfig, PdxConfigBuilder};

/// File-based mirror of [`PdxConfig`].
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default)]
pub struct FileConfig {
    /// Drop fields unknown to the local class.
    pub ignore_unread_fields: Option<bool>,
    /// Return PDX instances from deserialization.
    pub read_serialized: Option<bool>,
    /// Preserved data expiry in milliseconds.
    pub preserved_data_expiry_ms: Option<u64>,
}

impl TryFrom<FileConfig> for PdxConfig {
    type Error = ConfigError;

    fn try_from(file: FileConfig) -> Result<Self, Self::Error> {
        let mut builder = PdxConfigBuilder::new();
        if let Some(ignore) = file.ignore_unread_fields {
            builder = builder.ignore_unread_fields(ignore);
        }
        if let Some(read_serialized) = file.read_serialized {
            builder = builder.read_serialized(read_serialized);
        }
        if let Some(ms) = file.preserved_data_expiry_ms {
            builder = builder.preserved_data_expiry(Duration::from_millis(ms));
        }
        builder.build()
    }
}

impl PdxConfig {
    /// Loads configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("failed to read YAML config file: {e}")))?;
        let file_config: FileConfig = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::new(format!("failed to parse YAML config: {e}")))?;
        file_config.try_into()
    }

    /// Loads configuration from a TOML file.
    pub fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("failed to read TOML config file: {e}")))?;
        let file_config: FileConfig = toml_crate::from_str(&content)
            .map_err(|e| ConfigError::new(format!("failed to parse TOML config: {e}")))?;
        file_config.try_into()
    }
}

/// Loads configuration from a file, picking the format by extension.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<PdxConfig, ConfigError> {
    let path = path.as_ref();
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml" | "yml") => PdxConfig::from_yaml(path),
        Some("toml") => PdxConfig::from_toml(path),
        Some(ext) => Err(ConfigError::new(format!(
            "unsupported config file extension: .{ext} (expected .yaml, .yml, or .toml)"
        ))),
        None => Err(ConfigError::new(
            "config file has no extension; expected .yaml, .yml, or .toml",
        )),
    }
}
