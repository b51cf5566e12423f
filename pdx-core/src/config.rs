//! PDX configuration types and builders.

use std::time::Duration;

/// Default time preserved data is kept after its last deserialization.
const DEFAULT_PRESERVED_DATA_EXPIRY: Duration = Duration::from_secs(20);

/// Configuration error returned when validation fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    message: String,
}

impl ConfigError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "configuration error: {}", self.message)
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for crate::error::PdxError {
    fn from(err: ConfigError) -> Self {
        crate::error::PdxError::Configuration(err.message)
    }
}

/// Cache-level switches consumed by the PDX reader and writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdxConfig {
    ignore_unread_fields: bool,
    read_serialized: bool,
    preserved_data_expiry: Duration,
}

impl PdxConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> PdxConfigBuilder {
        PdxConfigBuilder::new()
    }

    /// Returns `true` if fields unknown to the local class are dropped
    /// instead of being preserved for re-serialization.
    pub fn ignore_unread_fields(&self) -> bool {
        self.ignore_unread_fields
    }

    /// Returns `true` if deserialization yields PDX instances rather than
    /// domain objects.
    pub fn read_serialized(&self) -> bool {
        self.read_serialized
    }

    /// Returns how long preserved data survives without being refreshed.
    pub fn preserved_data_expiry(&self) -> Duration {
        self.preserved_data_expiry
    }

    /// Loads configuration from environment variables.
    ///
    /// | Variable | Maps to |
    /// |----------|---------|
    /// | `PDX_IGNORE_UNREAD_FIELDS` | `"true"` or `"false"` |
    /// | `PDX_READ_SERIALIZED` | `"true"` or `"false"` |
    /// | `PDX_PRESERVED_DATA_EXPIRY_MS` | Expiry in milliseconds |
    ///
    /// Unset variables keep their defaults; unparsable values are errors.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut builder = PdxConfigBuilder::new();
        if let Ok(val) = std::env::var("PDX_IGNORE_UNREAD_FIELDS") {
            builder = builder.ignore_unread_fields(parse_bool("PDX_IGNORE_UNREAD_FIELDS", &val)?);
        }
        if let Ok(val) = std::env::var("PDX_READ_SERIALIZED") {
            builder = builder.read_serialized(parse_bool("PDX_READ_SERIALIZED", &val)?);
        }
        if let Ok(val) = std::env::var("PDX_PRESERVED_DATA_EXPIRY_MS") {
            let ms = val.trim().parse::<u64>().map_err(|e| {
                ConfigError::new(format!("PDX_PRESERVED_DATA_EXPIRY_MS: {e}"))
            })?;
            builder = builder.preserved_data_expiry(Duration::from_millis(ms));
        }
        builder.build()
    }
}

fn parse_bool(var: &str, val: &str) -> Result<bool, ConfigError> {
    match val.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(ConfigError::new(format!(
            "{var}: expected a boolean, found '{other}'"
        ))),
    }
}

impl Default for PdxConfig {
    fn default() -> Self {
        Self {
            ignore_unread_fields: false,
            read_serialized: false,
            preserved_data_expiry: DEFAULT_PRESERVED_DATA_EXPIRY,
        }
    }
}

/// Builder for `PdxConfig`.
#[derive(Debug, Clone, Default)]
pub struct PdxConfigBuilder {
    ignore_unread_fields: Option<bool>,
    read_serialized: Option<bool>,
    preserved_data_expiry: Option<Duration>,
}

impl PdxConfigBuilder {
    /// Creates a new PDX configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops fields unknown to the local class instead of preserving them.
    pub fn ignore_unread_fields(mut self, ignore: bool) -> Self {
        self.ignore_unread_fields = Some(ignore);
        self
    }

    /// Makes deserialization return PDX instances.
    pub fn read_serialized(mut self, read_serialized: bool) -> Self {
        self.read_serialized = Some(read_serialized);
        self
    }

    /// Sets how long preserved data survives without being refreshed.
    pub fn preserved_data_expiry(mut self, expiry: Duration) -> Self {
        self.preserved_data_expiry = Some(expiry);
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the preserved data expiry is zero.
    pub fn build(self) -> Result<PdxConfig, ConfigError> {
        let defaults = PdxConfig::default();
        let preserved_data_expiry = self
            .preserved_data_expiry
            .unwrap_or(defaults.preserved_data_expiry);
        if preserved_data_expiry.is_zero() {
            return Err(ConfigError::new(
                "preserved_data_expiry must be greater than zero",
            ));
        }
        Ok(PdxConfig {
            ignore_unread_fields: self
                .ignore_unread_fields
                .unwrap_or(defaults.ignore_unread_fields),
            read_serialized: self.read_serialized.unwrap_or(defaults.read_serialized),
            preserved_data_expiry,
        })
    }
}

impl From<PdxConfig> for PdxConfigBuilder {
    fn from(config: PdxConfig) -> Self {
        Self {
            ignore_unread_fields: Some(config.ignore_unread_fields),
            read_serialized: Some(config.read_serialized),
            preserved_data_expiry: Some(config.preserved_data_expiry),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PdxConfig::default();
        assert!(!config.ignore_unread_fields());
        assert!(!config.read_serialized());
        assert_eq!(config.preserved_data_expiry(), Duration::from_secs(20));
    }

    #[test]
    fn test_builder_overrides() {
        let config = PdxConfig::builder()
            .ignore_unread_fields(true)
            .read_serialized(true)
            .preserved_data_expiry(Duration::from_millis(250))
            .build()
            .unwrap();
        assert!(config.ignore_unread_fields());
        assert!(config.read_serialized());
        assert_eq!(config.preserved_data_expiry(), Duration::from_millis(250));
    }

    #[test]
    fn test_zero_expiry_rejected() {
        let err = PdxConfig::builder()
            .preserved_data_expiry(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(err.message().contains("preserved_data_expiry"));
        assert!(err.to_string().starts_with("configuration error:"));
    }

    #[test]
    fn test_builder_from_config_round_trip() {
        let config = PdxConfig::builder().read_serialized(true).build().unwrap();
        let rebuilt = PdxConfigBuilder::from(config.clone()).build().unwrap();
        assert_eq!(rebuilt, config);
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("X", "TRUE").unwrap());
        assert!(!parse_bool("X", " 0 ").unwrap());
        assert!(parse_bool("X", "maybe").is_err());
    }

    #[test]
    fn test_config_error_converts_to_pdx_error() {
        let err: crate::error::PdxError = ConfigError::new("bad").into();
        assert!(matches!(err, crate::error::PdxError::Configuration(_)));
    }

    #[test]
    fn test_config_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ConfigError>();
    }
}
