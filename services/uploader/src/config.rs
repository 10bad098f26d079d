//! Configuration for the upload client.
//!
//! Values come from defaults, an optional `config/uploader` file, and
//! `UPLOADER__*` environment variables, in that order of precedence.

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to load configuration: {0}")]
    LoadError(String),
}

/// Upload client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the presign service, e.g. `http://localhost:8080`
    #[serde(default = "default_service_url")]
    pub service_url: String,
    /// Delay before a fully completed session hides itself
    #[serde(default = "default_auto_hide_delay_ms")]
    pub auto_hide_delay_ms: u64,
    /// Size of the body chunks that drive byte-level progress events
    #[serde(default = "default_progress_chunk_bytes")]
    pub progress_chunk_bytes: usize,
    /// Parts of one file in flight at once (0 = all parts)
    #[serde(default)]
    pub max_concurrent_parts: usize,
    /// Endpoint notified once every transfer in a batch has settled
    #[serde(default)]
    pub status_url: Option<String>,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_service_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_auto_hide_delay_ms() -> u64 {
    5000
}

fn default_progress_chunk_bytes() -> usize {
    64 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            service_url: default_service_url(),
            auto_hide_delay_ms: default_auto_hide_delay_ms(),
            progress_chunk_bytes: default_progress_chunk_bytes(),
            max_concurrent_parts: 0,
            status_url: None,
            log_level: default_log_level(),
        }
    }
}

impl ClientConfig {
    /// Create a configuration pointing at the given presign service
    pub fn new(service_url: impl Into<String>) -> Self {
        Self {
            service_url: service_url.into(),
            ..Default::default()
        }
    }

    /// Load configuration from environment and config files
    pub fn load() -> Result<Self, ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/uploader").required(false))
            // UPLOADER__SERVICE_URL -> service_url
            .add_source(
                config::Environment::with_prefix("UPLOADER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigError::LoadError(e.to_string()))?;

        let config: Self = config
            .try_deserialize()
            .map_err(|e| ConfigError::LoadError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_url.is_empty() {
            return Err(ConfigError::MissingRequired("service_url".to_string()));
        }

        if !self.service_url.starts_with("http://") && !self.service_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue {
                key: "service_url".to_string(),
                message: "must be an http or https URL".to_string(),
            });
        }

        if self.progress_chunk_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                key: "progress_chunk_bytes".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        Ok(())
    }

    /// Get auto-hide delay as Duration
    pub fn auto_hide_delay(&self) -> Duration {
        Duration::from_millis(self.auto_hide_delay_ms)
    }

    /// Part concurrency limit, `None` when unbounded
    pub fn part_concurrency(&self) -> Option<usize> {
        (self.max_concurrent_parts > 0).then_some(self.max_concurrent_parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.auto_hide_delay(), Duration::from_secs(5));
        assert_eq!(config.progress_chunk_bytes, 64 * 1024);
        assert_eq!(config.part_concurrency(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = ClientConfig::new("");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingRequired(_))
        ));

        let config = ClientConfig::new("ftp://example.com");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));

        let config = ClientConfig {
            progress_chunk_bytes: 0,
            ..ClientConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
