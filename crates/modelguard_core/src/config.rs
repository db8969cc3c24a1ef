//! Core configuration.
//!
//! # Responsibility
//! - Describe database, logging and retry settings as plain serde structs.
//!
//! # Invariants
//! - Every field has a default, so an empty JSON object is a valid config.

use crate::logging::default_log_level;
use crate::recovery::wrapper::RecoveryConfig;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Database URL used when none is configured.
pub const DEFAULT_DATABASE_URL: &str = "sqlite::memory:";

/// File logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Absolute directory for rolling log files.
    pub log_dir: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level().to_string(),
            log_dir: String::new(),
        }
    }
}

/// Top-level configuration of a core host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub database_url: String,
    /// `None` leaves logging uninitialized.
    pub logging: Option<LoggingConfig>,
    pub recovery: RecoveryConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            logging: None,
            recovery: RecoveryConfig::default(),
        }
    }
}

impl CoreConfig {
    /// Parses a JSON config document.
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(input).map_err(ConfigError)
    }
}

/// Config document could not be parsed.
#[derive(Debug)]
pub struct ConfigError(serde_json::Error);

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid core config: {}", self.0)
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::{CoreConfig, DEFAULT_DATABASE_URL};
    use crate::recovery::wrapper::DEFAULT_MAX_ATTEMPTS;

    #[test]
    fn empty_document_uses_defaults() {
        let config = CoreConfig::from_json_str("{}").unwrap();
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert!(config.logging.is_none());
        assert_eq!(config.recovery.max_attempts, Some(DEFAULT_MAX_ATTEMPTS));
    }

    #[test]
    fn explicit_values_override_defaults() {
        let config = CoreConfig::from_json_str(
            r#"{
                "database_url": "sqlite://data/app.db",
                "logging": { "log_dir": "/tmp/modelguard-logs" },
                "recovery": { "max_attempts": null }
            }"#,
        )
        .unwrap();

        assert_eq!(config.database_url, "sqlite://data/app.db");
        let logging = config.logging.unwrap();
        assert_eq!(logging.log_dir, "/tmp/modelguard-logs");
        assert!(!logging.level.is_empty());
        assert_eq!(config.recovery.max_attempts, None);
    }

    #[test]
    fn malformed_document_is_rejected() {
        let err = CoreConfig::from_json_str("{ \"recovery\": 3 }").unwrap_err();
        assert!(err.to_string().starts_with("invalid core config"));
    }
}
