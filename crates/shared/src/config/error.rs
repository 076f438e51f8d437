//! Configuration error types
//!
//! This module defines all error types that can occur during configuration loading and validation.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during configuration loading or validation
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A configuration variable is present but cannot be parsed
    #[error("Invalid value for {var}: {value}")]
    InvalidValue { var: String, value: String },

    /// Failed to load .env file
    #[error("Failed to load .env file from {path}: {source}")]
    EnvFileLoad {
        path: PathBuf,
        #[source]
        source: dotenv::Error,
    },

    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    Validation(String),

    /// Invalid database URL format
    #[error("Invalid database URL format: {0}")]
    InvalidDatabaseUrl(String),
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_value_display() {
        let err = ConfigError::InvalidValue {
            var: "LOGSHIELD_SUMMARY_EVERY".to_string(),
            value: "abc".to_string(),
        };
        assert!(err.to_string().contains("LOGSHIELD_SUMMARY_EVERY"));
        assert!(err.to_string().contains("abc"));
    }

    #[test]
    fn test_validation_display() {
        let err = ConfigError::Validation("fatal threshold must be > 0".to_string());
        assert!(err.to_string().contains("fatal threshold must be > 0"));
    }
}
