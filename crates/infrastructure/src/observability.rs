//! Tracing setup for logshield's own diagnostics
//!
//! `RUST_LOG` wins when set; otherwise the configured level is used.

use logshield_shared::config::LoggingConfig;
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Layer};

#[derive(Debug, Error)]
pub enum ObservabilityError {
    #[error("Invalid log filter '{filter}': {message}")]
    InvalidFilter { filter: String, message: String },

    #[error("A global tracing subscriber is already installed")]
    AlreadyInitialized,
}

pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter, ObservabilityError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.level).map_err(|e| ObservabilityError::InvalidFilter {
        filter: config.level.clone(),
        message: e.to_string(),
    })
}

/// Install the global fmt subscriber, writing to stderr
pub fn init_tracing(config: &LoggingConfig) -> Result<(), ObservabilityError> {
    let filter = env_filter(config)?;

    let logging_layer = tracing_subscriber::fmt::layer()
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_filter(filter);

    let subscriber = tracing_subscriber::Registry::default().with(logging_layer);
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|_| ObservabilityError::AlreadyInitialized)?;

    tracing::debug!(level = %config.level, "Tracing initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_level_filter() {
        let config = LoggingConfig {
            level: "logshield=debug,warn".to_string(),
            ..LoggingConfig::default()
        };
        // Only meaningful when RUST_LOG is not set for the test run
        if std::env::var("RUST_LOG").is_err() {
            assert!(env_filter(&config).is_ok());
        }
    }

    #[test]
    fn test_invalid_level_rejected() {
        let config = LoggingConfig {
            level: "logshield=loud".to_string(),
            ..LoggingConfig::default()
        };
        if std::env::var("RUST_LOG").is_err() {
            assert!(matches!(
                env_filter(&config),
                Err(ObservabilityError::InvalidFilter { .. })
            ));
        }
    }
}
