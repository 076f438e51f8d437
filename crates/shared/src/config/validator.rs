//! Configuration validation
//!
//! This module provides validation logic for configuration DTOs.

use super::dto::{BreakerConfigDto, BreakerSettings, DedupConfig, FatalConfig, LogShieldConfig};
use super::error::{ConfigError, Result};

/// Validate a database URL format
///
/// # Arguments
///
/// * `url` - The database URL to validate
///
/// # Returns
///
/// Ok(()) if valid, Err(ConfigError) if invalid
pub fn validate_database_url(url: &str) -> Result<()> {
    if url.is_empty() {
        return Err(ConfigError::InvalidDatabaseUrl(
            "Database URL cannot be empty".to_string(),
        ));
    }

    if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
        return Err(ConfigError::InvalidDatabaseUrl(format!(
            "Database URL must start with postgres:// or postgresql://, got: {}",
            url
        )));
    }

    Ok(())
}

/// Validate the deduplication section
pub fn validate_dedup_config(config: &DedupConfig) -> Result<()> {
    if config.window_secs == 0 {
        return Err(ConfigError::Validation(
            "Dedup window must be greater than 0".to_string(),
        ));
    }

    if config.summary_every == 0 {
        return Err(ConfigError::Validation(
            "Summary cadence must be greater than 0".to_string(),
        ));
    }

    if config.inactivity_timeout_secs < config.window_secs {
        return Err(ConfigError::Validation(format!(
            "Dedup inactivity timeout ({}s) cannot be shorter than the window ({}s)",
            config.inactivity_timeout_secs, config.window_secs
        )));
    }

    if config.max_tracked_fingerprints == 0 {
        return Err(ConfigError::Validation(
            "Max tracked fingerprints must be greater than 0".to_string(),
        ));
    }

    Ok(())
}

fn validate_breaker(name: &str, breaker: &BreakerConfigDto, max_cooldown_secs: u64) -> Result<()> {
    if breaker.failure_threshold == 0 {
        return Err(ConfigError::Validation(format!(
            "{} breaker threshold must be greater than 0",
            name
        )));
    }

    if breaker.base_cooldown_secs == 0 {
        return Err(ConfigError::Validation(format!(
            "{} breaker cooldown must be greater than 0",
            name
        )));
    }

    if breaker.base_cooldown_secs > max_cooldown_secs {
        return Err(ConfigError::Validation(format!(
            "{} breaker cooldown ({}s) exceeds the max cooldown ({}s)",
            name, breaker.base_cooldown_secs, max_cooldown_secs
        )));
    }

    Ok(())
}

/// Validate circuit breaker settings
pub fn validate_breaker_settings(settings: &BreakerSettings) -> Result<()> {
    validate_breaker("File", &settings.file, settings.max_cooldown_secs)?;
    validate_breaker("Database", &settings.database, settings.max_cooldown_secs)?;

    if !settings.cooldown_multiplier.is_finite() || settings.cooldown_multiplier < 1.0 {
        return Err(ConfigError::Validation(format!(
            "Cooldown multiplier must be >= 1.0, got: {}",
            settings.cooldown_multiplier
        )));
    }

    if settings.write_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "Sink write timeout must be greater than 0".to_string(),
        ));
    }

    Ok(())
}

/// Validate the fatal error budget
pub fn validate_fatal_config(config: &FatalConfig) -> Result<()> {
    if config.threshold == 0 {
        return Err(ConfigError::Validation(
            "Fatal threshold must be greater than 0".to_string(),
        ));
    }

    if config.hook_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "Shutdown hook timeout must be greater than 0".to_string(),
        ));
    }

    if config.handler_backoff_base_ms > config.handler_backoff_max_ms {
        return Err(ConfigError::Validation(format!(
            "Handler backoff base ({}ms) cannot exceed its max ({}ms)",
            config.handler_backoff_base_ms, config.handler_backoff_max_ms
        )));
    }

    Ok(())
}

/// Validate complete configuration
///
/// # Arguments
///
/// * `config` - The configuration to validate
///
/// # Returns
///
/// Ok(()) if valid, Err(ConfigError) if invalid
pub fn validate_config(config: &LogShieldConfig) -> Result<()> {
    validate_dedup_config(&config.dedup)?;
    validate_breaker_settings(&config.breakers)?;
    validate_fatal_config(&config.fatal)?;

    if config.disk.poll_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "Disk poll interval must be greater than 0".to_string(),
        ));
    }

    if config.sinks.max_file_bytes == 0 || config.sinks.max_files == 0 {
        return Err(ConfigError::Validation(
            "Log rotation needs a non-zero size and file count".to_string(),
        ));
    }

    if let Some(url) = &config.sinks.database_url {
        validate_database_url(url)?;
    }

    if config.logging.stats_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "Stats interval must be greater than 0".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_database_url_valid() {
        assert!(validate_database_url("postgres://localhost:5432/logs").is_ok());
        assert!(validate_database_url("postgresql://user:pass@db:5432/logs").is_ok());
    }

    #[test]
    fn test_validate_database_url_invalid() {
        assert!(validate_database_url("").is_err());
        assert!(validate_database_url("mysql://localhost:3306/logs").is_err());
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&LogShieldConfig::default()).is_ok());
    }

    #[test]
    fn test_zero_summary_cadence_rejected() {
        let mut config = LogShieldConfig::default();
        config.dedup.summary_every = 0;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_breaker_cooldown_above_max_rejected() {
        let mut settings = BreakerSettings::default();
        settings.database.base_cooldown_secs = settings.max_cooldown_secs + 1;
        let err = validate_breaker_settings(&settings).unwrap_err();
        assert!(err.to_string().contains("Database"));
    }

    #[test]
    fn test_shrinking_multiplier_rejected() {
        let mut settings = BreakerSettings::default();
        settings.cooldown_multiplier = 0.5;
        assert!(validate_breaker_settings(&settings).is_err());
    }

    #[test]
    fn test_zero_fatal_threshold_rejected() {
        let mut config = FatalConfig::default();
        config.threshold = 0;
        assert!(validate_fatal_config(&config).is_err());
    }

    #[test]
    fn test_bad_database_url_rejected_in_full_config() {
        let mut config = LogShieldConfig::default();
        config.sinks.database_url = Some("redis://localhost".to_string());
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidDatabaseUrl(_))
        ));
    }
}
