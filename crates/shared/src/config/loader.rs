//! Configuration loader
//!
//! This module provides the ConfigLoader which is responsible for loading
//! configuration from .env files and environment variables.

use std::path::Path;

use super::dto::{
    BreakerConfigDto, BreakerSettings, DedupConfig, DiskGuardConfig, FatalConfig, LogShieldConfig,
    LoggingConfig, SinkConfig,
};
use super::error::{ConfigError, Result};
use super::validator::validate_config;

/// Configuration loader
///
/// This loader handles loading configuration from:
/// 1. .env file (optional)
/// 2. Environment variables
///
/// Variables already present in the process environment are not overridden
/// by the .env file.
///
/// # Example
///
/// ```ignore
/// use logshield_shared::config::ConfigLoader;
/// use std::path::PathBuf;
///
/// let loader = ConfigLoader::new(Some(PathBuf::from(".env")));
/// let config = loader.load()?;
/// ```
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Optional path to .env file
    env_file_path: Option<std::path::PathBuf>,
}

impl ConfigLoader {
    /// Create a new ConfigLoader
    ///
    /// # Arguments
    ///
    /// * `env_file_path` - Optional path to .env file. If provided, the file
    ///                     will be loaded before reading environment variables.
    pub fn new(env_file_path: Option<std::path::PathBuf>) -> Self {
        Self { env_file_path }
    }

    /// Load and validate the full configuration
    ///
    /// # Returns
    ///
    /// `Ok(LogShieldConfig)` with defaults for every absent variable
    /// `Err(ConfigError)` if a variable is malformed or validation fails
    pub fn load(&self) -> Result<LogShieldConfig> {
        if let Some(path) = &self.env_file_path {
            self.load_env_file(path)?;
        }

        let config = LogShieldConfig::from_env()?;

        validate_config(&config)?;

        Ok(config)
    }

    /// Load .env file
    fn load_env_file(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(ConfigError::EnvFileLoad {
                path: path.to_path_buf(),
                source: dotenv::Error::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("File not found: {}", path.display()),
                )),
            });
        }

        dotenv::from_path(path).map_err(|e| ConfigError::EnvFileLoad {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(())
    }
}

impl Default for ConfigLoader {
    /// Create a ConfigLoader without .env file support
    fn default() -> Self {
        Self::new(None)
    }
}

// ============================================================================
// Implementation: LogShieldConfig::from_env
// ============================================================================

impl LogShieldConfig {
    /// Build the configuration from environment variables.
    ///
    /// Absent variables take their defaults; this never fails for an empty
    /// environment.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            dedup: DedupConfig::from_env()?,
            breakers: BreakerSettings::from_env()?,
            disk: DiskGuardConfig::from_env()?,
            fatal: FatalConfig::from_env()?,
            sinks: SinkConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
        })
    }
}

impl DedupConfig {
    /// # Optional Variables
    ///
    /// - `LOGSHIELD_DEDUP_WINDOW_SECS`: Default 60
    /// - `LOGSHIELD_SUMMARY_EVERY`: Default 100
    /// - `LOGSHIELD_DEDUP_INACTIVITY_SECS`: Default 300
    /// - `LOGSHIELD_DEDUP_MAX_FINGERPRINTS`: Default 1000
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            window_secs: parse_optional_var("LOGSHIELD_DEDUP_WINDOW_SECS", defaults.window_secs)?,
            summary_every: parse_optional_var("LOGSHIELD_SUMMARY_EVERY", defaults.summary_every)?,
            inactivity_timeout_secs: parse_optional_var(
                "LOGSHIELD_DEDUP_INACTIVITY_SECS",
                defaults.inactivity_timeout_secs,
            )?,
            max_tracked_fingerprints: parse_optional_var(
                "LOGSHIELD_DEDUP_MAX_FINGERPRINTS",
                defaults.max_tracked_fingerprints,
            )?,
        })
    }
}

impl BreakerSettings {
    /// # Optional Variables
    ///
    /// - `LOGSHIELD_FILE_BREAKER_THRESHOLD`: Default 5
    /// - `LOGSHIELD_FILE_BREAKER_BASE_COOLDOWN_SECS`: Default 60
    /// - `LOGSHIELD_DB_BREAKER_THRESHOLD`: Default 5
    /// - `LOGSHIELD_DB_BREAKER_BASE_COOLDOWN_SECS`: Default 120
    /// - `LOGSHIELD_BREAKER_MAX_COOLDOWN_SECS`: Default 900
    /// - `LOGSHIELD_BREAKER_MULTIPLIER`: Default 2.0
    /// - `LOGSHIELD_SINK_WRITE_TIMEOUT_MS`: Default 5000
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            file: BreakerConfigDto {
                failure_threshold: parse_optional_var(
                    "LOGSHIELD_FILE_BREAKER_THRESHOLD",
                    defaults.file.failure_threshold,
                )?,
                base_cooldown_secs: parse_optional_var(
                    "LOGSHIELD_FILE_BREAKER_BASE_COOLDOWN_SECS",
                    defaults.file.base_cooldown_secs,
                )?,
            },
            database: BreakerConfigDto {
                failure_threshold: parse_optional_var(
                    "LOGSHIELD_DB_BREAKER_THRESHOLD",
                    defaults.database.failure_threshold,
                )?,
                base_cooldown_secs: parse_optional_var(
                    "LOGSHIELD_DB_BREAKER_BASE_COOLDOWN_SECS",
                    defaults.database.base_cooldown_secs,
                )?,
            },
            max_cooldown_secs: parse_optional_var(
                "LOGSHIELD_BREAKER_MAX_COOLDOWN_SECS",
                defaults.max_cooldown_secs,
            )?,
            cooldown_multiplier: parse_optional_var(
                "LOGSHIELD_BREAKER_MULTIPLIER",
                defaults.cooldown_multiplier,
            )?,
            write_timeout_ms: parse_optional_var(
                "LOGSHIELD_SINK_WRITE_TIMEOUT_MS",
                defaults.write_timeout_ms,
            )?,
        })
    }
}

impl DiskGuardConfig {
    /// # Optional Variables
    ///
    /// - `LOGSHIELD_DISK_MIN_FREE_BYTES`: Default 104857600 (100 MiB)
    /// - `LOGSHIELD_DISK_POLL_SECS`: Default 10
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            min_free_bytes: parse_optional_var(
                "LOGSHIELD_DISK_MIN_FREE_BYTES",
                defaults.min_free_bytes,
            )?,
            poll_interval_secs: parse_optional_var(
                "LOGSHIELD_DISK_POLL_SECS",
                defaults.poll_interval_secs,
            )?,
        })
    }
}

impl FatalConfig {
    /// # Optional Variables
    ///
    /// - `LOGSHIELD_FATAL_THRESHOLD`: Default 10
    /// - `LOGSHIELD_SHUTDOWN_HOOK_TIMEOUT_MS`: Default 10000
    /// - `LOGSHIELD_HANDLER_BACKOFF_BASE_MS`: Default 100
    /// - `LOGSHIELD_HANDLER_BACKOFF_MAX_MS`: Default 30000
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            threshold: parse_optional_var("LOGSHIELD_FATAL_THRESHOLD", defaults.threshold)?,
            hook_timeout_ms: parse_optional_var(
                "LOGSHIELD_SHUTDOWN_HOOK_TIMEOUT_MS",
                defaults.hook_timeout_ms,
            )?,
            handler_backoff_base_ms: parse_optional_var(
                "LOGSHIELD_HANDLER_BACKOFF_BASE_MS",
                defaults.handler_backoff_base_ms,
            )?,
            handler_backoff_max_ms: parse_optional_var(
                "LOGSHIELD_HANDLER_BACKOFF_MAX_MS",
                defaults.handler_backoff_max_ms,
            )?,
        })
    }
}

impl SinkConfig {
    /// # Optional Variables
    ///
    /// - `LOGSHIELD_LOG_DIR`: Default "./logs"
    /// - `LOGSHIELD_LOG_MAX_BYTES`: Default 10485760 (10 MiB)
    /// - `LOGSHIELD_LOG_MAX_FILES`: Default 5
    /// - `LOGSHIELD_CONSOLE_MIRROR`: "1"=mirror (default: 1)
    /// - `LOGSHIELD_DATABASE_URL`: no default; unset disables the remote sink
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let log_dir = std::env::var("LOGSHIELD_LOG_DIR")
            .map(std::path::PathBuf::from)
            .unwrap_or(defaults.log_dir);

        let console_mirror = std::env::var("LOGSHIELD_CONSOLE_MIRROR")
            .unwrap_or_else(|_| "1".to_string())
            .parse::<u8>()
            .map_err(|_| ConfigError::InvalidValue {
                var: "LOGSHIELD_CONSOLE_MIRROR".to_string(),
                value: "must be 0 or 1".to_string(),
            })?
            == 1;

        let database_url = std::env::var("LOGSHIELD_DATABASE_URL")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Ok(Self {
            log_dir,
            max_file_bytes: parse_optional_var("LOGSHIELD_LOG_MAX_BYTES", defaults.max_file_bytes)?,
            max_files: parse_optional_var("LOGSHIELD_LOG_MAX_FILES", defaults.max_files)?,
            console_mirror,
            database_url,
        })
    }
}

impl LoggingConfig {
    /// # Optional Variables
    ///
    /// - `RUST_LOG`: Log level (default: "info")
    /// - `LOGSHIELD_STATS_INTERVAL_SECS`: Default 300
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let level = std::env::var("RUST_LOG").unwrap_or(defaults.level);
        Ok(Self {
            level,
            stats_interval_secs: parse_optional_var(
                "LOGSHIELD_STATS_INTERVAL_SECS",
                defaults.stats_interval_secs,
            )?,
        })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Parse optional environment variable with default value.
///
/// Absent (or empty) variables yield the default; present but unparsable
/// ones are an error.
pub(crate) fn parse_optional_var<T>(var: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
{
    match std::env::var(var) {
        Ok(raw) if !raw.trim().is_empty() => {
            raw.trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue {
                    var: var.to_string(),
                    value: raw.clone(),
                })
        }
        _ => Ok(default),
    }
}

// ============================================================================
// Tests
// ============================================================================
