//! Configuration Data Transfer Objects (DTOs)
//!
//! Immutable configuration DTOs used throughout logshield. They are loaded once
//! at startup and handed to components through their constructors. Every DTO
//! implements `Default` with the production defaults, so tests and embedders
//! can start from `LogShieldConfig::default()` and override single fields.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default dedup window in seconds
pub const DEFAULT_DEDUP_WINDOW_SECS: u64 = 60;

/// Default summary cadence (every Nth duplicate is emitted as a summary)
pub const DEFAULT_SUMMARY_EVERY: u64 = 100;

/// Default consecutive failures before a breaker opens
pub const DEFAULT_BREAKER_THRESHOLD: u32 = 5;

/// Default minimum free bytes on the log volume (100 MiB)
pub const DEFAULT_DISK_MIN_FREE_BYTES: u64 = 100 * 1024 * 1024;

/// Default consecutive fatal errors before shutdown
pub const DEFAULT_FATAL_THRESHOLD: u32 = 10;

// ============================================================================
// Root Configuration DTO
// ============================================================================

/// Configuration DTO for the whole subsystem
///
/// # Example
///
/// ```ignore
/// use logshield_shared::config::LogShieldConfig;
///
/// let config = LogShieldConfig::from_env()?;
/// println!("fatal budget: {}", config.fatal.threshold);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogShieldConfig {
    /// Rate limiting / deduplication
    pub dedup: DedupConfig,

    /// Per-sink circuit breakers
    pub breakers: BreakerSettings,

    /// Local disk space gating
    pub disk: DiskGuardConfig,

    /// Fatal error budget and shutdown
    pub fatal: FatalConfig,

    /// Sink destinations
    pub sinks: SinkConfig,

    /// Diagnostics of logshield itself
    pub logging: LoggingConfig,
}

// ============================================================================
// Section DTOs
// ============================================================================

/// Deduplication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Fixed window length (seconds)
    pub window_secs: u64,

    /// Every Nth duplicate inside a window is emitted as a summary
    pub summary_every: u64,

    /// Records idle longer than this are pruned (seconds)
    pub inactivity_timeout_secs: u64,

    /// Fingerprint count above which an opportunistic prune runs
    pub max_tracked_fingerprints: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            window_secs: DEFAULT_DEDUP_WINDOW_SECS,
            summary_every: DEFAULT_SUMMARY_EVERY,
            inactivity_timeout_secs: 300,
            max_tracked_fingerprints: 1000,
        }
    }
}

impl DedupConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }
}

/// Breaker settings for a single sink
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfigDto {
    /// Consecutive failures before Closed -> Open
    pub failure_threshold: u32,

    /// First cooldown after opening (seconds)
    pub base_cooldown_secs: u64,
}

/// Circuit breaker configuration for every sink
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSettings {
    /// Local file sink breaker
    pub file: BreakerConfigDto,

    /// Remote (database) sink breaker
    pub database: BreakerConfigDto,

    /// Upper bound for the growing cooldown (seconds)
    pub max_cooldown_secs: u64,

    /// Growth factor applied per failed trial
    pub cooldown_multiplier: f64,

    /// Per-write timeout; exceeding it counts as a failure (milliseconds)
    pub write_timeout_ms: u64,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            file: BreakerConfigDto {
                failure_threshold: DEFAULT_BREAKER_THRESHOLD,
                base_cooldown_secs: 60,
            },
            database: BreakerConfigDto {
                failure_threshold: DEFAULT_BREAKER_THRESHOLD,
                base_cooldown_secs: 120,
            },
            max_cooldown_secs: 900,
            cooldown_multiplier: 2.0,
            write_timeout_ms: 5000,
        }
    }
}

impl BreakerSettings {
    pub fn max_cooldown(&self) -> Duration {
        Duration::from_secs(self.max_cooldown_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

/// Disk space guard configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskGuardConfig {
    /// Minimum free bytes on the volume holding the log directory
    pub min_free_bytes: u64,

    /// How often the probe may actually hit the filesystem (seconds)
    pub poll_interval_secs: u64,
}

impl Default for DiskGuardConfig {
    fn default() -> Self {
        Self {
            min_free_bytes: DEFAULT_DISK_MIN_FREE_BYTES,
            poll_interval_secs: 10,
        }
    }
}

impl DiskGuardConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Fatal error budget configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FatalConfig {
    /// Consecutive fatal errors that trigger shutdown
    pub threshold: u32,

    /// Default timeout of a shutdown hook (milliseconds)
    pub hook_timeout_ms: u64,

    /// Base delay of the exception handler backoff (milliseconds)
    pub handler_backoff_base_ms: u64,

    /// Cap of the exception handler backoff (milliseconds)
    pub handler_backoff_max_ms: u64,
}

impl Default for FatalConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_FATAL_THRESHOLD,
            hook_timeout_ms: 10_000,
            handler_backoff_base_ms: 100,
            handler_backoff_max_ms: 30_000,
        }
    }
}

impl FatalConfig {
    pub fn hook_timeout(&self) -> Duration {
        Duration::from_millis(self.hook_timeout_ms)
    }
}

/// Sink destinations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Directory for `error.log` and `infrastructure-errors.log`
    pub log_dir: PathBuf,

    /// Rotate a log file once it reaches this size
    pub max_file_bytes: u64,

    /// Rotated files kept per log
    pub max_files: usize,

    /// Mirror every emitted entry to stderr, not only fallbacks
    pub console_mirror: bool,

    /// PostgreSQL URL of the remote sink; `None` disables it
    pub database_url: Option<String>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("./logs"),
            max_file_bytes: 10 * 1024 * 1024,
            max_files: 5,
            console_mirror: true,
            database_url: None,
        }
    }
}

/// Logging configuration for logshield's own diagnostics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Interval of the periodic error-stats report (seconds)
    pub stats_interval_secs: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            stats_interval_secs: 300,
        }
    }
}

impl LoggingConfig {
    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }
}
