//! Configuration module for logshield
//!
//! Centralized configuration loading, validation, and Data Transfer Objects
//! (DTOs) for the failure-containment subsystem.
//!
//! # Architecture
//!
//! 1. **Single Source of Truth**: configuration is loaded once at startup
//! 2. **Safe Defaults**: every option has a default, so an empty environment
//!    always produces a usable configuration
//! 3. **Fail Fast on Garbage**: a variable that is present but malformed is
//!    reported instead of being silently replaced by its default
//! 4. **DTO Pattern**: configuration is immutable and passed via constructors
//!
//! # Usage
//!
//! ```ignore
//! use logshield_shared::config::ConfigLoader;
//! use std::path::PathBuf;
//!
//! let loader = ConfigLoader::new(Some(PathBuf::from(".env")));
//! let config = loader.load()?;
//! println!("dedup window: {:?}", config.dedup.window());
//! ```
//!
//! # Environment Variables
//!
//! All variables are optional.
//!
//! - `LOGSHIELD_DEDUP_WINDOW_SECS`: dedup window (default: 60)
//! - `LOGSHIELD_SUMMARY_EVERY`: summary cadence N (default: 100)
//! - `LOGSHIELD_FILE_BREAKER_THRESHOLD` / `LOGSHIELD_DB_BREAKER_THRESHOLD`: (default: 5)
//! - `LOGSHIELD_DISK_MIN_FREE_BYTES`: (default: 100 MiB)
//! - `LOGSHIELD_FATAL_THRESHOLD`: (default: 10)
//! - `LOGSHIELD_SINK_WRITE_TIMEOUT_MS`: (default: 5000)
//! - `LOGSHIELD_DATABASE_URL`: remote sink; unset disables it
//! - `RUST_LOG`: log level (default: "info")

pub mod dto;
pub mod error;
pub mod loader;
pub mod validator;

pub use dto::{
    BreakerConfigDto, BreakerSettings, DedupConfig, DiskGuardConfig, FatalConfig, LogShieldConfig,
    LoggingConfig, SinkConfig,
};
pub use error::{ConfigError, Result};
pub use loader::ConfigLoader;
pub use validator::validate_config;
