//! Shared building blocks for logshield crates.
//!
//! Currently this is the configuration layer: DTOs, the env/`.env` loader and
//! the validator. Every other crate receives its settings from here via
//! constructor injection.

pub mod config;

pub use config::{ConfigError, ConfigLoader, LogShieldConfig};
