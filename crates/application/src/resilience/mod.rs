//! Resilience Module
//!
//! Per-sink circuit breakers and the disk space guard that keep a failing
//! destination from being hammered while it is known to be unavailable.

pub mod circuit_breaker;
pub mod disk_guard;

pub use circuit_breaker::{
    BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitState, GuardOutcome,
};
pub use disk_guard::{DiskSpaceGuard, DiskStatusSnapshot};
