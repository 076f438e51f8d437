//! Error deduplication and its periodic stats report

pub mod rate_limiter;
pub mod stats_reporter;

pub use rate_limiter::{
    EmitDecision, ErrorRateLimiter, ErrorStats, OccurrenceRecord, RateLimiterConfig, TopError,
};
pub use stats_reporter::ErrorStatsReporter;
