// logshield - Application Layer
// Breakers, deduplication, the resilient logger facade and the process lifecycle

pub mod dedup;
pub mod health;
pub mod lifecycle;
pub mod logger;
pub mod resilience;

pub use dedup::{EmitDecision, ErrorRateLimiter, ErrorStats, ErrorStatsReporter, RateLimiterConfig};
pub use health::{HealthReport, HealthReporter};
pub use lifecycle::{
    FatalDecision, FatalErrorTracker, FatalReporter, GlobalExceptionHandlers, HandlerOptions,
    ShutdownCoordinator, ShutdownReason, ShutdownState,
};
pub use logger::{
    DispatchReport, LoggerHealth, LoggerSettings, RecordOutcome, ResilientLogger, SinkDelivery,
};
pub use resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState, DiskSpaceGuard, GuardOutcome};
