// logshield - Domain Layer
// - events: reported events, error events and sink entries
// - classifier: infrastructure/application split and fingerprints
// - backoff: exponential delays for cooldowns and handler pacing
// - sink: LogSink port
// - disk: DiskSpaceProbe port
// - health: health report types and HostMetricsProvider port

pub mod backoff;
pub mod classifier;
pub mod disk;
pub mod events;
pub mod health;
pub mod sink;

pub use backoff::BackoffCalculator;
pub use classifier::{Classification, ErrorCategory, ErrorClassifier, Fingerprint};
pub use disk::{DiskProbeError, DiskSpaceProbe, DiskUsage, SpaceStatus};
pub use events::{ErrorDetails, ErrorEvent, LogEntry, LogEvent, Severity};
pub use health::{HealthStatus, HostMetrics, HostMetricsError, HostMetricsProvider};
pub use sink::{LogSink, SinkError, SinkKind};
