// logshield - Infrastructure Layer
// Concrete sinks, probes and process plumbing
// - sinks: file (with rotation), console and PostgreSQL implementations of LogSink
// - disk_probe: sysinfo-backed DiskSpaceProbe
// - host_metrics: sysinfo-backed HostMetricsProvider
// - observability: tracing subscriber setup
// - signals: SIGINT/SIGTERM to ShutdownCoordinator

pub mod disk_probe;
pub mod host_metrics;
pub mod observability;
pub mod signals;
pub mod sinks;

pub use disk_probe::SysinfoDiskProbe;
pub use host_metrics::SysinfoHostMetrics;
pub use observability::init_tracing;
pub use signals::start_signal_handler;
pub use sinks::{ConsoleSink, FileLogSink, PostgresLogSink, PostgresSinkError};
