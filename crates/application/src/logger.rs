//! Resilient logger facade
//!
//! The single entry point application code uses to report anything.
//! Recording happens in two steps:
//!
//! 1. `admit`: level filter, classification and deduplication. Synchronous,
//!    so the occurrence bookkeeping of one report finishes before any other
//!    report of the same fingerprint can start.
//! 2. `dispatch`: sink I/O for admitted entries, each sink behind its own
//!    circuit breaker.
//!
//! Routing:
//! - Infrastructure errors skip the remote sink; they go to the file sink
//!   (breaker and disk permitting) and always to the console.
//! - Application errors go to the file and remote sinks concurrently; one
//!   failing never holds up or masks the other.
//! - The console receives every entry when mirroring is on, and otherwise
//!   acts as the fallback whenever the file write did not land.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use logshield_domain::{
    ErrorCategory, ErrorClassifier, Fingerprint, LogEntry, LogEvent, LogSink, Severity,
};
use logshield_shared::config::LogShieldConfig;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::trace;

use crate::dedup::{EmitDecision, ErrorRateLimiter, ErrorStats, RateLimiterConfig};
use crate::resilience::{
    BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, DiskSpaceGuard, DiskStatusSnapshot,
    GuardOutcome,
};

/// Breaker name of the local file sink
pub const FILE_CIRCUIT: &str = "file";
/// Breaker name of the remote sink
pub const DATABASE_CIRCUIT: &str = "database";

#[derive(Debug, Clone)]
pub struct LoggerSettings {
    /// Events below this level are dropped before classification
    pub min_level: Severity,
    /// Mirror every emitted entry to the console
    pub console_mirror: bool,
    /// Directory whose volume the disk guard checks
    pub log_dir: PathBuf,
    pub min_free_bytes: u64,
    pub dedup: RateLimiterConfig,
    pub file_breaker: CircuitBreakerConfig,
    pub database_breaker: CircuitBreakerConfig,
}

impl LoggerSettings {
    pub fn from_config(config: &LogShieldConfig) -> Self {
        Self {
            min_level: config.logging.level.parse().unwrap_or(Severity::Info),
            console_mirror: config.sinks.console_mirror,
            log_dir: config.sinks.log_dir.clone(),
            min_free_bytes: config.disk.min_free_bytes,
            dedup: RateLimiterConfig::from(&config.dedup),
            file_breaker: CircuitBreakerConfig::from_settings(
                &config.breakers.file,
                &config.breakers,
            ),
            database_breaker: CircuitBreakerConfig::from_settings(
                &config.breakers.database,
                &config.breakers,
            ),
        }
    }
}

impl Default for LoggerSettings {
    fn default() -> Self {
        Self::from_config(&LogShieldConfig::default())
    }
}

/// What happened to one sink for one entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum SinkDelivery {
    Delivered,
    Failed(String),
    /// The breaker is open; the sink was not touched
    Rejected,
    /// The log volume is below its free-space minimum
    ResourceConstrained,
    /// Routing excluded this sink for the entry
    Skipped,
    NotConfigured,
}

impl SinkDelivery {
    pub fn is_delivered(&self) -> bool {
        matches!(self, SinkDelivery::Delivered)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub file: SinkDelivery,
    pub remote: SinkDelivery,
    pub console: SinkDelivery,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Below the configured level
    Filtered,
    /// Duplicate inside its window; no I/O happened
    Suppressed {
        fingerprint: Fingerprint,
        occurrence_count: u64,
    },
    Emitted {
        category: ErrorCategory,
        decision: EmitDecision,
        report: DispatchReport,
    },
}

impl RecordOutcome {
    pub fn is_emitted(&self) -> bool {
        matches!(self, RecordOutcome::Emitted { .. })
    }
}

/// Result of the synchronous half of `record`
enum Admission {
    Done(RecordOutcome),
    Dispatch {
        entry: LogEntry,
        decision: EmitDecision,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggerHealth {
    pub file_circuit_breaker: BreakerSnapshot,
    pub database_circuit_breaker: BreakerSnapshot,
    pub error_stats: ErrorStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk: Option<DiskStatusSnapshot>,
    pub remote_configured: bool,
}

pub struct ResilientLogger {
    settings: LoggerSettings,
    classifier: ErrorClassifier,
    limiter: Arc<ErrorRateLimiter>,
    file_sink: Option<Arc<dyn LogSink>>,
    remote_sink: Option<Arc<dyn LogSink>>,
    console_sink: Arc<dyn LogSink>,
    file_breaker: CircuitBreaker,
    database_breaker: CircuitBreaker,
    disk_guard: Option<Arc<DiskSpaceGuard>>,
    sequence: AtomicU64,
}

impl ResilientLogger {
    /// Logger writing to the console only; add sinks with the `with_*` methods
    pub fn new(settings: LoggerSettings, console_sink: Arc<dyn LogSink>) -> Self {
        let limiter = Arc::new(ErrorRateLimiter::new(settings.dedup.clone()));
        Self {
            classifier: ErrorClassifier::new(),
            limiter,
            file_sink: None,
            remote_sink: None,
            console_sink,
            file_breaker: CircuitBreaker::with_config(FILE_CIRCUIT, settings.file_breaker.clone()),
            database_breaker: CircuitBreaker::with_config(
                DATABASE_CIRCUIT,
                settings.database_breaker.clone(),
            ),
            disk_guard: None,
            sequence: AtomicU64::new(0),
            settings,
        }
    }

    pub fn with_file_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.file_sink = Some(sink);
        self
    }

    pub fn with_remote_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.remote_sink = Some(sink);
        self
    }

    pub fn with_disk_guard(mut self, guard: Arc<DiskSpaceGuard>) -> Self {
        self.disk_guard = Some(guard);
        self
    }

    pub fn rate_limiter(&self) -> Arc<ErrorRateLimiter> {
        self.limiter.clone()
    }

    pub fn classifier(&self) -> &ErrorClassifier {
        &self.classifier
    }

    pub fn file_breaker(&self) -> &CircuitBreaker {
        &self.file_breaker
    }

    pub fn database_breaker(&self) -> &CircuitBreaker {
        &self.database_breaker
    }

    /// Report an event. Never fails; the outcome says what happened.
    pub async fn record(&self, event: LogEvent) -> RecordOutcome {
        match self.admit(event) {
            Admission::Done(outcome) => outcome,
            Admission::Dispatch { entry, decision } => {
                let report = self.dispatch(&entry).await;
                RecordOutcome::Emitted {
                    category: entry.category,
                    decision,
                    report,
                }
            }
        }
    }

    /// Fire-and-forget variant of [`record`](Self::record).
    ///
    /// Classification and deduplication run on the caller's thread; only the
    /// sink I/O is spawned. Outside a Tokio runtime the entry goes to stderr.
    pub fn record_detached(self: &Arc<Self>, event: LogEvent) -> Option<JoinHandle<DispatchReport>> {
        let Admission::Dispatch { entry, .. } = self.admit(event) else {
            return None;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let logger = Arc::clone(self);
                Some(handle.spawn(async move { logger.dispatch(&entry).await }))
            }
            Err(_) => {
                eprintln!("{}", entry.to_line());
                None
            }
        }
    }

    fn admit(&self, event: LogEvent) -> Admission {
        if event.level < self.settings.min_level {
            return Admission::Done(RecordOutcome::Filtered);
        }

        let error_event = event.error_event();
        let classification = self.classifier.classify(&error_event);

        let decision = if event.level.is_reportable() {
            self.limiter.should_emit_with_sample(
                &classification.fingerprint,
                &error_event.raw_message,
                Instant::now(),
            )
        } else {
            EmitDecision::passthrough()
        };

        if !decision.emit {
            trace!(fingerprint = %classification.fingerprint, count = decision.occurrence_count, "Suppressed duplicate");
            return Admission::Done(RecordOutcome::Suppressed {
                fingerprint: classification.fingerprint,
                occurrence_count: decision.occurrence_count,
            });
        }

        let (code, stack) = match event.error {
            Some(details) => (details.code, details.stack),
            None => (None, None),
        };

        let entry = LogEntry {
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed) + 1,
            timestamp: event.timestamp,
            level: event.level,
            category: classification.category,
            fingerprint: classification.fingerprint,
            message: event.message,
            code,
            stack,
            metadata: event.metadata,
            occurrence_count: decision.occurrence_count,
            is_summary: decision.is_summary,
            previous_window_count: decision.previous_window_count,
        };

        Admission::Dispatch { entry, decision }
    }

    async fn dispatch(&self, entry: &LogEntry) -> DispatchReport {
        let infrastructure = entry.category.is_infrastructure();

        let remote = async {
            if infrastructure {
                SinkDelivery::Skipped
            } else {
                self.write_remote(entry).await
            }
        };
        let (file, remote) = futures::join!(self.write_file(entry), remote);

        let console = if self.settings.console_mirror || infrastructure || !file.is_delivered() {
            self.write_console(entry).await
        } else {
            SinkDelivery::Skipped
        };

        DispatchReport {
            file,
            remote,
            console,
        }
    }

    async fn write_file(&self, entry: &LogEntry) -> SinkDelivery {
        let Some(sink) = &self.file_sink else {
            return SinkDelivery::NotConfigured;
        };

        if let Some(guard) = &self.disk_guard {
            if !guard.has_sufficient_space(&self.settings.log_dir, self.settings.min_free_bytes) {
                return SinkDelivery::ResourceConstrained;
            }
        }

        delivery(self.file_breaker.guard(|| sink.write(entry)).await)
    }

    async fn write_remote(&self, entry: &LogEntry) -> SinkDelivery {
        let Some(sink) = &self.remote_sink else {
            return SinkDelivery::NotConfigured;
        };

        delivery(self.database_breaker.guard(|| sink.write(entry)).await)
    }

    async fn write_console(&self, entry: &LogEntry) -> SinkDelivery {
        match self.console_sink.write(entry).await {
            Ok(()) => SinkDelivery::Delivered,
            Err(e) => SinkDelivery::Failed(e.to_string()),
        }
    }

    /// Snapshot for the health endpoint; only takes short-lived locks
    pub fn health(&self) -> LoggerHealth {
        LoggerHealth {
            file_circuit_breaker: self.file_breaker.snapshot(),
            database_circuit_breaker: self.database_breaker.snapshot(),
            error_stats: self.limiter.stats(Instant::now()),
            disk: self.disk_guard.as_ref().map(|g| g.snapshot()),
            remote_configured: self.remote_sink.is_some(),
        }
    }

    /// Flush every configured sink, ignoring failures
    pub async fn flush(&self) {
        if let Some(sink) = &self.file_sink {
            let _ = sink.flush().await;
        }
        if let Some(sink) = &self.remote_sink {
            let _ = sink.flush().await;
        }
        let _ = self.console_sink.flush().await;
    }
}

fn delivery(outcome: GuardOutcome<()>) -> SinkDelivery {
    match outcome {
        GuardOutcome::Completed(()) => SinkDelivery::Delivered,
        GuardOutcome::Failed(e) => SinkDelivery::Failed(e.to_string()),
        GuardOutcome::Rejected => SinkDelivery::Rejected,
    }
}
