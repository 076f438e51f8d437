//! Global exception handlers
//!
//! Uncaught failures (panics and failed supervised tasks) do not travel up
//! call stacks. They are pushed into an explicit channel through a
//! [`FatalReporter`], and a single pump task delivers each one to the two
//! process-lifecycle listeners: the resilient logger and the fatal error
//! tracker.
//!
//! Every failure is logged and counted as soon as the pump takes it. After an
//! infrastructure failure the pump may pause before taking the next one: the
//! first failure of a burst opens a jittered exponential backoff window and
//! pays its delay, failures arriving inside the window go straight through.
//! Windows that see more failures climb the attempt; quiet ones and
//! application failures lower it.
//!
//! The queue is bounded. Once shutdown has begun, queued failures are
//! coalesced instead of logged.

use std::any::Any;
use std::fmt;
use std::panic::PanicHookInfo;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use logshield_domain::{BackoffCalculator, ErrorDetails, LogEvent};
use logshield_shared::config::FatalConfig;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::fatal_tracker::{FatalDecision, FatalErrorTracker};
use crate::logger::ResilientLogger;

/// Highest backoff attempt the handler pump climbs to
pub const MAX_HANDLER_BACKOFF_ATTEMPT: u32 = 10;

/// ± fraction applied to handler backoff delays
pub const HANDLER_BACKOFF_JITTER: f64 = 0.2;

/// Uncaught failures waiting for the pump
pub const FAILURE_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Panic,
    TaskFailure,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Panic => write!(f, "panic"),
            FailureKind::TaskFailure => write!(f, "task failure"),
        }
    }
}

/// A failure nobody handled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncaughtFailure {
    pub kind: FailureKind,
    /// Task name or source location
    pub origin: String,
    pub error: ErrorDetails,
    pub timestamp: DateTime<Utc>,
}

impl UncaughtFailure {
    pub fn new(kind: FailureKind, origin: impl Into<String>, error: ErrorDetails) -> Self {
        Self {
            kind,
            origin: origin.into(),
            error,
            timestamp: Utc::now(),
        }
    }

    pub fn to_log_event(&self) -> LogEvent {
        let mut event = LogEvent::fatal(format!(
            "Uncaught {} in {}: {}",
            self.kind, self.origin, self.error.message
        ))
        .with_error(self.error.clone())
        .with_metadata("origin", self.origin.clone())
        .with_metadata("kind", self.kind.to_string());
        event.timestamp = self.timestamp;
        event
    }
}

/// Sending half of the uncaught failure channel. Cheap to clone.
#[derive(Clone)]
pub struct FatalReporter {
    tx: mpsc::Sender<UncaughtFailure>,
    panic_hook_installed: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
}

impl FatalReporter {
    pub fn channel() -> (Self, mpsc::Receiver<UncaughtFailure>) {
        Self::with_capacity(FAILURE_QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> (Self, mpsc::Receiver<UncaughtFailure>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                panic_hook_installed: Arc::new(AtomicBool::new(false)),
                dropped: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    /// Queue a failure without blocking.
    ///
    /// `false` when it was not queued: the queue is full (the failure is
    /// dropped and counted) or the pump is gone.
    pub fn report(&self, failure: UncaughtFailure) -> bool {
        match self.tx.try_send(failure) {
            Ok(()) => true,
            Err(TrySendError::Full(failure)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(origin = %failure.origin, dropped, "Uncaught failure queue full; failure dropped");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Failures dropped because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn report_panic(&self, origin: impl Into<String>, message: impl Into<String>) -> bool {
        self.report(UncaughtFailure::new(
            FailureKind::Panic,
            origin,
            ErrorDetails::new(message),
        ))
    }

    pub fn report_task_failure(
        &self,
        origin: impl Into<String>,
        error: &(dyn std::error::Error + 'static),
    ) -> bool {
        self.report(UncaughtFailure::new(
            FailureKind::TaskFailure,
            origin,
            ErrorDetails::from_error(error),
        ))
    }

    pub fn panic_hook_installed(&self) -> bool {
        self.panic_hook_installed.load(Ordering::SeqCst)
    }

    /// Watch a task and report it if it returns an error or panics.
    ///
    /// Panics are only reported here when no panic hook is installed; the
    /// hook has already seen them otherwise. Cancellation is not a failure.
    pub fn supervise<T, E>(
        &self,
        name: impl Into<String>,
        handle: JoinHandle<Result<T, E>>,
    ) -> JoinHandle<()>
    where
        T: Send + 'static,
        E: Into<anyhow::Error> + Send + 'static,
    {
        let reporter = self.clone();
        let name = name.into();
        tokio::spawn(async move {
            match handle.await {
                Ok(Ok(_)) => debug!(task = %name, "Supervised task finished"),
                Ok(Err(e)) => {
                    let error: anyhow::Error = e.into();
                    reporter.report_task_failure(name, error.as_ref());
                }
                Err(join_error) if join_error.is_panic() => {
                    if !reporter.panic_hook_installed() {
                        let message = panic_message(join_error.into_panic().as_ref());
                        reporter.report_panic(name, message);
                    }
                }
                Err(_) => debug!(task = %name, "Supervised task cancelled"),
            }
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}

/// Chain a panic hook that forwards every panic to `reporter`.
///
/// The previous hook still runs, so the default panic message is kept.
pub fn install_panic_hook(reporter: FatalReporter) {
    reporter.panic_hook_installed.store(true, Ordering::SeqCst);
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info: &PanicHookInfo<'_>| {
        let origin = info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());
        let thread = std::thread::current()
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| "unnamed".to_string());
        reporter.report(UncaughtFailure::new(
            FailureKind::Panic,
            format!("thread '{}' at {}", thread, origin),
            ErrorDetails::new(panic_message(info.payload())),
        ));
        previous(info);
    }));
}

#[derive(Debug, Clone)]
pub struct HandlerOptions {
    pub backoff: BackoffCalculator,
    pub install_panic_hook: bool,
}

impl HandlerOptions {
    pub fn from_config(config: &FatalConfig) -> Self {
        Self {
            backoff: BackoffCalculator::exponential(
                Duration::from_millis(config.handler_backoff_base_ms),
                Duration::from_millis(config.handler_backoff_max_ms),
            )
            .with_jitter(HANDLER_BACKOFF_JITTER),
            install_panic_hook: true,
        }
    }
}

impl Default for HandlerOptions {
    fn default() -> Self {
        Self::from_config(&FatalConfig::default())
    }
}

/// Running handler pump plus the reporter feeding it
pub struct GlobalExceptionHandlers {
    reporter: FatalReporter,
    pump: JoinHandle<()>,
}

impl GlobalExceptionHandlers {
    /// Must be called inside a Tokio runtime.
    pub fn install(
        logger: Arc<ResilientLogger>,
        tracker: Arc<FatalErrorTracker>,
        options: HandlerOptions,
    ) -> Self {
        let (reporter, rx) = FatalReporter::channel();
        if options.install_panic_hook {
            install_panic_hook(reporter.clone());
        }
        let pump = tokio::spawn(pump(rx, logger, tracker, options.backoff));
        Self { reporter, pump }
    }

    pub fn reporter(&self) -> FatalReporter {
        self.reporter.clone()
    }

    /// Stop delivering failures. The panic hook, if any, stays chained but
    /// its reports are dropped.
    pub fn shutdown(self) {
        self.pump.abort();
    }
}

/// Backoff windows between infrastructure failures
struct HandlerThrottle {
    backoff: BackoffCalculator,
    rng: StdRng,
    attempt: u32,
    window_until: Option<Instant>,
    window_busy: bool,
}

impl HandlerThrottle {
    fn new(backoff: BackoffCalculator) -> Self {
        Self {
            backoff,
            rng: StdRng::from_entropy(),
            attempt: 0,
            window_until: None,
            window_busy: false,
        }
    }

    /// Delay to pay after an infrastructure failure; `None` inside an open
    /// window. A window lasts twice its delay.
    fn on_infrastructure(&mut self, now: Instant) -> Option<Duration> {
        if let Some(until) = self.window_until {
            if now < until {
                self.window_busy = true;
                return None;
            }
            if !self.window_busy {
                self.attempt = self.attempt.saturating_sub(1);
            }
        }

        let delay = self.backoff.next_delay_with_jitter(self.attempt, &mut self.rng);
        self.attempt = (self.attempt + 1).min(MAX_HANDLER_BACKOFF_ATTEMPT);
        self.window_until = Some(now + delay * 2);
        self.window_busy = false;
        Some(delay)
    }

    fn on_application(&mut self) {
        self.attempt = self.attempt.saturating_sub(1);
    }
}

async fn pump(
    mut rx: mpsc::Receiver<UncaughtFailure>,
    logger: Arc<ResilientLogger>,
    tracker: Arc<FatalErrorTracker>,
    backoff: BackoffCalculator,
) {
    let mut throttle = HandlerThrottle::new(backoff);
    let mut coalesced: u64 = 0;

    while let Some(failure) = rx.recv().await {
        if tracker.is_shutting_down() {
            coalesced += 1;
            debug!(origin = %failure.origin, coalesced, "Shutdown in progress; uncaught failure coalesced");
            continue;
        }

        let event = failure.to_log_event();
        let error_event = event.error_event();
        let infrastructure = logger.classifier().category(&error_event).is_infrastructure();

        logger.record(event).await;

        if let FatalDecision::ShutdownInitiated { consecutive } =
            tracker.on_fatal_error(&error_event).await
        {
            warn!(consecutive, "Uncaught failures triggered shutdown");
            continue;
        }

        if infrastructure {
            if let Some(delay) = throttle.on_infrastructure(Instant::now()) {
                warn!(
                    origin = %failure.origin,
                    delay_ms = delay.as_millis() as u64,
                    attempt = throttle.attempt,
                    "Infrastructure failure; backing off before the next one"
                );
                tokio::time::sleep(delay).await;
            }
        } else {
            throttle.on_application();
        }
    }

    debug!(coalesced, "Uncaught failure channel closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_becomes_fatal_event() {
        let failure = UncaughtFailure::new(
            FailureKind::TaskFailure,
            "sync-worker",
            ErrorDetails::new("ENOSPC: no space left on device").with_code("ENOSPC"),
        );
        let event = failure.to_log_event();

        assert_eq!(event.level, logshield_domain::Severity::Fatal);
        assert_eq!(event.message, "Uncaught task failure in sync-worker: ENOSPC: no space left on device");
        assert_eq!(event.metadata["origin"], "sync-worker");
        assert_eq!(event.error_event().code.as_deref(), Some("ENOSPC"));
        assert_eq!(event.timestamp, failure.timestamp);
    }

    #[test]
    fn test_panic_message_payloads() {
        let literal: Box<dyn Any + Send> = Box::new("boom");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned boom"));
        let other: Box<dyn Any + Send> = Box::new(42_u8);

        assert_eq!(panic_message(literal.as_ref()), "boom");
        assert_eq!(panic_message(owned.as_ref()), "owned boom");
        assert_eq!(panic_message(other.as_ref()), "Box<dyn Any>");
    }

    #[tokio::test]
    async fn test_supervise_reports_errors_not_successes() {
        let (reporter, mut rx) = FatalReporter::channel();

        let ok = tokio::spawn(async { Ok::<_, std::io::Error>(()) });
        reporter.supervise("ok-task", ok).await.unwrap();

        let failing = tokio::spawn(async {
            Err::<(), _>(std::io::Error::from_raw_os_error(28))
        });
        reporter.supervise("writer", failing).await.unwrap();

        let failure = rx.try_recv().expect("task failure reported");
        assert_eq!(failure.kind, FailureKind::TaskFailure);
        assert_eq!(failure.origin, "writer");
        assert_eq!(failure.error.code.as_deref(), Some("ENOSPC"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_supervise_reports_panics_without_hook() {
        let (reporter, mut rx) = FatalReporter::channel();

        let panicking = tokio::spawn(async {
            let buggy = true;
            if buggy {
                panic!("index out of range");
            }
            Ok::<(), std::io::Error>(())
        });
        reporter.supervise("indexer", panicking).await.unwrap();

        let failure = rx.try_recv().expect("panic reported");
        assert_eq!(failure.kind, FailureKind::Panic);
        assert_eq!(failure.error.message, "index out of range");
    }

    #[test]
    fn test_full_queue_drops_and_counts() {
        let (reporter, mut rx) = FatalReporter::with_capacity(2);

        assert!(reporter.report_panic("a", "first"));
        assert!(reporter.report_panic("b", "second"));
        assert!(!reporter.report_panic("c", "third"));
        assert_eq!(reporter.dropped(), 1);

        assert_eq!(rx.try_recv().unwrap().origin, "a");
        assert_eq!(rx.try_recv().unwrap().origin, "b");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_queue_rejects() {
        let (reporter, rx) = FatalReporter::channel();
        drop(rx);
        assert!(!reporter.report_panic("late", "nobody listening"));
        assert_eq!(reporter.dropped(), 0);
    }

    fn throttle() -> HandlerThrottle {
        HandlerThrottle::new(BackoffCalculator::exponential(
            Duration::from_millis(100),
            Duration::from_secs(30),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_waits_once_per_window() {
        let mut throttle = throttle();
        let start = Instant::now();

        assert_eq!(throttle.on_infrastructure(start), Some(Duration::from_millis(100)));
        for ms in [0, 50, 100, 199] {
            assert_eq!(throttle.on_infrastructure(start + Duration::from_millis(ms)), None);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_climbs_while_busy_and_decays_when_quiet() {
        let mut throttle = throttle();
        let start = Instant::now();

        assert_eq!(throttle.on_infrastructure(start), Some(Duration::from_millis(100)));
        assert_eq!(throttle.on_infrastructure(start + Duration::from_millis(150)), None);

        // Busy window: the next one is longer
        let second = start + Duration::from_millis(200);
        assert_eq!(throttle.on_infrastructure(second), Some(Duration::from_millis(200)));
        assert_eq!(throttle.attempt, 2);

        // Quiet window: back down one step
        let third = second + Duration::from_secs(5);
        assert_eq!(throttle.on_infrastructure(third), Some(Duration::from_millis(200)));
        assert_eq!(throttle.attempt, 2);

        throttle.on_application();
        throttle.on_application();
        throttle.on_application();
        assert_eq!(throttle.attempt, 0);
    }

    #[test]
    fn test_handler_backoff_is_jittered() {
        let options = HandlerOptions::default();
        assert!(options.backoff.to_string().contains("jitter=20%"));
    }

    #[tokio::test]
    async fn test_supervise_ignores_cancellation() {
        let (reporter, mut rx) = FatalReporter::channel();

        let forever = tokio::spawn(async {
            std::future::pending::<()>().await;
            Ok::<(), std::io::Error>(())
        });
        forever.abort();
        reporter.supervise("aborted", forever).await.unwrap();

        assert!(rx.try_recv().is_err());
    }
}
