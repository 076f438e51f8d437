//! Periodic error stats report
//!
//! Background worker that prunes idle fingerprints and logs the current
//! error totals at a fixed interval until shutdown begins.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{info, warn};

use super::rate_limiter::{ErrorRateLimiter, ErrorStats};
use crate::lifecycle::ShutdownState;

/// Active occurrences above which the report is logged as a warning
pub const DEFAULT_WARN_THRESHOLD: u64 = 100;

pub struct ErrorStatsReporter {
    limiter: Arc<ErrorRateLimiter>,
    interval: Duration,
    warn_threshold: u64,
    shutdown: watch::Receiver<ShutdownState>,
}

impl ErrorStatsReporter {
    pub fn new(
        limiter: Arc<ErrorRateLimiter>,
        interval: Duration,
        shutdown: watch::Receiver<ShutdownState>,
    ) -> Self {
        Self {
            limiter,
            interval,
            warn_threshold: DEFAULT_WARN_THRESHOLD,
            shutdown,
        }
    }

    pub fn with_warn_threshold(mut self, threshold: u64) -> Self {
        self.warn_threshold = threshold;
        self
    }

    /// One report: prune, then log the totals if there is anything to say
    pub fn report_once(&self) -> ErrorStats {
        let now = Instant::now();
        self.limiter.prune(now);
        let stats = self.limiter.stats(now);

        if stats.total_errors > self.warn_threshold {
            let top = stats.top_errors.first();
            warn!(
                total_errors = stats.total_errors,
                unique_errors = stats.unique_errors,
                suppressed_total = stats.suppressed_total,
                top_fingerprint = top.map(|t| t.fingerprint.as_str()).unwrap_or("-"),
                top_count = top.map(|t| t.count).unwrap_or(0),
                "High error rate"
            );
        } else if stats.total_errors > 0 {
            info!(
                total_errors = stats.total_errors,
                unique_errors = stats.unique_errors,
                suppressed_total = stats.suppressed_total,
                "Error stats"
            );
        }

        stats
    }

    pub async fn run(mut self) {
        info!(interval = ?self.interval, "Starting error stats reporter");

        let mut interval = time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        interval.tick().await;

        loop {
            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() != ShutdownState::Running {
                        info!("Error stats reporter shutting down");
                        break;
                    }
                }
                _ = interval.tick() => {
                    self.report_once();
                }
            }
        }
    }
}
