//! Error rate limiter / deduplicator
//!
//! Tracks one [`OccurrenceRecord`] per fingerprint in a fixed window that
//! starts at the fingerprint's first occurrence. The first occurrence in a
//! window is emitted; after that only every Nth duplicate is, as a summary
//! carrying the running count. For K identical errors in one window the
//! number of emissions is `1 + (K - 1) / N`.
//!
//! Records survive window rollover and are only dropped after a period of
//! inactivity, so the first entry of a new window can report how many
//! occurrences the previous window absorbed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use logshield_domain::Fingerprint;
use logshield_shared::config::DedupConfig;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

/// Entries listed in [`ErrorStats::top_errors`]
pub const TOP_ERRORS_LIMIT: usize = 10;

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub window: Duration,
    pub summary_every: u64,
    pub inactivity_timeout: Duration,
    pub max_tracked_fingerprints: usize,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self::from(&DedupConfig::default())
    }
}

impl From<&DedupConfig> for RateLimiterConfig {
    fn from(config: &DedupConfig) -> Self {
        Self {
            window: config.window(),
            summary_every: config.summary_every,
            inactivity_timeout: config.inactivity_timeout(),
            max_tracked_fingerprints: config.max_tracked_fingerprints,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OccurrenceRecord {
    pub fingerprint: Fingerprint,
    pub first_seen_at: Instant,
    pub last_seen_at: Instant,
    pub window_started_at: Instant,
    pub count_in_window: u64,
    pub total_count: u64,
    /// Message of the first occurrence, for stats output
    pub sample: Option<String>,
}

/// Verdict for one occurrence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmitDecision {
    pub emit: bool,
    /// Running count of this fingerprint in the current window
    pub occurrence_count: u64,
    pub is_summary: bool,
    /// Set on the first occurrence after a window rollover
    pub previous_window_count: Option<u64>,
}

impl EmitDecision {
    /// Decision for events that bypass deduplication
    pub fn passthrough() -> Self {
        Self {
            emit: true,
            occurrence_count: 1,
            is_summary: false,
            previous_window_count: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopError {
    pub fingerprint: Fingerprint,
    pub count: u64,
    pub total_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorStats {
    /// Occurrences across all fingerprints with an active window
    pub total_errors: u64,
    /// Fingerprints with an active window
    pub unique_errors: u64,
    pub top_errors: Vec<TopError>,
    /// Occurrences suppressed since startup
    pub suppressed_total: u64,
}

#[derive(Debug)]
pub struct ErrorRateLimiter {
    config: RateLimiterConfig,
    records: DashMap<Fingerprint, OccurrenceRecord>,
    suppressed: AtomicU64,
}

impl ErrorRateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            records: DashMap::new(),
            suppressed: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    pub fn should_emit(&self, fingerprint: &Fingerprint, now: Instant) -> EmitDecision {
        self.observe(fingerprint, None, now)
    }

    /// Like [`should_emit`](Self::should_emit), keeping `sample` as the
    /// record's message when the fingerprint is new.
    pub fn should_emit_with_sample(
        &self,
        fingerprint: &Fingerprint,
        sample: &str,
        now: Instant,
    ) -> EmitDecision {
        self.observe(fingerprint, Some(sample), now)
    }

    fn observe(&self, fingerprint: &Fingerprint, sample: Option<&str>, now: Instant) -> EmitDecision {
        let every = self.config.summary_every.max(1);

        let decision = {
            // The entry guard holds the shard lock: read-and-increment is atomic
            // per fingerprint.
            let mut record = self
                .records
                .entry(fingerprint.clone())
                .or_insert_with(|| OccurrenceRecord {
                    fingerprint: fingerprint.clone(),
                    first_seen_at: now,
                    last_seen_at: now,
                    window_started_at: now,
                    count_in_window: 0,
                    total_count: 0,
                    sample: sample.map(str::to_string),
                });

            let mut previous_window_count = None;
            if record.count_in_window > 0
                && now.saturating_duration_since(record.window_started_at) >= self.config.window
            {
                previous_window_count = Some(record.count_in_window);
                record.window_started_at = now;
                record.count_in_window = 0;
            }

            record.count_in_window += 1;
            record.total_count += 1;
            record.last_seen_at = now;

            let count = record.count_in_window;
            if count == 1 {
                EmitDecision {
                    emit: true,
                    occurrence_count: count,
                    is_summary: false,
                    previous_window_count,
                }
            } else if (count - 1) % every == 0 {
                EmitDecision {
                    emit: true,
                    occurrence_count: count,
                    is_summary: true,
                    previous_window_count: None,
                }
            } else {
                EmitDecision {
                    emit: false,
                    occurrence_count: count,
                    is_summary: false,
                    previous_window_count: None,
                }
            }
        };

        if !decision.emit {
            self.suppressed.fetch_add(1, Ordering::Relaxed);
        }

        if self.records.len() > self.config.max_tracked_fingerprints {
            self.prune(now);
        }

        decision
    }

    /// Drop records idle for longer than the inactivity timeout
    pub fn prune(&self, now: Instant) -> usize {
        let before = self.records.len();
        let timeout = self.config.inactivity_timeout;
        self.records
            .retain(|_, record| now.saturating_duration_since(record.last_seen_at) < timeout);
        let removed = before.saturating_sub(self.records.len());
        if removed > 0 {
            debug!(removed, remaining = self.records.len(), "Pruned stale error fingerprints");
        }
        removed
    }

    pub fn tracked_fingerprints(&self) -> usize {
        self.records.len()
    }

    pub fn record(&self, fingerprint: &Fingerprint) -> Option<OccurrenceRecord> {
        self.records.get(fingerprint).map(|r| r.clone())
    }

    /// Totals over fingerprints whose window is still active at `now`
    pub fn stats(&self, now: Instant) -> ErrorStats {
        let mut active: Vec<TopError> = self
            .records
            .iter()
            .filter(|r| now.saturating_duration_since(r.window_started_at) < self.config.window)
            .map(|r| TopError {
                fingerprint: r.fingerprint.clone(),
                count: r.count_in_window,
                total_count: r.total_count,
                message: r.sample.clone(),
            })
            .collect();

        let total_errors = active.iter().map(|e| e.count).sum();
        let unique_errors = active.len() as u64;

        active.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.fingerprint.cmp(&b.fingerprint)));
        active.truncate(TOP_ERRORS_LIMIT);

        ErrorStats {
            total_errors,
            unique_errors,
            top_errors: active,
            suppressed_total: self.suppressed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::Arc;

    fn limiter(summary_every: u64) -> ErrorRateLimiter {
        ErrorRateLimiter::new(RateLimiterConfig {
            window: Duration::from_secs(60),
            summary_every,
            inactivity_timeout: Duration::from_secs(300),
            max_tracked_fingerprints: 1000,
        })
    }

    fn fp(s: &str) -> Fingerprint {
        Fingerprint::from_raw(s)
    }

    #[test]
    fn test_first_occurrence_emits() {
        let limiter = limiter(100);
        let decision = limiter.should_emit(&fp("a"), Instant::now());
        assert_eq!(decision, EmitDecision::passthrough());
    }

    #[test]
    fn test_thousand_duplicates_emit_ten_times() {
        let limiter = limiter(100);
        let now = Instant::now();

        let emitted: Vec<EmitDecision> = (0..1000)
            .map(|_| limiter.should_emit(&fp("storm"), now))
            .filter(|d| d.emit)
            .collect();

        assert_eq!(emitted.len(), 10);
        assert!(!emitted[0].is_summary);
        assert!(emitted[1..].iter().all(|d| d.is_summary));
        assert_eq!(emitted[1].occurrence_count, 101);
        assert_eq!(emitted[9].occurrence_count, 901);

        let stats = limiter.stats(now);
        assert_eq!(stats.total_errors, 1000);
        assert_eq!(stats.unique_errors, 1);
        assert_eq!(stats.suppressed_total, 990);
    }

    #[rstest]
    #[case(1, 100, 1)]
    #[case(2, 100, 1)]
    #[case(100, 100, 1)]
    #[case(101, 100, 2)]
    #[case(250, 100, 3)]
    #[case(10, 1, 10)]
    #[case(7, 3, 3)]
    fn test_emission_count_formula(#[case] k: u64, #[case] n: u64, #[case] expected: usize) {
        let limiter = limiter(n);
        let now = Instant::now();
        let emitted = (0..k)
            .filter(|_| limiter.should_emit(&fp("x"), now).emit)
            .count();
        assert_eq!(emitted, expected);
        assert_eq!(expected as u64, 1 + (k - 1) / n);
    }

    #[test]
    fn test_window_rollover_reports_previous_count() {
        let limiter = limiter(100);
        let start = Instant::now();
        for _ in 0..340 {
            limiter.should_emit(&fp("a"), start);
        }

        let later = start + Duration::from_secs(61);
        let decision = limiter.should_emit(&fp("a"), later);
        assert!(decision.emit);
        assert!(!decision.is_summary);
        assert_eq!(decision.occurrence_count, 1);
        assert_eq!(decision.previous_window_count, Some(340));

        let record = limiter.record(&fp("a")).unwrap();
        assert_eq!(record.total_count, 341);
        assert_eq!(record.count_in_window, 1);
        assert_eq!(record.first_seen_at, start);
    }

    #[test]
    fn test_distinct_fingerprints_are_independent() {
        let limiter = limiter(100);
        let now = Instant::now();
        assert!(limiter.should_emit(&fp("a"), now).emit);
        assert!(limiter.should_emit(&fp("b"), now).emit);
        assert!(!limiter.should_emit(&fp("a"), now).emit);
        assert_eq!(limiter.stats(now).unique_errors, 2);
    }

    #[test]
    fn test_records_retained_until_inactive() {
        let limiter = limiter(100);
        let start = Instant::now();
        limiter.should_emit(&fp("a"), start);

        // Past the window: out of the stats but still tracked
        let after_window = start + Duration::from_secs(120);
        assert_eq!(limiter.stats(after_window).unique_errors, 0);
        assert_eq!(limiter.prune(after_window), 0);
        assert_eq!(limiter.tracked_fingerprints(), 1);

        let after_timeout = start + Duration::from_secs(300);
        assert_eq!(limiter.prune(after_timeout), 1);
        assert_eq!(limiter.tracked_fingerprints(), 0);
    }

    #[test]
    fn test_opportunistic_prune_bounds_table() {
        let limiter = ErrorRateLimiter::new(RateLimiterConfig {
            max_tracked_fingerprints: 3,
            ..limiter(100).config().clone()
        });
        let start = Instant::now();
        for name in ["a", "b", "c"] {
            limiter.should_emit(&fp(name), start);
        }

        let later = start + Duration::from_secs(301);
        limiter.should_emit(&fp("d"), later);
        assert_eq!(limiter.tracked_fingerprints(), 1);
        assert!(limiter.record(&fp("d")).is_some());
    }

    #[test]
    fn test_top_errors_sorted_and_bounded() {
        let limiter = limiter(100);
        let now = Instant::now();
        for i in 0..15u64 {
            let name = format!("err-{:02}", i);
            for _ in 0..=i {
                limiter.should_emit_with_sample(&fp(&name), &format!("message {}", i), now);
            }
        }

        let stats = limiter.stats(now);
        assert_eq!(stats.unique_errors, 15);
        assert_eq!(stats.top_errors.len(), TOP_ERRORS_LIMIT);
        assert_eq!(stats.top_errors[0].fingerprint, fp("err-14"));
        assert_eq!(stats.top_errors[0].count, 15);
        assert_eq!(stats.top_errors[0].message.as_deref(), Some("message 14"));
        assert!(stats
            .top_errors
            .windows(2)
            .all(|pair| pair[0].count >= pair[1].count));
    }

    #[test]
    fn test_concurrent_reports_lose_no_updates() {
        let limiter = Arc::new(limiter(100));
        let now = Instant::now();

        let emitted: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let limiter = limiter.clone();
                    scope.spawn(move || {
                        (0..125)
                            .filter(|_| limiter.should_emit(&fp("shared"), now).emit)
                            .count()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(emitted, 10);
        assert_eq!(limiter.record(&fp("shared")).unwrap().total_count, 1000);
    }
}
