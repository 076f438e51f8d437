//! Circuit Breaker for Resilience
//!
//! One breaker guards one sink. While Open the guarded operation is never
//! invoked; once the cooldown elapses a single trial is admitted, and its
//! outcome decides between Closed and another, longer, Open period.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use logshield_domain::{BackoffCalculator, SinkError};
use logshield_shared::config::{BreakerConfigDto, BreakerSettings};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// Cooldown growth across Open -> HalfOpen -> Open cycles
    pub backoff: BackoffCalculator,
    /// Upper bound for a single guarded call; exceeding it is a failure
    pub call_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            backoff: BackoffCalculator::exponential(
                Duration::from_secs(60),
                Duration::from_secs(900),
            ),
            call_timeout: Duration::from_secs(5),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn from_settings(sink: &BreakerConfigDto, settings: &BreakerSettings) -> Self {
        Self {
            failure_threshold: sink.failure_threshold,
            backoff: BackoffCalculator::new(
                Duration::from_secs(sink.base_cooldown_secs),
                settings.cooldown_multiplier,
                settings.max_cooldown(),
            ),
            call_timeout: settings.write_timeout(),
        }
    }
}

/// Result of a guarded call. Rejection is a value, not an error.
#[derive(Debug)]
pub enum GuardOutcome<T> {
    Completed(T),
    Failed(SinkError),
    /// The circuit is open (or a trial is already running); the operation
    /// was not invoked.
    Rejected,
}

impl<T> GuardOutcome<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, GuardOutcome::Completed(_))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, GuardOutcome::Rejected)
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    next_trial_at: Option<Instant>,
    current_cooldown: Duration,
    /// Failed trials since the circuit last closed
    open_cycles: u32,
    trial_in_flight: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Trial,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
    attempts: AtomicU64,
    rejections: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, CircuitBreakerConfig::default())
    }

    pub fn with_config(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let base = config.backoff.next_delay(0);
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                next_trial_at: None,
                current_cooldown: base,
                open_cycles: 0,
                trial_in_flight: false,
            }),
            attempts: AtomicU64::new(0),
            rejections: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `operation` under the breaker.
    ///
    /// The closure is only called when the breaker admits the attempt, so a
    /// rejected call performs no I/O at all.
    pub async fn guard<F, Fut, T>(&self, operation: F) -> GuardOutcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, SinkError>>,
    {
        let Some(admission) = self.try_admit() else {
            self.rejections.fetch_add(1, Ordering::Relaxed);
            return GuardOutcome::Rejected;
        };

        let mut permit = Permit {
            breaker: self,
            admission,
            resolved: false,
        };
        self.attempts.fetch_add(1, Ordering::Relaxed);

        let result = match tokio::time::timeout(self.config.call_timeout, operation()).await {
            Ok(result) => result,
            Err(_) => Err(SinkError::Timeout {
                sink: self.name.clone(),
                timeout: self.config.call_timeout,
            }),
        };
        permit.resolved = true;

        match result {
            Ok(value) => {
                self.on_success(admission);
                GuardOutcome::Completed(value)
            }
            Err(e) => {
                self.on_failure(admission, &e);
                GuardOutcome::Failed(e)
            }
        }
    }

    fn try_admit(&self) -> Option<Admission> {
        let now = Instant::now();
        let mut inner = self.lock();

        match inner.state {
            CircuitState::Closed => Some(Admission::Normal),
            CircuitState::Open => {
                let due = inner.next_trial_at.map(|at| now >= at).unwrap_or(true);
                if !due {
                    return None;
                }
                inner.state = CircuitState::HalfOpen;
                inner.trial_in_flight = true;
                info!(circuit = self.name, "Circuit transitioned to HALF_OPEN");
                Some(Admission::Trial)
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    None
                } else {
                    inner.trial_in_flight = true;
                    Some(Admission::Trial)
                }
            }
        }
    }

    fn on_success(&self, admission: Admission) {
        let mut inner = self.lock();

        match (admission, inner.state) {
            (Admission::Trial, CircuitState::HalfOpen) => {
                inner.state = CircuitState::Closed;
                inner.consecutive_failures = 0;
                inner.open_cycles = 0;
                inner.trial_in_flight = false;
                inner.opened_at = None;
                inner.next_trial_at = None;
                inner.current_cooldown = self.config.backoff.next_delay(0);
                info!(circuit = self.name, "Circuit closed");
            }
            (Admission::Normal, CircuitState::Closed) => {
                inner.consecutive_failures = 0;
            }
            // A call admitted before the circuit opened finished late
            _ => {}
        }
    }

    fn on_failure(&self, admission: Admission, cause: &SinkError) {
        let now = Instant::now();
        let mut inner = self.lock();

        match (admission, inner.state) {
            (Admission::Trial, CircuitState::HalfOpen) => {
                inner.open_cycles = inner.open_cycles.saturating_add(1);
                inner.trial_in_flight = false;
                self.open(&mut inner, now);
                error!(
                    circuit = self.name,
                    cooldown_ms = inner.current_cooldown.as_millis() as u64,
                    error = %cause,
                    "Circuit reopened"
                );
            }
            (Admission::Normal, CircuitState::Closed) => {
                inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
                let failure_count = inner.consecutive_failures;
                if failure_count >= self.config.failure_threshold.max(1) {
                    self.open(&mut inner, now);
                    error!(
                        circuit = self.name,
                        failure_count,
                        cooldown_ms = inner.current_cooldown.as_millis() as u64,
                        error = %cause,
                        "Circuit opened"
                    );
                } else {
                    debug!(circuit = self.name, failure_count, error = %cause, "Guarded call failed");
                }
            }
            _ => {}
        }
    }

    fn open(&self, inner: &mut BreakerState, now: Instant) {
        let cooldown = self.config.backoff.next_delay(inner.open_cycles);
        inner.state = CircuitState::Open;
        inner.opened_at = Some(now);
        inner.next_trial_at = Some(now + cooldown);
        inner.current_cooldown = cooldown;
    }

    /// Force the circuit closed and forget the failure history
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.open_cycles = 0;
        inner.trial_in_flight = false;
        inner.opened_at = None;
        inner.next_trial_at = None;
        inner.current_cooldown = self.config.backoff.next_delay(0);
        info!(circuit = self.name, "Circuit reset");
    }

    /// Point-in-time view for health reporting; never waits on a guarded call
    pub fn snapshot(&self) -> BreakerSnapshot {
        let now = Instant::now();
        let inner = self.lock();
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.consecutive_failures,
            cooldown_ms: inner.current_cooldown.as_millis() as u64,
            retry_in_ms: inner
                .next_trial_at
                .filter(|_| inner.state == CircuitState::Open)
                .map(|at| at.saturating_duration_since(now).as_millis() as u64),
            attempts: self.attempts.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
        }
    }
}

/// Settles an admission if the guarded future is dropped before it resolves.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    admission: Admission,
    resolved: bool,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.resolved && self.admission == Admission::Trial {
            let abandoned = SinkError::Unavailable {
                sink: self.breaker.name.clone(),
            };
            self.breaker.on_failure(Admission::Trial, &abandoned);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub cooldown_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_in_ms: Option<u64>,
    /// Operations actually invoked
    pub attempts: u64,
    /// Calls short-circuited without invoking the operation
    pub rejections: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn config(threshold: u32, base_secs: u64) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: threshold,
            backoff: BackoffCalculator::exponential(
                Duration::from_secs(base_secs),
                Duration::from_secs(base_secs * 8),
            ),
            call_timeout: Duration::from_secs(5),
        }
    }

    fn unavailable() -> SinkError {
        SinkError::Unavailable {
            sink: "test".to_string(),
        }
    }

    async fn fail(breaker: &CircuitBreaker, calls: &AtomicUsize) -> GuardOutcome<()> {
        breaker
            .guard(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(unavailable())
            })
            .await
    }

    async fn succeed(breaker: &CircuitBreaker, calls: &AtomicUsize) -> GuardOutcome<()> {
        breaker
            .guard(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
    }

    #[tokio::test]
    async fn test_circuit_stays_closed() {
        let circuit = CircuitBreaker::new("test");
        let calls = AtomicUsize::new(0);
        assert!(succeed(&circuit, &calls).await.is_completed());
        assert_eq!(circuit.state(), CircuitState::Closed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let circuit = CircuitBreaker::with_config("test", config(3, 10));
        let calls = AtomicUsize::new(0);
        fail(&circuit, &calls).await;
        fail(&circuit, &calls).await;
        succeed(&circuit, &calls).await;
        fail(&circuit, &calls).await;
        fail(&circuit, &calls).await;
        assert_eq!(circuit.state(), CircuitState::Closed);
        assert_eq!(circuit.snapshot().failure_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_opens_and_stops_calling() {
        let circuit = CircuitBreaker::with_config("test", config(5, 60));
        let calls = AtomicUsize::new(0);

        for _ in 0..5 {
            assert!(matches!(fail(&circuit, &calls).await, GuardOutcome::Failed(_)));
        }
        assert_eq!(circuit.state(), CircuitState::Open);

        for _ in 0..20 {
            assert!(succeed(&circuit, &calls).await.is_rejected());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 5);

        let snapshot = circuit.snapshot();
        assert_eq!(snapshot.attempts, 5);
        assert_eq!(snapshot.rejections, 20);
        assert_eq!(snapshot.retry_in_ms, Some(60_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_trial_closes_circuit() {
        let circuit = CircuitBreaker::with_config("test", config(1, 10));
        let calls = AtomicUsize::new(0);
        fail(&circuit, &calls).await;
        assert_eq!(circuit.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(succeed(&circuit, &calls).await.is_rejected());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(succeed(&circuit, &calls).await.is_completed());
        assert_eq!(circuit.state(), CircuitState::Closed);
        assert_eq!(circuit.snapshot().failure_count, 0);
        assert_eq!(circuit.snapshot().cooldown_ms, 10_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_trial_grows_cooldown() {
        let circuit = CircuitBreaker::with_config("test", config(1, 10));
        let calls = AtomicUsize::new(0);
        fail(&circuit, &calls).await;
        assert_eq!(circuit.snapshot().cooldown_ms, 10_000);

        tokio::time::advance(Duration::from_secs(10)).await;
        fail(&circuit, &calls).await;
        assert_eq!(circuit.state(), CircuitState::Open);
        assert_eq!(circuit.snapshot().cooldown_ms, 20_000);

        tokio::time::advance(Duration::from_secs(20)).await;
        fail(&circuit, &calls).await;
        assert_eq!(circuit.snapshot().cooldown_ms, 40_000);

        // 10 * 2^3 = 80 is the cap
        tokio::time::advance(Duration::from_secs(40)).await;
        fail(&circuit, &calls).await;
        tokio::time::advance(Duration::from_secs(80)).await;
        fail(&circuit, &calls).await;
        assert_eq!(circuit.snapshot().cooldown_ms, 80_000);

        // Recovery resets the cooldown to base
        tokio::time::advance(Duration::from_secs(80)).await;
        succeed(&circuit, &calls).await;
        assert_eq!(circuit.state(), CircuitState::Closed);
        assert_eq!(circuit.snapshot().cooldown_ms, 10_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_admits_single_trial() {
        let circuit = Arc::new(CircuitBreaker::with_config("test", config(1, 10)));
        let calls = Arc::new(AtomicUsize::new(0));
        fail(&circuit, &calls).await;
        tokio::time::advance(Duration::from_secs(10)).await;

        let pending = (0..10).map(|_| {
            let circuit = circuit.clone();
            let calls = calls.clone();
            tokio::spawn(async move {
                circuit
                    .guard(|| async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok::<_, SinkError>(())
                    })
                    .await
            })
        });
        let outcomes = futures::future::join_all(pending).await;

        let completed = outcomes
            .iter()
            .filter(|o| matches!(o, Ok(GuardOutcome::Completed(()))))
            .count();
        let rejected = outcomes
            .iter()
            .filter(|o| matches!(o, Ok(GuardOutcome::Rejected)))
            .count();
        assert_eq!(completed, 1);
        assert_eq!(rejected, 9);
        // The failing call plus exactly one trial
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(circuit.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure() {
        let circuit = CircuitBreaker::with_config("test", config(1, 10));
        let outcome = circuit
            .guard(|| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, SinkError>(())
            })
            .await;
        assert!(matches!(outcome, GuardOutcome::Failed(SinkError::Timeout { .. })));
        assert_eq!(circuit.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_trial_reopens() {
        let circuit = CircuitBreaker::with_config("test", config(1, 10));
        let calls = AtomicUsize::new(0);
        fail(&circuit, &calls).await;
        tokio::time::advance(Duration::from_secs(10)).await;

        let trial = circuit.guard(|| async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok::<_, SinkError>(())
        });
        let _ = tokio::time::timeout(Duration::from_millis(10), trial).await;

        assert_eq!(circuit.state(), CircuitState::Open);
        assert_eq!(circuit.snapshot().cooldown_ms, 20_000);
    }

    #[tokio::test]
    async fn test_circuit_reset() {
        let circuit = CircuitBreaker::with_config("test", config(1, 10));
        let calls = AtomicUsize::new(0);
        fail(&circuit, &calls).await;
        circuit.reset();
        assert_eq!(circuit.state(), CircuitState::Closed);
        assert!(succeed(&circuit, &calls).await.is_completed());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(CircuitState::HalfOpen.to_string(), "HALF_OPEN");
        assert_eq!(
            serde_json::to_string(&CircuitState::HalfOpen).unwrap(),
            "\"HALF_OPEN\""
        );
    }
}
