//! BackoffCalculator - exponential backoff with an upper bound
//!
//! Drives the breaker cooldowns and the exception handler pump.
//!
//! ```text
//! Attempt    Delay (base=60s, x2, cap=900s)
//! ─────────────────────────────────────────
//!    0           60s
//!    1          120s
//!    2          240s
//!    3          480s
//!   >3          900s (cap)
//! ```
//!
//! The calculator is a pure function of the attempt count. The jittered
//! variant takes the random source from the caller.

use std::fmt;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Default growth factor between attempts
pub const DEFAULT_MULTIPLIER: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackoffCalculator {
    base: Duration,
    multiplier: f64,
    cap: Duration,
    /// Fraction of the delay used as the ± jitter range (0.0 disables)
    jitter_factor: f64,
}

impl BackoffCalculator {
    /// Create a calculator without jitter.
    ///
    /// A multiplier below 1.0 is clamped to 1.0 so delays never shrink.
    pub fn new(base: Duration, multiplier: f64, cap: Duration) -> Self {
        let multiplier = if multiplier.is_finite() && multiplier >= 1.0 {
            multiplier
        } else {
            1.0
        };
        Self {
            base,
            multiplier,
            cap,
            jitter_factor: 0.0,
        }
    }

    /// Doubling backoff between `base` and `cap`
    pub fn exponential(base: Duration, cap: Duration) -> Self {
        Self::new(base, DEFAULT_MULTIPLIER, cap)
    }

    pub fn with_jitter(mut self, jitter_factor: f64) -> Self {
        self.jitter_factor = jitter_factor.clamp(0.0, 1.0);
        self
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn cap(&self) -> Duration {
        self.cap
    }

    /// `min(base * multiplier^attempt, cap)`
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let raw = self.base.as_secs_f64() * self.multiplier.powi(exponent);
        let cap = self.cap.as_secs_f64();

        if !raw.is_finite() || raw >= cap {
            self.cap
        } else {
            Duration::from_secs_f64(raw)
        }
    }

    /// [`next_delay`](Self::next_delay) spread by ± `jitter_factor`, still
    /// bounded by the cap.
    pub fn next_delay_with_jitter<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let delay = self.next_delay(attempt);
        let range = delay.as_secs_f64() * self.jitter_factor;
        if range <= 0.0 {
            return delay;
        }

        let offset = rng.gen_range(-range..=range);
        let jittered = (delay.as_secs_f64() + offset).clamp(0.0, self.cap.as_secs_f64());
        Duration::from_secs_f64(jittered)
    }
}

impl fmt::Display for BackoffCalculator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Backoff(base={:?}, x{}, cap={:?}, jitter={:.0}%)",
            self.base,
            self.multiplier,
            self.cap,
            self.jitter_factor * 100.0
        )
    }
}
