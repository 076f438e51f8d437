//! Fatal error budget
//!
//! Counts consecutive fatal errors process-wide. When the count reaches the
//! threshold the shutdown coordinator is invoked exactly once. The count only
//! goes back to zero at an explicit recoverable checkpoint: the host decides
//! what proves forward progress, never an arbitrary success.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use logshield_domain::ErrorEvent;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::shutdown::{ShutdownCoordinator, ShutdownReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalDecision {
    /// Budget not exhausted yet
    Continue { consecutive: u32, remaining: u32 },
    /// This error exhausted the budget and ran the shutdown sequence
    ShutdownInitiated { consecutive: u32 },
    /// Shutdown had already begun; the error was not counted
    AlreadyShuttingDown,
}

#[derive(Debug, Default)]
struct FatalState {
    consecutive_count: u32,
    last_error_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    triggered: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FatalSnapshot {
    pub consecutive_count: u32,
    pub threshold: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub shutting_down: bool,
}

pub struct FatalErrorTracker {
    threshold: u32,
    state: Mutex<FatalState>,
    coordinator: Arc<ShutdownCoordinator>,
}

impl FatalErrorTracker {
    pub fn new(threshold: u32, coordinator: Arc<ShutdownCoordinator>) -> Self {
        Self {
            threshold: threshold.max(1),
            state: Mutex::new(FatalState::default()),
            coordinator,
        }
    }

    fn lock(&self) -> MutexGuard<'_, FatalState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub async fn on_fatal_error(&self, event: &ErrorEvent) -> FatalDecision {
        let reached = {
            let mut state = self.lock();
            if state.triggered || self.coordinator.is_shutting_down() {
                return FatalDecision::AlreadyShuttingDown;
            }

            state.consecutive_count = state.consecutive_count.saturating_add(1);
            state.last_error_at = Some(event.timestamp);
            state.last_error = Some(event.raw_message.clone());

            if state.consecutive_count >= self.threshold {
                state.triggered = true;
            }
            (state.triggered, state.consecutive_count)
        };

        match reached {
            (true, consecutive) => {
                error!(
                    consecutive,
                    threshold = self.threshold,
                    error = %event.raw_message,
                    "Fatal error budget exhausted"
                );
                self.coordinator
                    .initiate(ShutdownReason::FatalBudgetExhausted { consecutive })
                    .await;
                FatalDecision::ShutdownInitiated { consecutive }
            }
            (false, consecutive) => {
                let remaining = self.threshold - consecutive;
                warn!(consecutive, remaining, error = %event.raw_message, "Fatal error recorded");
                FatalDecision::Continue {
                    consecutive,
                    remaining,
                }
            }
        }
    }

    /// Called by the host at points that prove forward progress
    pub fn on_recoverable_checkpoint(&self) {
        let mut state = self.lock();
        if state.consecutive_count > 0 {
            info!(
                previous = state.consecutive_count,
                "Fatal error counter reset at recoverable checkpoint"
            );
        }
        state.consecutive_count = 0;
    }

    pub fn is_shutting_down(&self) -> bool {
        self.lock().triggered || self.coordinator.is_shutting_down()
    }

    pub fn snapshot(&self) -> FatalSnapshot {
        let state = self.lock();
        FatalSnapshot {
            consecutive_count: state.consecutive_count,
            threshold: self.threshold,
            last_error_at: state.last_error_at,
            last_error: state.last_error.clone(),
            shutting_down: state.triggered || self.coordinator.is_shutting_down(),
        }
    }
}
