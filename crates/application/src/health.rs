//! Health report
//!
//! Combines the logger's breaker/dedup/disk view, the fatal error budget and
//! optional host metrics into one serializable document. Nothing here waits
//! on sink I/O.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use logshield_domain::{HealthStatus, HostMetrics, HostMetricsProvider, SpaceStatus};
use serde::{Deserialize, Serialize};

use crate::lifecycle::{FatalErrorTracker, FatalSnapshot};
use crate::logger::{LoggerHealth, ResilientLogger};
use crate::resilience::CircuitState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub logger: LoggerHealth,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fatal: Option<FatalSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<HostMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_error: Option<String>,
}

pub struct HealthReporter {
    logger: Arc<ResilientLogger>,
    tracker: Option<Arc<FatalErrorTracker>>,
    host_metrics: Option<Arc<dyn HostMetricsProvider>>,
}

impl HealthReporter {
    pub fn new(logger: Arc<ResilientLogger>) -> Self {
        Self {
            logger,
            tracker: None,
            host_metrics: None,
        }
    }

    pub fn with_fatal_tracker(mut self, tracker: Arc<FatalErrorTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn with_host_metrics(mut self, provider: Arc<dyn HostMetricsProvider>) -> Self {
        self.host_metrics = Some(provider);
        self
    }

    pub fn report(&self) -> HealthReport {
        let logger = self.logger.health();
        let fatal = self.tracker.as_ref().map(|t| t.snapshot());

        let (host, host_error) = match &self.host_metrics {
            Some(provider) => match provider.collect() {
                Ok(metrics) => (Some(metrics), None),
                Err(e) => (None, Some(e.to_string())),
            },
            None => (None, None),
        };

        HealthReport {
            status: overall_status(&logger, fatal.as_ref()),
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            logger,
            fatal,
            host,
            host_error,
        }
    }
}

fn overall_status(logger: &LoggerHealth, fatal: Option<&FatalSnapshot>) -> HealthStatus {
    if fatal.is_some_and(|f| f.shutting_down) {
        return HealthStatus::ShuttingDown;
    }

    let remote_down = logger.remote_configured
        && logger.database_circuit_breaker.state != CircuitState::Closed;
    let file_down = logger.file_circuit_breaker.state != CircuitState::Closed;
    let disk_low = logger
        .disk
        .as_ref()
        .is_some_and(|d| d.status == SpaceStatus::ResourceConstrained);

    if remote_down || file_down || disk_low {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}
