//! Health report types and the host metrics port
//!
//! The logger produces the subsystem part of the report; host figures come
//! from an optional [`HostMetricsProvider`] supplied by the embedding process.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Overall status of the subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    /// A breaker is not closed or the log volume is short on space
    Degraded,
    /// The fatal budget was exhausted and shutdown has begun
    ShuttingDown,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

/// Process and system figures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostMetrics {
    pub pid: u32,
    pub uptime_secs: u64,
    pub process_memory_bytes: u64,
    pub total_memory_bytes: u64,
    pub used_memory_bytes: u64,
    /// 1, 5 and 15 minute load averages
    pub load_average: [f64; 3],
    pub cpu_count: usize,
}

#[derive(Debug, Error)]
#[error("Host metrics unavailable: {0}")]
pub struct HostMetricsError(pub String);

pub trait HostMetricsProvider: Send + Sync {
    fn collect(&self) -> Result<HostMetrics, HostMetricsError>;
}
