//! Disk space guard for the local file sink
//!
//! The probe is consulted at most once per poll interval; between probes the
//! cached verdict is reused. Low space is reported as its own status so the
//! file sink's breaker is not tripped for a cause that is already known.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use logshield_domain::{DiskSpaceProbe, DiskUsage, SpaceStatus};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, warn};

/// Last probe result, valid for one poll interval
#[derive(Debug, Clone)]
struct CachedCheck {
    target: PathBuf,
    min_free_bytes: u64,
    usage: Option<DiskUsage>,
    status: SpaceStatus,
    checked_at: Instant,
}

impl CachedCheck {
    fn is_fresh(&self, target: &Path, min_free_bytes: u64, poll_interval: Duration) -> bool {
        self.target == target
            && self.min_free_bytes == min_free_bytes
            && self.checked_at.elapsed() < poll_interval
    }
}

pub struct DiskSpaceGuard {
    probe: Arc<dyn DiskSpaceProbe>,
    poll_interval: Duration,
    cached: Mutex<Option<CachedCheck>>,
    probes: AtomicU64,
}

impl DiskSpaceGuard {
    pub fn new(probe: Arc<dyn DiskSpaceProbe>, poll_interval: Duration) -> Self {
        Self {
            probe,
            poll_interval,
            cached: Mutex::new(None),
            probes: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<CachedCheck>> {
        self.cached.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// `false` only when the volume is known to be below `min_free_bytes`.
    ///
    /// A failing probe fails open: the write is attempted and the file
    /// breaker judges the outcome.
    pub fn has_sufficient_space(&self, target: &Path, min_free_bytes: u64) -> bool {
        self.check(target, min_free_bytes) != SpaceStatus::ResourceConstrained
    }

    /// Cached status for `target`, probing if the cache is stale
    pub fn check(&self, target: &Path, min_free_bytes: u64) -> SpaceStatus {
        let mut cached = self.lock();
        if let Some(check) = cached.as_ref() {
            if check.is_fresh(target, min_free_bytes, self.poll_interval) {
                return check.status;
            }
        }

        let previous = cached.as_ref().map(|c| c.status);
        self.probes.fetch_add(1, Ordering::Relaxed);

        let (usage, status) = match self.probe.usage(target) {
            Ok(usage) if usage.available_bytes < min_free_bytes => {
                (Some(usage), SpaceStatus::ResourceConstrained)
            }
            Ok(usage) => (Some(usage), SpaceStatus::Sufficient),
            Err(e) => {
                warn!(target = %target.display(), error = %e, "Disk space probe failed");
                (None, SpaceStatus::Unknown)
            }
        };

        match (previous, status) {
            (Some(SpaceStatus::ResourceConstrained), SpaceStatus::ResourceConstrained) => {}
            (_, SpaceStatus::ResourceConstrained) => {
                let available = usage.as_ref().map(|u| u.available_bytes).unwrap_or(0);
                warn!(
                    target = %target.display(),
                    available_bytes = available,
                    min_free_bytes,
                    "Log volume below minimum free space; file writes suspended"
                );
            }
            (Some(SpaceStatus::ResourceConstrained), SpaceStatus::Sufficient) => {
                info!(target = %target.display(), "Log volume has free space again");
            }
            _ => {}
        }

        *cached = Some(CachedCheck {
            target: target.to_path_buf(),
            min_free_bytes,
            usage,
            status,
            checked_at: Instant::now(),
        });
        status
    }

    /// Status of the most recent check, without probing
    pub fn space_status(&self) -> SpaceStatus {
        self.lock()
            .as_ref()
            .map(|c| c.status)
            .unwrap_or(SpaceStatus::Unknown)
    }

    /// Number of times the probe was actually consulted
    pub fn probe_count(&self) -> u64 {
        self.probes.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> DiskStatusSnapshot {
        let cached = self.lock();
        match cached.as_ref() {
            Some(check) => DiskStatusSnapshot {
                status: check.status,
                target: Some(check.target.clone()),
                available_bytes: check.usage.as_ref().map(|u| u.available_bytes),
                min_free_bytes: Some(check.min_free_bytes),
                checked_ms_ago: Some(check.checked_at.elapsed().as_millis() as u64),
            },
            None => DiskStatusSnapshot {
                status: SpaceStatus::Unknown,
                target: None,
                available_bytes: None,
                min_free_bytes: None,
                checked_ms_ago: None,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskStatusSnapshot {
    pub status: SpaceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_free_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checked_ms_ago: Option<u64>,
}
