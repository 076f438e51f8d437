//! Disk space port

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Free/total space of the volume holding a path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskUsage {
    pub mount_point: PathBuf,
    pub available_bytes: u64,
    pub total_bytes: u64,
}

#[derive(Debug, Error)]
pub enum DiskProbeError {
    #[error("No mounted volume found for {0}")]
    NoMatchingVolume(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reads the free space of the volume holding `target`.
///
/// Implementations may be slow; callers are expected to cache.
pub trait DiskSpaceProbe: Send + Sync {
    fn usage(&self, target: &Path) -> Result<DiskUsage, DiskProbeError>;
}

/// Outcome of the last space check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpaceStatus {
    Sufficient,
    /// Below the configured minimum; a known cause, not a sink fault
    ResourceConstrained,
    /// Not probed yet, or the probe failed
    Unknown,
}
