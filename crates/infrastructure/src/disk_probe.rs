//! sysinfo-backed disk space probe
//!
//! Resolves the volume holding a path by longest mount-point prefix. The
//! path does not need to exist yet: its nearest existing ancestor is used,
//! so the log directory can be probed before it is created.

use std::path::{Path, PathBuf};

use logshield_domain::{DiskProbeError, DiskSpaceProbe, DiskUsage};
use sysinfo::Disks;

#[derive(Debug, Default, Clone, Copy)]
pub struct SysinfoDiskProbe;

impl SysinfoDiskProbe {
    pub fn new() -> Self {
        Self
    }
}

impl DiskSpaceProbe for SysinfoDiskProbe {
    fn usage(&self, target: &Path) -> Result<DiskUsage, DiskProbeError> {
        let resolved = resolve_existing(target)?;
        let disks = Disks::new_with_refreshed_list();
        let volumes: Vec<DiskUsage> = disks
            .iter()
            .map(|d| DiskUsage {
                mount_point: d.mount_point().to_path_buf(),
                available_bytes: d.available_space(),
                total_bytes: d.total_space(),
            })
            .collect();

        select_volume(&volumes, &resolved)
            .cloned()
            .ok_or_else(|| DiskProbeError::NoMatchingVolume(target.to_path_buf()))
    }
}

/// Canonical form of `target` or of its closest existing ancestor
fn resolve_existing(target: &Path) -> Result<PathBuf, DiskProbeError> {
    let absolute = if target.is_absolute() {
        target.to_path_buf()
    } else {
        std::env::current_dir()?.join(target)
    };

    let mut candidate = absolute.as_path();
    loop {
        if candidate.exists() {
            return Ok(candidate.canonicalize()?);
        }
        match candidate.parent() {
            Some(parent) => candidate = parent,
            None => return Ok(absolute),
        }
    }
}

/// Volume whose mount point is the longest prefix of `path`
pub fn select_volume<'a>(volumes: &'a [DiskUsage], path: &Path) -> Option<&'a DiskUsage> {
    volumes
        .iter()
        .filter(|v| path.starts_with(&v.mount_point))
        .max_by_key(|v| v.mount_point.components().count())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volume(mount: &str, available: u64) -> DiskUsage {
        DiskUsage {
            mount_point: PathBuf::from(mount),
            available_bytes: available,
            total_bytes: 1 << 40,
        }
    }

    #[test]
    fn test_longest_mount_prefix_wins() {
        let volumes = vec![volume("/", 1), volume("/var", 2), volume("/var/log", 3)];

        let chosen = select_volume(&volumes, Path::new("/var/log/app")).unwrap();
        assert_eq!(chosen.available_bytes, 3);

        let chosen = select_volume(&volumes, Path::new("/home/user")).unwrap();
        assert_eq!(chosen.available_bytes, 1);
    }

    #[test]
    fn test_prefix_is_component_based() {
        let volumes = vec![volume("/", 1), volume("/var", 2)];
        let chosen = select_volume(&volumes, Path::new("/variable/data")).unwrap();
        assert_eq!(chosen.available_bytes, 1);
    }

    #[test]
    fn test_no_volume() {
        assert!(select_volume(&[], Path::new("/tmp")).is_none());
    }

    #[test]
    fn test_missing_directory_resolves_to_ancestor() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("not").join("yet");
        let resolved = resolve_existing(&missing).unwrap();
        assert_eq!(resolved, dir.path().canonicalize().unwrap());
    }
}
