#![allow(dead_code)]
//! Common test infrastructure for the containment tests
//!
//! Provides:
//! - RecordingSink: in-memory sink with a failure switch and an attempt counter
//! - FakeDiskProbe: disk probe reporting a settable amount of free space
//! - RecordingTerminator: captures exit codes instead of exiting
//! - word(): distinct, digit-free messages that never share a fingerprint

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use logshield_application::lifecycle::ProcessTerminator;
use logshield_domain::{
    DiskProbeError, DiskSpaceProbe, DiskUsage, LogEntry, LogSink, SinkError, SinkKind,
};

pub struct RecordingSink {
    name: String,
    kind: SinkKind,
    failing: AtomicBool,
    attempts: AtomicUsize,
    entries: Mutex<Vec<LogEntry>>,
}

impl RecordingSink {
    pub fn new(name: &str, kind: SinkKind) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            kind,
            failing: AtomicBool::new(false),
            attempts: AtomicUsize::new(0),
            entries: Mutex::new(Vec::new()),
        })
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Every call to `write`, failed or not
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().unwrap().clone()
    }

    pub fn written(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

#[async_trait]
impl LogSink for RecordingSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SinkKind {
        self.kind
    }

    async fn write(&self, entry: &LogEntry) -> Result<(), SinkError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            // EIO
            return Err(SinkError::Io(std::io::Error::from_raw_os_error(5)));
        }
        self.entries.lock().unwrap().push(entry.clone());
        Ok(())
    }
}

pub struct FakeDiskProbe {
    available: AtomicU64,
}

impl FakeDiskProbe {
    pub fn new(available: u64) -> Arc<Self> {
        Arc::new(Self {
            available: AtomicU64::new(available),
        })
    }

    pub fn set_available(&self, bytes: u64) {
        self.available.store(bytes, Ordering::SeqCst);
    }
}

impl DiskSpaceProbe for FakeDiskProbe {
    fn usage(&self, _target: &Path) -> Result<DiskUsage, DiskProbeError> {
        Ok(DiskUsage {
            mount_point: PathBuf::from("/"),
            available_bytes: self.available.load(Ordering::SeqCst),
            total_bytes: 1 << 40,
        })
    }
}

#[derive(Default)]
pub struct RecordingTerminator {
    codes: Mutex<Vec<i32>>,
}

impl RecordingTerminator {
    pub fn codes(&self) -> Vec<i32> {
        self.codes.lock().unwrap().clone()
    }
}

impl ProcessTerminator for RecordingTerminator {
    fn terminate(&self, exit_code: i32) {
        self.codes.lock().unwrap().push(exit_code);
    }
}

/// Base-26 letters for `i`, so normalization cannot merge two messages
pub fn word(mut i: usize) -> String {
    let mut out = String::new();
    loop {
        out.insert(0, (b'a' + (i % 26) as u8) as char);
        i /= 26;
        if i == 0 {
            break;
        }
    }
    out
}
