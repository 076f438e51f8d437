//! Local file sink
//!
//! Appends one text line per entry. Infrastructure entries go to
//! `infrastructure-errors.log`, everything else to `error.log`. A file that
//! would grow past `max_bytes` is rotated first: `error.log` becomes
//! `error.log.1`, older generations shift up and the oldest beyond
//! `max_files` is removed.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use logshield_domain::{LogEntry, LogSink, SinkError, SinkKind};
use logshield_shared::config::SinkConfig;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

pub const ERROR_LOG: &str = "error.log";
pub const INFRASTRUCTURE_LOG: &str = "infrastructure-errors.log";

#[derive(Debug)]
pub struct FileLogSink {
    dir: PathBuf,
    max_bytes: u64,
    max_files: usize,
    /// Serializes size check, rotation and append
    write_lock: Mutex<()>,
}

impl FileLogSink {
    pub fn new(dir: impl Into<PathBuf>, max_bytes: u64, max_files: usize) -> Self {
        Self {
            dir: dir.into(),
            max_bytes,
            max_files,
            write_lock: Mutex::new(()),
        }
    }

    pub fn from_config(config: &SinkConfig) -> Self {
        Self::new(&config.log_dir, config.max_file_bytes, config.max_files)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Target file for an entry
    pub fn path_for(&self, entry: &LogEntry) -> PathBuf {
        if entry.category.is_infrastructure() {
            self.dir.join(INFRASTRUCTURE_LOG)
        } else {
            self.dir.join(ERROR_LOG)
        }
    }

    async fn rotate(&self, path: &Path) -> io::Result<()> {
        if self.max_files == 0 {
            return fs::remove_file(path).await;
        }

        let oldest = generation(path, self.max_files);
        match fs::remove_file(&oldest).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        for n in (1..self.max_files).rev() {
            let from = generation(path, n);
            if fs::try_exists(&from).await? {
                fs::rename(&from, generation(path, n + 1)).await?;
            }
        }

        fs::rename(path, generation(path, 1)).await?;
        debug!(path = %path.display(), "Rotated log file");
        Ok(())
    }

    async fn append(&self, path: &Path, line: &str) -> io::Result<()> {
        fs::create_dir_all(&self.dir).await?;

        let current = match fs::metadata(path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e),
        };
        if current > 0 && current + line.len() as u64 > self.max_bytes {
            self.rotate(path).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}

fn generation(path: &Path, n: usize) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".{}", n));
    PathBuf::from(name)
}

#[async_trait]
impl LogSink for FileLogSink {
    fn name(&self) -> &str {
        "file"
    }

    fn kind(&self) -> SinkKind {
        SinkKind::File
    }

    async fn write(&self, entry: &LogEntry) -> Result<(), SinkError> {
        let mut line = entry.to_line();
        if let Some(stack) = &entry.stack {
            line.push('\n');
            line.push_str(stack);
        }
        line.push('\n');

        let path = self.path_for(entry);
        let _guard = self.write_lock.lock().await;
        self.append(&path, &line).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logshield_domain::{ErrorCategory, Severity};

    fn entry(message: &str, category: ErrorCategory) -> LogEntry {
        let mut entry = LogEntry::lifecycle(Severity::Error, message);
        entry.category = category;
        entry
    }

    #[tokio::test]
    async fn test_categories_go_to_separate_files() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileLogSink::new(dir.path().join("logs"), 1024 * 1024, 3);

        sink.write(&entry("order total mismatch", ErrorCategory::Application))
            .await
            .unwrap();
        sink.write(&entry("ENOSPC: no space left on device", ErrorCategory::Infrastructure))
            .await
            .unwrap();

        let app = std::fs::read_to_string(dir.path().join("logs").join(ERROR_LOG)).unwrap();
        let infra =
            std::fs::read_to_string(dir.path().join("logs").join(INFRASTRUCTURE_LOG)).unwrap();
        assert!(app.contains("order total mismatch"));
        assert!(!app.contains("ENOSPC"));
        assert!(infra.contains("[infrastructure]"));
        assert_eq!(infra.lines().count(), 1);
    }

    #[tokio::test]
    async fn test_rotation_keeps_max_files() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileLogSink::new(dir.path(), 200, 2);

        for i in 0..20 {
            let message = format!("application failure number {} with some padding text", i);
            sink.write(&entry(&message, ErrorCategory::Application))
                .await
                .unwrap();
        }

        let base = dir.path().join(ERROR_LOG);
        assert!(base.exists());
        assert!(generation(&base, 1).exists());
        assert!(generation(&base, 2).exists());
        assert!(!generation(&base, 3).exists());
        assert!(std::fs::metadata(&base).unwrap().len() <= 200);

        let latest = std::fs::read_to_string(&base).unwrap();
        assert!(latest.contains("number 19"));
    }

    #[tokio::test]
    async fn test_stack_is_appended_below_line() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileLogSink::new(dir.path(), 1024 * 1024, 1);
        let mut e = entry("render failed", ErrorCategory::Application);
        e.stack = Some("at render (view.rs:10)".to_string());

        sink.write(&e).await.unwrap();

        let content = std::fs::read_to_string(dir.path().join(ERROR_LOG)).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("render failed"));
        assert_eq!(lines[1], "at render (view.rs:10)");
    }

    #[tokio::test]
    async fn test_unwritable_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();
        let sink = FileLogSink::new(&blocker, 1024, 1);

        let err = sink
            .write(&entry("anything", ErrorCategory::Application))
            .await
            .unwrap_err();
        assert!(err.as_io().is_some());
    }
}
