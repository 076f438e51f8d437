//! Sink port
//!
//! A sink is a destination for accepted log entries: the local file, the
//! remote store, or the console. Sinks report failures as [`SinkError`];
//! the logger never lets them escape to the code that reported an event.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::events::LogEntry;

/// Sink failures
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Sink {sink} timed out after {timeout:?}")]
    Timeout { sink: String, timeout: Duration },

    #[error("Sink {sink} is unavailable")]
    Unavailable { sink: String },

    #[error("Remote store error: {0}")]
    Remote(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SinkError {
    /// The underlying I/O error, when there is one
    pub fn as_io(&self) -> Option<&std::io::Error> {
        match self {
            SinkError::Io(err) => Some(err),
            _ => None,
        }
    }
}

/// Which destination a sink stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    File,
    Remote,
    Console,
}

#[async_trait]
pub trait LogSink: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> SinkKind;

    async fn write(&self, entry: &LogEntry) -> Result<(), SinkError>;

    async fn flush(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion() {
        let err: SinkError = std::io::Error::from_raw_os_error(28).into();
        assert!(err.as_io().is_some());
        assert!(err.to_string().starts_with("I/O error"));
    }

    #[test]
    fn test_timeout_display() {
        let err = SinkError::Timeout {
            sink: "file".to_string(),
            timeout: Duration::from_millis(5000),
        };
        assert_eq!(err.to_string(), "Sink file timed out after 5s");
        assert!(err.as_io().is_none());
    }
}
