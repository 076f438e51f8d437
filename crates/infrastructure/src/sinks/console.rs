//! Console (stderr) sink
//!
//! The last-resort destination. It takes no breaker: if stderr itself is
//! gone there is nothing further to fall back to.

use std::io::Write;

use async_trait::async_trait;
use logshield_domain::{LogEntry, LogSink, SinkError, SinkKind};

#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl ConsoleSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LogSink for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    fn kind(&self) -> SinkKind {
        SinkKind::Console
    }

    async fn write(&self, entry: &LogEntry) -> Result<(), SinkError> {
        let mut stderr = std::io::stderr().lock();
        writeln!(stderr, "{}", entry.to_line())?;
        if let Some(stack) = &entry.stack {
            writeln!(stderr, "{}", stack)?;
        }
        Ok(())
    }

    async fn flush(&self) -> Result<(), SinkError> {
        std::io::stderr().flush()?;
        Ok(())
    }
}
