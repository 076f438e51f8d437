//! Reported events and the entries written to sinks
//!
//! A [`LogEvent`] is what application code hands to the logger. The
//! classifier works on the narrower [`ErrorEvent`] derived from it, and every
//! event that survives deduplication is rendered as a [`LogEntry`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::classifier::{ErrorCategory, Fingerprint};

/// Severity of a reported event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "trace",
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        }
    }

    /// Events at or above this level are deduplicated and counted in error stats
    pub fn is_reportable(&self) -> bool {
        *self >= Severity::Warn
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str().to_uppercase())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Ok(Severity::Trace),
            "debug" => Ok(Severity::Debug),
            "info" => Ok(Severity::Info),
            "warn" | "warning" => Ok(Severity::Warn),
            "error" => Ok(Severity::Error),
            "fatal" | "critical" => Ok(Severity::Fatal),
            other => Err(format!("Unknown severity: {}", other)),
        }
    }
}

/// The error attached to a [`LogEvent`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ErrorDetails {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            stack: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Capture any error, walking its source chain into the message.
    ///
    /// The first `io::Error` found in the chain supplies the code.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut message = err.to_string();
        let mut code = err.downcast_ref::<std::io::Error>().and_then(io_error_code);
        let mut source = err.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            if code.is_none() {
                code = cause.downcast_ref::<std::io::Error>().and_then(io_error_code);
            }
            source = cause.source();
        }
        let details = Self::new(message);
        match code {
            Some(code) => details.with_code(code),
            None => details,
        }
    }

    /// Capture an I/O error together with its errno-style code
    pub fn from_io_error(err: &std::io::Error) -> Self {
        let details = Self::new(err.to_string());
        match io_error_code(err) {
            Some(code) => details.with_code(code),
            None => details,
        }
    }
}

/// Map an I/O error to the errno name the classifier understands.
fn io_error_code(err: &std::io::Error) -> Option<&'static str> {
    use std::io::ErrorKind;

    // Linux errno values
    if let Some(raw) = err.raw_os_error() {
        let code = match raw {
            1 => Some("EPERM"),
            5 => Some("EIO"),
            13 => Some("EACCES"),
            19 => Some("ENODEV"),
            23 => Some("ENFILE"),
            24 => Some("EMFILE"),
            28 => Some("ENOSPC"),
            30 => Some("EROFS"),
            101 => Some("ENETUNREACH"),
            107 => Some("ENOTCONN"),
            110 => Some("ETIMEDOUT"),
            111 => Some("ECONNREFUSED"),
            113 => Some("EHOSTUNREACH"),
            122 => Some("EDQUOT"),
            _ => None,
        };
        if code.is_some() {
            return code;
        }
    }

    match err.kind() {
        ErrorKind::PermissionDenied => Some("EACCES"),
        ErrorKind::ConnectionRefused => Some("ECONNREFUSED"),
        ErrorKind::NotConnected => Some("ENOTCONN"),
        ErrorKind::TimedOut => Some("ETIMEDOUT"),
        _ => None,
    }
}

/// A report handed to the logger by application code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    pub level: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetails>,
    pub timestamp: DateTime<Utc>,
}

impl LogEvent {
    pub fn new(level: Severity, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            metadata: BTreeMap::new(),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(Severity::Info, message)
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self::new(Severity::Warn, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(Severity::Fatal, message)
    }

    pub fn with_error(mut self, error: ErrorDetails) -> Self {
        self.error = Some(error);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The classification input for this report.
    ///
    /// The attached error's message wins over the log message, so the same
    /// failure reported from different call sites collapses to one key.
    pub fn error_event(&self) -> ErrorEvent {
        match &self.error {
            Some(details) => ErrorEvent {
                raw_message: details.message.clone(),
                code: details.code.clone(),
                timestamp: self.timestamp,
                severity: self.level,
            },
            None => ErrorEvent {
                raw_message: self.message.clone(),
                code: None,
                timestamp: self.timestamp,
                severity: self.level,
            },
        }
    }
}

/// A single occurrence of an error, as seen by the classifier.
///
/// Transient: built per report and dropped once classified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub raw_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
}

impl ErrorEvent {
    pub fn new(raw_message: impl Into<String>, severity: Severity) -> Self {
        Self {
            raw_message: raw_message.into(),
            code: None,
            timestamp: Utc::now(),
            severity,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// An accepted event, rendered for a sink
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Per-process sequence number
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub level: Severity,
    pub category: ErrorCategory,
    pub fingerprint: Fingerprint,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
    pub occurrence_count: u64,
    pub is_summary: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_window_count: Option<u64>,
}

impl LogEntry {
    /// Entry for the subsystem's own lifecycle messages (shutdown, handler
    /// diagnostics). These never pass through deduplication.
    pub fn lifecycle(level: Severity, message: impl Into<String>) -> Self {
        Self {
            sequence: 0,
            timestamp: Utc::now(),
            level,
            category: ErrorCategory::Application,
            fingerprint: Fingerprint::from_raw("lifecycle"),
            message: message.into(),
            code: None,
            stack: None,
            metadata: BTreeMap::new(),
            occurrence_count: 1,
            is_summary: false,
            previous_window_count: None,
        }
    }

    /// Single-line text rendering used by the file and console sinks
    pub fn to_line(&self) -> String {
        let mut line = format!(
            "{} [{}] #{} [{}] ",
            self.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            self.level,
            self.sequence,
            self.category,
        );
        if self.is_summary {
            line.push_str("[SUMMARY] ");
        }
        line.push_str(&self.message);
        if let Some(code) = &self.code {
            line.push_str(&format!(" (code={})", code));
        }
        if self.occurrence_count > 1 {
            line.push_str(&format!(" (occurred {}x)", self.occurrence_count));
        }
        if let Some(previous) = self.previous_window_count {
            line.push_str(&format!(" (previous window: {} occurrences)", previous));
        }
        if !self.metadata.is_empty() {
            if let Ok(meta) = serde_json::to_string(&self.metadata) {
                line.push(' ');
                line.push_str(&meta);
            }
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering_and_parsing() {
        assert!(Severity::Fatal > Severity::Error);
        assert!(Severity::Warn.is_reportable());
        assert!(!Severity::Info.is_reportable());
        assert_eq!("WARNING".parse::<Severity>().unwrap(), Severity::Warn);
        assert!("loud".parse::<Severity>().is_err());
    }

    #[test]
    fn test_error_event_prefers_attached_error() {
        let event = LogEvent::error("upload failed")
            .with_error(ErrorDetails::new("write EIO /var/data/1.pdf").with_code("EIO"));
        let error_event = event.error_event();
        assert_eq!(error_event.raw_message, "write EIO /var/data/1.pdf");
        assert_eq!(error_event.code.as_deref(), Some("EIO"));
        assert_eq!(error_event.severity, Severity::Error);

        let plain = LogEvent::warn("slow request").error_event();
        assert_eq!(plain.raw_message, "slow request");
        assert!(plain.code.is_none());
    }

    #[test]
    fn test_io_error_codes() {
        let enospc = std::io::Error::from_raw_os_error(28);
        assert_eq!(ErrorDetails::from_io_error(&enospc).code.as_deref(), Some("ENOSPC"));

        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        assert_eq!(ErrorDetails::from_io_error(&denied).code.as_deref(), Some("EACCES"));

        let other = std::io::Error::new(std::io::ErrorKind::Other, "odd");
        assert!(ErrorDetails::from_io_error(&other).code.is_none());
    }

    #[test]
    fn test_summary_line_format() {
        let mut entry = LogEntry::lifecycle(Severity::Error, "disk write failed");
        entry.sequence = 7;
        entry.is_summary = true;
        entry.occurrence_count = 101;
        entry.code = Some("EIO".to_string());

        let line = entry.to_line();
        assert!(line.contains("[ERROR] #7"));
        assert!(line.contains("[SUMMARY] disk write failed"));
        assert!(line.contains("(code=EIO)"));
        assert!(line.ends_with("(occurred 101x)"));
    }

    #[test]
    fn test_line_includes_previous_window_and_metadata() {
        let mut entry = LogEntry::lifecycle(Severity::Warn, "retrying");
        entry.previous_window_count = Some(340);
        entry.metadata.insert("route".to_string(), Value::from("/upload"));

        let line = entry.to_line();
        assert!(line.contains("(previous window: 340 occurrences)"));
        assert!(line.contains("\"route\":\"/upload\""));
        assert!(!line.contains("occurred"));
    }
}
