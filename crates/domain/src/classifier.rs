//! Error classification
//!
//! Splits errors into infrastructure failures (local storage, OS resources,
//! connectivity) and application faults, and derives a stable fingerprint so
//! repeated instances of the same failure collapse to one key.
//!
//! Classification is pure: the same [`ErrorEvent`] always yields the same
//! [`Classification`], and nothing is recorded.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::events::ErrorEvent;

/// Error codes of resource/environment failures
pub const INFRASTRUCTURE_CODES: &[&str] = &[
    "EIO",
    "ENOSPC",
    "EDQUOT",
    "EROFS",
    "EMFILE",
    "ENFILE",
    "EACCES",
    "EPERM",
    "ENODEV",
    "ECONNREFUSED",
    "ENOTCONN",
    "ETIMEDOUT",
    "ENETUNREACH",
    "EHOSTUNREACH",
];

/// Lowercase message fragments of resource/environment failures
pub const INFRASTRUCTURE_MESSAGE_PATTERNS: &[&str] = &[
    "no space left",
    "i/o error",
    "input/output error",
    "read-only file system",
    "too many open files",
    "permission denied",
    "disk quota exceeded",
    "connection refused",
    "network is unreachable",
    "no route to host",
    "pool timed out",
];

/// Fingerprint length in hex characters
const FINGERPRINT_LEN: usize = 16;

static CODE_TOKEN: Lazy<Regex> = Lazy::new(|| {
    let alternatives = INFRASTRUCTURE_CODES.join("|");
    Regex::new(&format!(r"\b(?:{})\b", alternatives)).expect("infrastructure code regex")
});

static UUID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
        .expect("uuid regex")
});

static TIMESTAMP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:?\d{2})?")
        .expect("timestamp regex")
});

static HEX_ADDRESS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"0x[0-9a-fA-F]+").expect("hex address regex"));

static PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?P<pre>^|[\s'"(=])(?:[A-Za-z]:)?(?:[/\\][\w.\-]+)+[/\\]?"#)
        .expect("path regex")
});

static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d+\b").expect("number regex"));

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));

/// Error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    /// Local resource or environment failure; never sent to the remote sink
    Infrastructure,
    /// Logic fault, and the fallback for anything unrecognised
    Application,
}

impl ErrorCategory {
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, ErrorCategory::Infrastructure)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Infrastructure => write!(f, "infrastructure"),
            ErrorCategory::Application => write!(f, "application"),
        }
    }
}

/// Stable key identifying one root-cause error across occurrences
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wrap an already-computed key
    pub fn from_raw(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of classifying one error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub category: ErrorCategory,
    pub fingerprint: Fingerprint,
}

/// Static-table error classifier
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorClassifier;

impl ErrorClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, event: &ErrorEvent) -> Classification {
        Classification {
            category: self.category(event),
            fingerprint: self.fingerprint(event),
        }
    }

    /// Infrastructure if the code, a code token in the message, or a known
    /// message fragment matches; Application otherwise.
    pub fn category(&self, event: &ErrorEvent) -> ErrorCategory {
        let code_matches = event
            .code
            .as_deref()
            .map(|code| is_infrastructure_code(code))
            .unwrap_or(false);

        if code_matches || CODE_TOKEN.is_match(&event.raw_message) {
            return ErrorCategory::Infrastructure;
        }

        let lowered = event.raw_message.to_lowercase();
        if INFRASTRUCTURE_MESSAGE_PATTERNS
            .iter()
            .any(|pattern| lowered.contains(pattern))
        {
            return ErrorCategory::Infrastructure;
        }

        ErrorCategory::Application
    }

    pub fn fingerprint(&self, event: &ErrorEvent) -> Fingerprint {
        let code = event
            .code
            .as_deref()
            .map(|c| c.trim().to_uppercase())
            .unwrap_or_default();
        let normalized = normalize_message(&event.raw_message);

        let hash = Sha256::digest(format!("{}|{}", code, normalized).as_bytes());
        let hex: String = hash
            .iter()
            .take(FINGERPRINT_LEN / 2)
            .map(|b| format!("{:02x}", b))
            .collect();
        Fingerprint(hex)
    }
}

pub fn is_infrastructure_code(code: &str) -> bool {
    let code = code.trim();
    INFRASTRUCTURE_CODES
        .iter()
        .any(|known| known.eq_ignore_ascii_case(code))
}

/// Strip the volatile parts of a message: UUIDs, timestamps, hex addresses,
/// paths and numbers.
pub fn normalize_message(message: &str) -> String {
    let stripped = UUID.replace_all(message, "<uuid>");
    let stripped = TIMESTAMP.replace_all(&stripped, "<ts>");
    let stripped = HEX_ADDRESS.replace_all(&stripped, "<hex>");
    let stripped = PATH.replace_all(&stripped, "${pre}<path>");
    let stripped = NUMBER.replace_all(&stripped, "<n>");
    let lowered = stripped.to_lowercase();
    WHITESPACE.replace_all(lowered.trim(), " ").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Severity;
    use rstest::rstest;

    fn event(message: &str) -> ErrorEvent {
        ErrorEvent::new(message, Severity::Error)
    }

    #[rstest]
    #[case("storage write failure, code=EIO", ErrorCategory::Infrastructure)]
    #[case("validation failed: field X required", ErrorCategory::Application)]
    #[case("ENOSPC: no space left on device, write", ErrorCategory::Infrastructure)]
    #[case("EROFS: read-only file system", ErrorCategory::Infrastructure)]
    #[case("Too many open files (os error 24)", ErrorCategory::Infrastructure)]
    #[case("pool timed out while waiting for an open connection", ErrorCategory::Infrastructure)]
    #[case("invoice total mismatch", ErrorCategory::Application)]
    #[case("REIOPEN flag not set", ErrorCategory::Application)]
    #[case("", ErrorCategory::Application)]
    fn test_category_by_message(#[case] message: &str, #[case] expected: ErrorCategory) {
        assert_eq!(ErrorClassifier::new().category(&event(message)), expected);
    }

    #[test]
    fn test_category_by_code() {
        let classifier = ErrorClassifier::new();
        let with_code = event("write failed").with_code("enospc");
        assert_eq!(classifier.category(&with_code), ErrorCategory::Infrastructure);

        let app_code = event("write failed").with_code("E_VALIDATION");
        assert_eq!(classifier.category(&app_code), ErrorCategory::Application);
    }

    #[test]
    fn test_fingerprint_ignores_volatile_parts() {
        let classifier = ErrorClassifier::new();
        let a = event("EIO: i/o error, write '/var/app/uploads/4821.pdf' at offset 4096");
        let b = event("EIO: i/o error, write '/var/app/uploads/9917.pdf' at offset 8192");
        assert_eq!(classifier.fingerprint(&a), classifier.fingerprint(&b));

        let c = event("request 0x7ffd5e8c failed at 2026-03-01T10:00:00.123Z");
        let d = event("request 0x1a2b failed at 2026-03-02 11:12:13");
        assert_eq!(classifier.fingerprint(&c), classifier.fingerprint(&d));
    }

    #[test]
    fn test_fingerprint_distinguishes_messages_and_codes() {
        let classifier = ErrorClassifier::new();
        let a = event("write failed");
        let b = event("read failed");
        assert_ne!(classifier.fingerprint(&a), classifier.fingerprint(&b));

        let eio = event("write failed").with_code("EIO");
        let enospc = event("write failed").with_code("ENOSPC");
        assert_ne!(classifier.fingerprint(&eio), classifier.fingerprint(&enospc));
        assert_eq!(classifier.fingerprint(&eio).as_str().len(), FINGERPRINT_LEN);
    }

    #[test]
    fn test_normalize_message() {
        assert_eq!(
            normalize_message("Job 550e8400-e29b-41d4-a716-446655440000   FAILED"),
            "job <uuid> failed"
        );
        assert_eq!(
            normalize_message("open /tmp/x.log: i/o error"),
            "open <path>: i/o error"
        );
        assert_eq!(normalize_message("retry 3 of 5"), "retry <n> of <n>");
    }
}
