//! Log entry structure

use super::log_level::LogLevel;
use super::mdc::Mdc;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::error::Error;

thread_local! {
    static THREAD_ID_CACHE: RefCell<Option<String>> = const { RefCell::new(None) };
    static THREAD_NAME_CACHE: RefCell<Option<Option<String>>> = const { RefCell::new(None) };
}

fn get_thread_id() -> String {
    THREAD_ID_CACHE.with(|cache| {
        cache
            .borrow_mut()
            .get_or_insert_with(|| format!("{:?}", std::thread::current().id()))
            .clone()
    })
}

fn get_thread_name() -> Option<String> {
    THREAD_NAME_CACHE.with(|cache| {
        cache
            .borrow_mut()
            .get_or_insert_with(|| std::thread::current().name().map(String::from))
            .clone()
    })
}

/// One record handed from a [`Logger`](super::Logger) to its appenders
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Name of the logger the entry was emitted through, usually a class path
    pub logger: Option<String>,
    pub thread_id: String,
    pub thread_name: Option<String>,
    /// Top-level error message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Error and its `source()` chain, one cause per line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_trace: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub properties: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marker: Option<String>,
}

impl LogEntry {
    /// Sanitize log message to prevent log injection attacks
    ///
    /// A single trailing line break is dropped first: encoders append one to
    /// announce that an error trace follows on the next lines.
    fn sanitize_message(message: &str) -> String {
        message
            .strip_suffix('\n')
            .unwrap_or(message)
            .replace('\n', "\\n")
            .replace('\r', "\\r")
            .replace('\t', "\\t")
    }

    pub fn new(level: LogLevel, message: impl AsRef<str>) -> Self {
        Self {
            level,
            message: Self::sanitize_message(message.as_ref()),
            timestamp: Utc::now(),
            logger: None,
            thread_id: get_thread_id(),
            thread_name: get_thread_name(),
            error_message: None,
            error_trace: None,
            properties: Mdc::snapshot(),
            marker: None,
        }
    }

    #[must_use]
    pub fn with_logger(mut self, logger: impl Into<String>) -> Self {
        self.logger = Some(logger.into());
        self
    }

    /// Attach an error, rendering its source chain
    #[must_use]
    pub fn with_error(mut self, error: &(dyn Error + 'static)) -> Self {
        let mut trace = error.to_string();
        let mut source = error.source();
        while let Some(cause) = source {
            trace.push_str("\nCaused by: ");
            trace.push_str(&cause.to_string());
            source = cause.source();
        }
        self.error_message = Some(error.to_string());
        self.error_trace = Some(trace);
        self
    }

    #[must_use]
    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = Some(marker.into());
        self
    }

    /// Thread name, or the thread id for unnamed threads
    pub fn thread_label(&self) -> &str {
        self.thread_name.as_deref().unwrap_or(&self.thread_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct Inner;

    impl fmt::Display for Inner {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "disk full")
        }
    }

    impl Error for Inner {}

    #[derive(Debug)]
    struct Outer(Inner);

    impl fmt::Display for Outer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "write failed")
        }
    }

    impl Error for Outer {
        fn source(&self) -> Option<&(dyn Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn test_trailing_line_break_is_dropped() {
        let entry = LogEntry::new(LogLevel::Error, "c=\"Foo\"\n");
        assert_eq!(entry.message, "c=\"Foo\"");
    }

    #[test]
    fn test_embedded_line_breaks_are_escaped() {
        let entry = LogEntry::new(LogLevel::Info, "a\nb\tc");
        assert_eq!(entry.message, "a\\nb\\tc");
    }

    #[test]
    fn test_error_chain() {
        let entry = LogEntry::new(LogLevel::Error, "x").with_error(&Outer(Inner));
        assert_eq!(entry.error_message.as_deref(), Some("write failed"));
        assert_eq!(
            entry.error_trace.as_deref(),
            Some("write failed\nCaused by: disk full")
        );
    }

    #[test]
    fn test_properties_snapshot_mdc() {
        let _guard = Mdc::put("log_entry_tenant", "acme");
        let entry = LogEntry::new(LogLevel::Info, "x");
        assert_eq!(
            entry.properties.get("log_entry_tenant").map(String::as_str),
            Some("acme")
        );
    }
}
