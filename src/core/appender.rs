//! Appender trait for log output destinations

use super::{error::Result, log_entry::LogEntry};

/// Output destination owned by a [`Logger`](super::Logger)
///
/// Appenders run behind the logger's lock; an error or panic in one appender
/// does not stop the others from receiving the entry.
pub trait Appender: Send + Sync {
    fn append(&mut self, entry: &LogEntry) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
    fn name(&self) -> &str;
}
