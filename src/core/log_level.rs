//! Severity levels

use super::error::LoggerError;
use super::overflow_policy::LogPriority;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Severity of a log line, finest first
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Trace = 0,
    Debug = 1,
    #[default]
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

impl LogLevel {
    /// Upper-case name, as written in entries and collector events
    pub fn to_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
        }
    }

    /// Preservation priority when a batched logger's queue overflows
    pub fn priority(&self) -> LogPriority {
        match self {
            LogLevel::Error | LogLevel::Fatal => LogPriority::Critical,
            LogLevel::Warn => LogPriority::High,
            _ => LogPriority::Normal,
        }
    }

    #[cfg(feature = "console")]
    pub(crate) fn color(&self) -> colored::Color {
        match self {
            LogLevel::Trace => colored::Color::BrightBlack,
            LogLevel::Debug => colored::Color::Cyan,
            LogLevel::Info => colored::Color::Green,
            LogLevel::Warn => colored::Color::Yellow,
            LogLevel::Error => colored::Color::Red,
            LogLevel::Fatal => colored::Color::BrightRed,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.to_str())
    }
}

/// Case-insensitive; `WARNING` and the `FINEST`/`SEVERE` aliases are accepted
impl FromStr for LogLevel {
    type Err = LoggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let level = match s.trim().to_ascii_uppercase().as_str() {
            "TRACE" | "FINEST" => LogLevel::Trace,
            "DEBUG" | "FINE" => LogLevel::Debug,
            "INFO" => LogLevel::Info,
            "WARN" | "WARNING" => LogLevel::Warn,
            "ERROR" | "SEVERE" => LogLevel::Error,
            "FATAL" => LogLevel::Fatal,
            _ => return Err(LoggerError::config("level", format!("unknown level '{s}'"))),
        };
        Ok(level)
    }
}
