//! Core logger types and traits

pub mod appender;
pub mod error;
pub mod log_entry;
pub mod log_level;
pub mod logger;
pub mod mdc;
pub mod metrics;
pub mod output_format;
pub mod overflow_policy;
pub mod timestamp;

pub use appender::Appender;
pub use error::{LoggerError, Result};
pub use log_entry::LogEntry;
pub use log_level::LogLevel;
pub use logger::{Logger, LoggerBuilder, DEFAULT_SHUTDOWN_TIMEOUT};
pub use mdc::{Mdc, MdcGuard};
pub use metrics::{LoggerMetrics, MetricsSnapshot};
pub use output_format::OutputFormat;
pub use overflow_policy::{LogPriority, OverflowCallback, OverflowPolicy};
pub use timestamp::TimestampFormat;
