//! # Rust Opslog
//!
//! Structured `key=value` log lines that know who wrote them.
//!
//! ## Features
//!
//! - **Call-site attribution**: every line starts with the calling class and
//!   method, read from the live call stack
//! - **Typed fields**: strings are quoted and escaped, numbers are not,
//!   timestamps are rendered in UTC
//! - **Pluggable sinks**: lines go to a [`Logger`] or any [`Sink`], bound per
//!   class path prefix
//! - **Splunk HEC**: a batching appender for the HTTP Event Collector
//!   (feature `hec`)
//!
//! ```
//! use rust_opslog::prelude::*;
//!
//! struct Billing;
//!
//! impl Billing {
//!     fn charge(&self, cents: u64) {
//!         opslog!().add("cents", cents).set_message("charged").info();
//!     }
//! }
//!
//! Billing.charge(1250);
//! ```

pub mod appenders;
pub mod caller;
pub mod core;
pub mod emitter;
pub mod encoder;
pub mod macros;

pub mod prelude {
    pub use crate::appenders::ConsoleAppender;
    #[cfg(feature = "hec")]
    pub use crate::appenders::{HecAppender, HecConfig};
    pub use crate::caller::{ClassRef, FrameGuard};
    pub use crate::core::{
        Appender, LogEntry, LogLevel, Logger, LoggerBuilder, LoggerError, Mdc, OutputFormat,
        Result, TimestampFormat,
    };
    pub use crate::emitter::{Sink, SinkRegistry};
    pub use crate::encoder::{FieldValue, LineEncoder};
    pub use crate::{enter, opslog};
}

pub use appenders::ConsoleAppender;
pub use caller::{resolve_caller_of, Caller, CallerResolver, ClassRef, FrameGuard, StackInspector};
pub use core::{
    Appender, LogEntry, LogLevel, LogPriority, Logger, LoggerBuilder, LoggerError, LoggerMetrics,
    Mdc, MdcGuard, MetricsSnapshot, OutputFormat, OverflowCallback, OverflowPolicy, Result,
    TimestampFormat, DEFAULT_SHUTDOWN_TIMEOUT,
};
pub use emitter::{ClassSink, Sink, SinkRegistry};
pub use encoder::{FieldValue, LineEncoder};
