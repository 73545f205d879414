//! Appender implementations

pub mod console;

#[cfg(feature = "hec")]
pub mod hec;

pub use console::ConsoleAppender;

#[cfg(feature = "hec")]
pub use hec::{AccessEvent, HecAppender, HecConfig};

pub use crate::core::Appender;
