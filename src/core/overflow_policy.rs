//! What a batched logger does when its queue is full

use super::error::LoggerError;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Policy for non-critical entries meeting a full async queue
///
/// [`LogPriority::Critical`] entries never reach the policy; they are written
/// in place by the producing thread.
///
/// ```
/// use rust_opslog::OverflowPolicy;
/// use std::time::Duration;
///
/// let policy: OverflowPolicy = "block:250".parse().unwrap();
/// assert_eq!(policy, OverflowPolicy::BlockWithTimeout(Duration::from_millis(250)));
/// assert_eq!(policy.to_string(), "block:250");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Drop silently, counting the loss
    DropNewest,
    /// Wait for room
    Block,
    /// Wait up to the duration, then drop with an alert
    BlockWithTimeout(Duration),
    /// Drop, alerting on stderr and through the overflow callback
    #[default]
    AlertAndDrop,
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverflowPolicy::DropNewest => f.write_str("drop"),
            OverflowPolicy::Block => f.write_str("block"),
            OverflowPolicy::BlockWithTimeout(timeout) => {
                write!(f, "block:{}", timeout.as_millis())
            }
            OverflowPolicy::AlertAndDrop => f.write_str("alert"),
        }
    }
}

/// `drop`, `block`, `block:<millis>` or `alert`
impl FromStr for OverflowPolicy {
    type Err = LoggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        if let Some(millis) = s.strip_prefix("block:") {
            return millis
                .trim()
                .parse()
                .map(|millis| OverflowPolicy::BlockWithTimeout(Duration::from_millis(millis)))
                .map_err(|_| LoggerError::config("overflow", format!("bad timeout '{millis}'")));
        }
        match s.as_str() {
            "drop" => Ok(OverflowPolicy::DropNewest),
            "block" => Ok(OverflowPolicy::Block),
            "alert" | "" => Ok(OverflowPolicy::AlertAndDrop),
            other => Err(LoggerError::config(
                "overflow",
                format!("unknown policy '{other}'"),
            )),
        }
    }
}

/// How hard the logger tries to keep an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogPriority {
    #[default]
    Normal,
    High,
    /// Never dropped
    Critical,
}

/// Invoked with the running total of dropped entries
pub type OverflowCallback = Arc<dyn Fn(u64) + Send + Sync>;
