//! HTTP Event Collector appender configuration

use crate::core::{LoggerError, OutputFormat, Result};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Event count used when a configured count cannot be parsed
pub const DEFAULT_BATCH_COUNT: usize = 10;
/// Byte threshold used when a configured size cannot be parsed
pub const DEFAULT_BATCH_BYTES: usize = 10 * 1024;
/// Interval used when a configured interval cannot be parsed
pub const DEFAULT_BATCH_INTERVAL: Duration = Duration::from_secs(10);

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// How the sender posts completed batches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SendMode {
    /// One batch at a time, on the sender's worker thread
    #[default]
    Sequential,
    /// Every batch on its own thread
    Parallel,
}

impl FromStr for SendMode {
    type Err = LoggerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" | "" => Ok(SendMode::Sequential),
            "parallel" => Ok(SendMode::Parallel),
            other => Err(LoggerError::config(
                "hec",
                format!("unknown send mode '{other}'"),
            )),
        }
    }
}

impl fmt::Display for SendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendMode::Sequential => write!(f, "sequential"),
            SendMode::Parallel => write!(f, "parallel"),
        }
    }
}

/// When a batch is complete
///
/// A zero threshold never triggers. With all three thresholds at zero every
/// event is posted on its own, immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPolicy {
    pub max_count: usize,
    pub max_bytes: usize,
    pub interval: Duration,
}

impl BatchPolicy {
    pub fn is_immediate(&self) -> bool {
        self.max_count == 0 && self.max_bytes == 0 && self.interval.is_zero()
    }

    pub fn is_full(&self, count: usize, bytes: usize) -> bool {
        self.is_immediate()
            || (self.max_count > 0 && count >= self.max_count)
            || (self.max_bytes > 0 && bytes >= self.max_bytes)
    }
}

/// Settings of a [`HecAppender`](super::HecAppender)
///
/// # Example
///
/// ```
/// use rust_opslog::appenders::hec::{HecConfig, SendMode};
/// use std::time::Duration;
///
/// let config = HecConfig::builder("https://splunk.example.com:8088", "0000-1111")
///     .index("ops")
///     .sourcetype("opslog")
///     .batch_count(50)
///     .batch_interval(Duration::from_secs(2))
///     .send_mode(SendMode::Parallel)
///     .retries_on_error(3)
///     .build();
/// assert_eq!(config.batch_policy().max_count, 50);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct HecConfig {
    pub url: String,
    pub token: String,
    pub source: Option<String>,
    pub sourcetype: Option<String>,
    pub host: Option<String>,
    pub index: Option<String>,
    pub disable_certificate_validation: bool,
    pub batch_count: usize,
    pub batch_bytes: usize,
    pub batch_interval: Duration,
    pub retries_on_error: u64,
    pub send_mode: SendMode,
    /// Name of a middleware registered with the
    /// [`MiddlewareRegistry`](super::MiddlewareRegistry)
    pub middleware: Option<String>,
    /// Layout of the event body
    pub output_format: OutputFormat,
    pub timeout: Duration,
}

impl Default for HecConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            token: String::new(),
            source: None,
            sourcetype: None,
            host: None,
            index: None,
            disable_certificate_validation: false,
            batch_count: 0,
            batch_bytes: 0,
            batch_interval: Duration::ZERO,
            retries_on_error: 0,
            send_mode: SendMode::Sequential,
            middleware: None,
            output_format: OutputFormat::Message,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl HecConfig {
    pub fn builder(url: impl Into<String>, token: impl Into<String>) -> HecConfigBuilder {
        HecConfigBuilder::new(url, token)
    }

    pub fn batch_policy(&self) -> BatchPolicy {
        BatchPolicy {
            max_count: self.batch_count,
            max_bytes: self.batch_bytes,
            interval: self.batch_interval,
        }
    }

    /// Set a property by its configuration-file name
    ///
    /// Numeric values that do not parse fall back to the defaults
    /// ([`DEFAULT_BATCH_COUNT`], [`DEFAULT_BATCH_BYTES`],
    /// [`DEFAULT_BATCH_INTERVAL`], no retries). The interval is given in
    /// milliseconds.
    ///
    /// # Errors
    ///
    /// Returns [`LoggerError::InvalidConfiguration`] for an unknown name.
    pub fn set_property(&mut self, name: &str, value: &str) -> Result<()> {
        match name {
            "url" => self.url = value.to_string(),
            "token" => self.token = value.to_string(),
            "source" => self.source = Some(value.to_string()),
            "sourcetype" => self.sourcetype = Some(value.to_string()),
            "host" => self.host = Some(value.to_string()),
            "index" => self.index = Some(value.to_string()),
            "disableCertificateValidation" => {
                self.disable_certificate_validation = value.trim().eq_ignore_ascii_case("true")
            }
            "batch_size_count" => {
                self.batch_count = parse_or(value, DEFAULT_BATCH_COUNT as u64) as usize
            }
            "batch_size_bytes" => {
                self.batch_bytes = parse_or(value, DEFAULT_BATCH_BYTES as u64) as usize
            }
            "batch_interval" => {
                let default_millis = DEFAULT_BATCH_INTERVAL.as_millis() as u64;
                self.batch_interval = Duration::from_millis(parse_or(value, default_millis))
            }
            "retries_on_error" => self.retries_on_error = parse_or(value, 0),
            "send_mode" => self.send_mode = value.parse().unwrap_or_default(),
            "middleware" => {
                self.middleware = Some(value.trim().to_string()).filter(|name| !name.is_empty())
            }
            other => {
                return Err(LoggerError::config(
                    "hec",
                    format!("unknown property '{other}'"),
                ))
            }
        }
        Ok(())
    }

    /// Check the settings needed to open a connection
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(LoggerError::config("hec", "url is required"));
        }
        if self.token.trim().is_empty() {
            return Err(LoggerError::config("hec", "token is required"));
        }
        Ok(())
    }
}

fn parse_or(value: &str, default: u64) -> u64 {
    value.trim().parse().unwrap_or(default)
}

/// Builder for [`HecConfig`]
pub struct HecConfigBuilder {
    config: HecConfig,
}

impl HecConfigBuilder {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            config: HecConfig {
                url: url.into(),
                token: token.into(),
                ..HecConfig::default()
            },
        }
    }

    #[must_use]
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.config.source = Some(source.into());
        self
    }

    #[must_use]
    pub fn sourcetype(mut self, sourcetype: impl Into<String>) -> Self {
        self.config.sourcetype = Some(sourcetype.into());
        self
    }

    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = Some(host.into());
        self
    }

    #[must_use]
    pub fn index(mut self, index: impl Into<String>) -> Self {
        self.config.index = Some(index.into());
        self
    }

    #[must_use]
    pub fn disable_certificate_validation(mut self, disable: bool) -> Self {
        self.config.disable_certificate_validation = disable;
        self
    }

    #[must_use]
    pub fn batch_count(mut self, count: usize) -> Self {
        self.config.batch_count = count;
        self
    }

    #[must_use]
    pub fn batch_bytes(mut self, bytes: usize) -> Self {
        self.config.batch_bytes = bytes;
        self
    }

    #[must_use]
    pub fn batch_interval(mut self, interval: Duration) -> Self {
        self.config.batch_interval = interval;
        self
    }

    #[must_use]
    pub fn retries_on_error(mut self, retries: u64) -> Self {
        self.config.retries_on_error = retries;
        self
    }

    #[must_use]
    pub fn send_mode(mut self, mode: SendMode) -> Self {
        self.config.send_mode = mode;
        self
    }

    #[must_use]
    pub fn middleware(mut self, name: impl Into<String>) -> Self {
        self.config.middleware = Some(name.into());
        self
    }

    #[must_use]
    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.output_format = format;
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn build(self) -> HecConfig {
        self.config
    }
}
