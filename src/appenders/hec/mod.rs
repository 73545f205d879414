//! Splunk HTTP Event Collector appender
//!
//! Ships entries to a collector through a batching [`HecSender`]. The entry
//! is laid out with the configured [`OutputFormat`] (the bare message by
//! default) and sent as the event body; level, logger, thread, error message,
//! marker and diagnostic context become indexed fields.
//!
//! # Example
//!
//! ```no_run
//! use rust_opslog::appenders::hec::{HecAppender, HecConfig};
//! use rust_opslog::prelude::*;
//!
//! let config = HecConfig::builder("https://splunk.example.com:8088", "00000000-0000")
//!     .index("ops")
//!     .batch_count(20)
//!     .retries_on_error(3)
//!     .build();
//!
//! let mut appender = HecAppender::new(config);
//! appender.start().expect("collector configuration");
//!
//! let logger = Logger::builder().appender(appender).build();
//! logger.info("c=\"Main\" p=\"main\" msg=\"started\"");
//! ```
//!
//! [`OutputFormat`]: crate::core::OutputFormat

mod config;
mod event;
mod middleware;
mod sender;

pub use config::{
    BatchPolicy, HecConfig, HecConfigBuilder, SendMode, DEFAULT_BATCH_BYTES, DEFAULT_BATCH_COUNT,
    DEFAULT_BATCH_INTERVAL,
};
pub use event::{AccessEvent, HecEvent, HecMetadata, ACCESS_LOGGER};
pub use middleware::{MiddlewareFactory, MiddlewareRegistry, Next, ResendMiddleware, SenderMiddleware};
pub use sender::{endpoint_url, Batch, HecSender, HttpTransport, Transport};

use crate::core::{Appender, LogEntry, LoggerError, LoggerMetrics, Result, TimestampFormat};
use std::any::Any;

/// Appender posting to an HTTP Event Collector
///
/// Created stopped; entries appended before [`start`](Self::start) or after
/// [`stop`](Self::stop) are ignored.
pub struct HecAppender {
    config: HecConfig,
    transport: Option<Box<dyn Transport>>,
    sender: Option<HecSender>,
}

impl HecAppender {
    pub fn new(config: HecConfig) -> Self {
        Self {
            config,
            transport: None,
            sender: None,
        }
    }

    /// Appender posting through `transport` instead of HTTP
    pub fn with_transport(config: HecConfig, transport: impl Transport + 'static) -> Self {
        Self {
            config,
            transport: Some(Box::new(transport)),
            sender: None,
        }
    }

    pub fn config(&self) -> &HecConfig {
        &self.config
    }

    pub fn is_started(&self) -> bool {
        self.sender.is_some()
    }

    /// Counters of the running sender
    pub fn metrics(&self) -> Option<&LoggerMetrics> {
        self.sender.as_ref().map(HecSender::metrics)
    }

    /// Connect the sender
    ///
    /// A named middleware that is unknown or fails to build is skipped.
    pub fn start(&mut self) -> Result<()> {
        if self.is_started() {
            return Ok(());
        }

        let transport: Box<dyn Transport> = match self.transport.take() {
            Some(transport) => transport,
            None => Box::new(HttpTransport::new(&self.config)?),
        };

        let mut middleware: Vec<Box<dyn SenderMiddleware>> = Vec::new();
        if let Some(name) = self.config.middleware.as_deref().filter(|n| !n.is_empty()) {
            if let Some(custom) = MiddlewareRegistry::global().create(name) {
                middleware.push(custom);
            }
        }
        if self.config.retries_on_error > 0 {
            middleware.push(Box::new(ResendMiddleware::new(self.config.retries_on_error)));
        }

        self.sender = Some(HecSender::spawn(
            self.config.batch_policy(),
            self.config.send_mode,
            self.metadata(),
            middleware,
            transport,
        )?);
        Ok(())
    }

    /// Flush pending events and disconnect
    pub fn stop(&mut self) {
        if let Some(mut sender) = self.sender.take() {
            sender.close();
        }
    }

    /// Append a log entry or an access event
    ///
    /// # Errors
    ///
    /// [`LoggerError::UnsupportedEvent`] for any other payload type.
    pub fn append_any<T: Any>(&mut self, event: &T) -> Result<()> {
        let Some(sender) = self.sender.as_ref() else {
            return Ok(());
        };

        let event: &dyn Any = event;
        if let Some(entry) = event.downcast_ref::<LogEntry>() {
            return sender.send(&self.entry_event(entry));
        }
        if let Some(access) = event.downcast_ref::<AccessEvent>() {
            return sender.send(&HecEvent::from_access(access));
        }
        Err(LoggerError::unsupported_event(std::any::type_name::<T>()))
    }

    fn entry_event(&self, entry: &LogEntry) -> HecEvent {
        let message = self
            .config
            .output_format
            .format(entry, &TimestampFormat::default());
        HecEvent::from_entry(entry, message)
    }

    fn metadata(&self) -> HecMetadata {
        let host = self.config.host.clone().or_else(|| {
            hostname::get()
                .ok()
                .and_then(|name| name.into_string().ok())
        });
        HecMetadata {
            host,
            index: self.config.index.clone(),
            source: self.config.source.clone(),
            sourcetype: self.config.sourcetype.clone(),
        }
    }
}

impl Appender for HecAppender {
    fn append(&mut self, entry: &LogEntry) -> Result<()> {
        match self.sender.as_ref() {
            Some(sender) => sender.send(&self.entry_event(entry)),
            None => Ok(()),
        }
    }

    fn flush(&mut self) -> Result<()> {
        match self.sender.as_ref() {
            Some(sender) => sender.flush(),
            None => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "hec"
    }
}

impl Drop for HecAppender {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::sender::testing::MemoryTransport;
    use super::*;
    use crate::core::{LogLevel, Mdc};

    fn started(config: HecConfig, transport: &MemoryTransport) -> HecAppender {
        let mut appender = HecAppender::with_transport(config, transport.clone());
        appender.start().unwrap();
        appender
    }

    fn json(payload: &str) -> serde_json::Value {
        serde_json::from_str(payload).unwrap()
    }

    #[test]
    fn entry_becomes_flat_event() {
        let transport = MemoryTransport::default();
        let config = HecConfig::builder("http://hec", "t")
            .host("web-1")
            .sourcetype("opslog")
            .build();
        let mut appender = started(config, &transport);

        let _request = Mdc::put("request", "r-9");
        let entry = LogEntry::new(LogLevel::Warn, "c=\"Foo\" p=\"run\"").with_logger("app::Foo");
        appender.append(&entry).unwrap();
        appender.flush().unwrap();

        let posted = transport.posted();
        assert_eq!(posted.len(), 1);
        let event = json(&posted[0]);
        assert_eq!(event["event"], "c=\"Foo\" p=\"run\"");
        assert_eq!(event["host"], "web-1");
        assert_eq!(event["sourcetype"], "opslog");
        assert_eq!(event["fields"]["severity"], "WARN");
        assert_eq!(event["fields"]["logger"], "app::Foo");
        assert_eq!(event["fields"]["request"], "r-9");
        assert_eq!(appender.metrics().map(LoggerMetrics::delivered), Some(1));
    }

    #[test]
    fn access_events_are_accepted() {
        let transport = MemoryTransport::default();
        let mut appender = started(HecConfig::builder("http://hec", "t").build(), &transport);

        appender
            .append_any(&AccessEvent::new("POST", "/orders", 201))
            .unwrap();
        appender.flush().unwrap();

        let event = json(&transport.posted()[0]);
        assert_eq!(event["fields"]["logger"], ACCESS_LOGGER);
        assert_eq!(event["fields"]["severity"], "INFO");
    }

    #[test]
    fn unsupported_payload_is_rejected() {
        let transport = MemoryTransport::default();
        let mut appender = started(HecConfig::builder("http://hec", "t").build(), &transport);

        let err = appender.append_any(&42u32).unwrap_err();
        assert!(matches!(err, LoggerError::UnsupportedEvent { ref type_name } if type_name == "u32"));

        appender
            .append_any(&LogEntry::new(LogLevel::Info, "a=1"))
            .unwrap();
        appender.flush().unwrap();
        assert_eq!(transport.posted().len(), 1);
    }

    #[test]
    fn stopped_appender_ignores_events() {
        let transport = MemoryTransport::default();
        let mut appender =
            HecAppender::with_transport(HecConfig::builder("http://hec", "t").build(), transport.clone());

        appender.append(&LogEntry::new(LogLevel::Info, "early")).unwrap();
        appender.append_any(&"not an event").unwrap();
        assert!(!appender.is_started());

        appender.start().unwrap();
        appender.stop();
        appender.append(&LogEntry::new(LogLevel::Info, "late")).unwrap();
        assert!(transport.posted().is_empty());
    }

    #[test]
    fn stop_flushes_pending_batch() {
        let transport = MemoryTransport::default();
        let config = HecConfig::builder("http://hec", "t").batch_count(100).build();
        let mut appender = started(config, &transport);

        appender.append(&LogEntry::new(LogLevel::Info, "a=1")).unwrap();
        appender.append(&LogEntry::new(LogLevel::Info, "a=2")).unwrap();
        appender.stop();

        let posted = transport.posted();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].matches("\"event\"").count(), 2);
    }

    #[test]
    fn unknown_middleware_is_skipped() {
        let transport = MemoryTransport::default();
        let config = HecConfig::builder("http://hec", "t")
            .middleware("hec_tests::does_not_exist")
            .build();
        let mut appender = started(config, &transport);

        appender.append(&LogEntry::new(LogLevel::Info, "a=1")).unwrap();
        appender.flush().unwrap();
        assert_eq!(transport.posted().len(), 1);
    }

    #[test]
    fn start_without_url_fails() {
        let mut appender = HecAppender::new(HecConfig::default());
        assert!(appender.start().is_err());
        assert!(!appender.is_started());
    }
}
