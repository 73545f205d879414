//! Leveled logger backing the line encoder's sinks

use super::{
    appender::Appender,
    error::Result,
    log_entry::LogEntry,
    log_level::LogLevel,
    metrics::LoggerMetrics,
    overflow_policy::{LogPriority, OverflowCallback, OverflowPolicy},
};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::RwLock;
use std::error::Error;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Default shutdown timeout for logger cleanup (5 seconds)
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

type Appenders = Arc<RwLock<Vec<Box<dyn Appender>>>>;

/// A leveled logger with synchronous or batched asynchronous dispatch
///
/// Entries are filtered by a minimum level, optionally refined per target
/// prefix (`app::net` also covers `app::net::Client`), and handed to every
/// appender.
pub struct Logger {
    min_level: RwLock<LogLevel>,
    target_levels: RwLock<Vec<(String, LogLevel)>>,
    appenders: Appenders,
    sender: Option<Sender<LogEntry>>,
    async_handle: Option<thread::JoinHandle<()>>,
    metrics: Arc<LoggerMetrics>,
    overflow_policy: OverflowPolicy,
    on_overflow: Option<OverflowCallback>,
}

impl Logger {
    #[must_use]
    pub fn new() -> Self {
        Self {
            min_level: RwLock::new(LogLevel::Info),
            target_levels: RwLock::new(Vec::new()),
            appenders: Arc::new(RwLock::new(Vec::new())),
            sender: None,
            async_handle: None,
            metrics: Arc::new(LoggerMetrics::new()),
            overflow_policy: OverflowPolicy::AlertAndDrop,
            on_overflow: None,
        }
    }

    #[must_use]
    pub fn with_async(buffer_size: usize) -> Self {
        Self::with_async_config(buffer_size, OverflowPolicy::AlertAndDrop, None)
    }

    /// Create an async logger with custom overflow configuration
    #[must_use]
    pub fn with_async_config(
        buffer_size: usize,
        overflow_policy: OverflowPolicy,
        on_overflow: Option<OverflowCallback>,
    ) -> Self {
        let (sender, receiver) = bounded(buffer_size);
        let mut logger = Self::new();
        let appenders = Arc::clone(&logger.appenders);
        let metrics = Arc::clone(&logger.metrics);

        let handle = thread::Builder::new()
            .name("opslog-worker".to_string())
            .spawn(move || Self::run_worker(receiver, appenders, metrics));

        match handle {
            Ok(handle) => {
                logger.sender = Some(sender);
                logger.async_handle = Some(handle);
            }
            Err(e) => {
                eprintln!(
                    "[LOGGER ERROR] Failed to spawn async worker, logging synchronously: {}",
                    e
                );
            }
        }
        logger.overflow_policy = overflow_policy;
        logger.on_overflow = on_overflow;
        logger
    }

    /// Drain the queue in batches until every sender is gone
    fn run_worker(receiver: Receiver<LogEntry>, appenders: Appenders, metrics: Arc<LoggerMetrics>) {
        const BATCH_SIZE: usize = 50;
        const BATCH_TIMEOUT: Duration = Duration::from_millis(10);

        let mut batch = Vec::with_capacity(BATCH_SIZE);
        while let Ok(entry) = receiver.recv() {
            batch.push(entry);
            batch.extend(receiver.try_iter().take(BATCH_SIZE - 1));

            if batch.len() < BATCH_SIZE {
                // Small batch: give producers a moment to fill it up.
                thread::sleep(BATCH_TIMEOUT);
                let room = BATCH_SIZE - batch.len();
                batch.extend(receiver.try_iter().take(room));
            }

            Self::process_batch(&appenders, &batch, &metrics);
            batch.clear();
        }
    }

    fn process_batch(appenders: &Appenders, batch: &[LogEntry], metrics: &LoggerMetrics) {
        let mut appenders = appenders.write();
        for entry in batch {
            Self::dispatch(&mut appenders, entry, metrics);
        }
    }

    /// Hand one entry to every appender, isolating failures and panics
    fn dispatch(
        appenders: &mut [Box<dyn Appender>],
        entry: &LogEntry,
        metrics: &LoggerMetrics,
    ) {
        let mut has_error = false;

        for appender in appenders.iter_mut() {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                appender.append(entry)
            }));
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    eprintln!("[LOGGER ERROR] Appender '{}' failed: {}", appender.name(), e);
                    has_error = true;
                }
                Err(panic_info) => {
                    eprintln!(
                        "[LOGGER CRITICAL] Appender '{}' panicked: {}. \
                         Other appenders continue to function.",
                        appender.name(),
                        panic_message(&*panic_info)
                    );
                    has_error = true;
                }
            }
        }

        if has_error {
            metrics.record_dropped(1);
        } else {
            metrics.record_delivered(1);
        }
    }

    pub fn add_appender(&mut self, appender: Box<dyn Appender>) {
        self.appenders.write().push(appender);
    }

    pub fn set_min_level(&self, level: LogLevel) {
        *self.min_level.write() = level;
    }

    pub fn min_level(&self) -> LogLevel {
        *self.min_level.read()
    }

    /// Override the minimum level for a target and everything below it
    pub fn set_target_level(&self, prefix: impl Into<String>, level: LogLevel) {
        let prefix = prefix.into();
        let mut levels = self.target_levels.write();
        match levels.iter_mut().find(|(p, _)| *p == prefix) {
            Some(existing) => existing.1 = level,
            None => levels.push((prefix, level)),
        }
    }

    /// Effective minimum level for a target
    pub fn level_for(&self, target: &str) -> LogLevel {
        let levels = self.target_levels.read();
        levels
            .iter()
            .filter(|(prefix, _)| covers(prefix, target))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, level)| *level)
            .unwrap_or_else(|| *self.min_level.read())
    }

    pub fn is_enabled(&self, target: &str, level: LogLevel) -> bool {
        level >= self.level_for(target)
    }

    pub fn log(&self, level: LogLevel, message: impl AsRef<str>) {
        if level < *self.min_level.read() {
            return;
        }
        self.send_entry(LogEntry::new(level, message));
    }

    /// Log on behalf of a named target, with an optional error
    pub fn log_for(
        &self,
        target: &str,
        level: LogLevel,
        message: &str,
        error: Option<&(dyn Error + 'static)>,
    ) {
        if !self.is_enabled(target, level) {
            return;
        }
        let mut entry = LogEntry::new(level, message).with_logger(target);
        if let Some(error) = error {
            entry = entry.with_error(error);
        }
        self.send_entry(entry);
    }

    /// Queue the entry, or write it in place for a synchronous logger
    pub fn send_entry(&self, entry: LogEntry) {
        let Some(ref sender) = self.sender else {
            let mut appenders = self.appenders.write();
            Self::dispatch(&mut appenders, &entry, &self.metrics);
            return;
        };

        let priority = entry.level.priority();
        match sender.try_send(entry) {
            Ok(()) => {}
            Err(TrySendError::Full(entry)) => self.handle_overflow(entry, priority),
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    fn handle_overflow(&self, entry: LogEntry, priority: LogPriority) {
        self.metrics.record_queue_full();

        if priority == LogPriority::Critical {
            self.metrics.record_critical_bypass();
            let mut appenders = self.appenders.write();
            Self::dispatch(&mut appenders, &entry, &self.metrics);
            return;
        }

        match &self.overflow_policy {
            OverflowPolicy::DropNewest => {
                self.metrics.record_dropped(1);
            }
            OverflowPolicy::Block => {
                self.metrics.record_block();
                if let Some(ref sender) = self.sender {
                    let _ = sender.send(entry);
                }
            }
            OverflowPolicy::BlockWithTimeout(timeout) => {
                self.metrics.record_block();
                if let Some(ref sender) = self.sender {
                    if sender.send_timeout(entry, *timeout).is_err() {
                        self.alert_and_drop();
                    }
                }
            }
            OverflowPolicy::AlertAndDrop => self.alert_and_drop(),
        }
    }

    fn alert_and_drop(&self) {
        let dropped = self.metrics.record_dropped(1);

        if dropped == 1 || dropped % 1000 == 0 {
            eprintln!(
                "[LOGGER WARNING] Queue full, {} logs dropped. \
                 Consider increasing buffer size or using a different overflow policy.",
                dropped
            );
            if let Some(ref callback) = self.on_overflow {
                callback(dropped);
            }
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.metrics.dropped()
    }

    pub fn metrics(&self) -> &LoggerMetrics {
        &self.metrics
    }

    pub fn flush(&self) -> Result<()> {
        let mut appenders = self.appenders.write();
        for appender in appenders.iter_mut() {
            appender.flush()?;
        }
        Ok(())
    }

    #[inline]
    pub fn trace(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Trace, message);
    }

    #[inline]
    pub fn debug(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Debug, message);
    }

    #[inline]
    pub fn info(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Info, message);
    }

    #[inline]
    pub fn warn(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Warn, message);
    }

    #[inline]
    pub fn error(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Error, message);
    }

    #[inline]
    pub fn fatal(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Fatal, message);
    }

    /// Drain pending entries and flush, waiting at most `timeout`
    ///
    /// Returns `false` if the worker did not finish in time or a flush failed.
    /// Dropping the logger performs the same steps with
    /// [`DEFAULT_SHUTDOWN_TIMEOUT`].
    pub fn shutdown(&mut self, timeout: Duration) -> bool {
        drop(self.sender.take());

        let mut clean = true;
        if let Some(handle) = self.async_handle.take() {
            let start = Instant::now();
            while !handle.is_finished() {
                if start.elapsed() >= timeout {
                    eprintln!(
                        "[LOGGER WARNING] Async worker thread did not finish within {:?}. \
                         Some logs may be lost.",
                        timeout
                    );
                    return false;
                }
                thread::sleep(Duration::from_millis(10));
            }
            if let Err(e) = handle.join() {
                eprintln!(
                    "[LOGGER ERROR] Async worker thread panicked during shutdown: {:?}",
                    e
                );
                clean = false;
            }
        }

        if let Err(e) = self.flush() {
            eprintln!("[LOGGER ERROR] Failed to flush during shutdown: {}", e);
            clean = false;
        }
        clean
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        self.shutdown(DEFAULT_SHUTDOWN_TIMEOUT);

        let snapshot = self.metrics.snapshot();
        if snapshot.dropped > 0 {
            eprintln!(
                "[LOGGER WARNING] Logger shutting down with {} dropped logs (drop rate: {:.2}%)",
                snapshot.dropped,
                snapshot.drop_rate()
            );
        }
    }
}

/// Whether `prefix` names `target` or one of its `::` ancestors
pub(crate) fn covers(prefix: &str, target: &str) -> bool {
    match target.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with("::") || prefix.is_empty(),
        None => false,
    }
}

fn panic_message(panic_info: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

/// Builder for constructing Logger with a fluent API
///
/// # Example
/// ```
/// use rust_opslog::prelude::*;
///
/// let logger = Logger::builder()
///     .min_level(LogLevel::Debug)
///     .target_level("app::noisy", LogLevel::Warn)
///     .appender(ConsoleAppender::new())
///     .async_mode(1000)
///     .build();
/// assert!(!logger.is_enabled("app::noisy::Poller", LogLevel::Info));
/// ```
pub struct LoggerBuilder {
    min_level: LogLevel,
    target_levels: Vec<(String, LogLevel)>,
    appenders: Vec<Box<dyn Appender>>,
    async_buffer: Option<usize>,
    overflow_policy: OverflowPolicy,
    on_overflow: Option<OverflowCallback>,
}

impl LoggerBuilder {
    pub fn new() -> Self {
        Self {
            min_level: LogLevel::Info,
            target_levels: Vec::new(),
            appenders: Vec::new(),
            async_buffer: None,
            overflow_policy: OverflowPolicy::AlertAndDrop,
            on_overflow: None,
        }
    }

    #[must_use = "builder methods return a new value"]
    pub fn min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn target_level(mut self, prefix: impl Into<String>, level: LogLevel) -> Self {
        self.target_levels.push((prefix.into(), level));
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn appender<A: Appender + 'static>(mut self, appender: A) -> Self {
        self.appenders.push(Box::new(appender));
        self
    }

    /// Enable async mode; without it the logger writes synchronously
    #[must_use = "builder methods return a new value"]
    pub fn async_mode(mut self, buffer_size: usize) -> Self {
        self.async_buffer = Some(buffer_size);
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = policy;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn on_overflow(mut self, callback: OverflowCallback) -> Self {
        self.on_overflow = Some(callback);
        self
    }

    pub fn build(self) -> Logger {
        let mut logger = match self.async_buffer {
            Some(size) => Logger::with_async_config(size, self.overflow_policy, self.on_overflow),
            None => Logger::new(),
        };

        logger.set_min_level(self.min_level);
        for (prefix, level) in self.target_levels {
            logger.set_target_level(prefix, level);
        }
        for appender in self.appenders {
            logger.add_appender(appender);
        }
        logger
    }
}

impl Default for LoggerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger {
    #[must_use]
    pub fn builder() -> LoggerBuilder {
        LoggerBuilder::new()
    }
}
