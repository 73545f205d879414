//! Leveled destinations for rendered lines
//!
//! A [`Sink`] receives lines on behalf of a target, the name of the class that
//! produced them. The [`SinkRegistry`] maps class path prefixes to sinks the
//! way logger hierarchies do: the longest bound prefix wins.

use crate::appenders::ConsoleAppender;
use crate::caller::ClassRef;
use crate::core::logger::covers;
use crate::core::{LogLevel, Logger};
use crate::encoder::LineEncoder;
use parking_lot::RwLock;
use std::error::Error;
use std::fmt;
use std::sync::{Arc, OnceLock};

static GLOBAL_SINKS: OnceLock<SinkRegistry> = OnceLock::new();

/// A leveled logging destination
pub trait Sink: Send + Sync {
    fn is_enabled(&self, target: &str, level: LogLevel) -> bool;

    /// Deliver one line; `error` is present when its trace should be logged too
    fn emit(&self, target: &str, level: LogLevel, line: &str, error: Option<&(dyn Error + 'static)>);
}

impl Sink for Logger {
    fn is_enabled(&self, target: &str, level: LogLevel) -> bool {
        Logger::is_enabled(self, target, level)
    }

    fn emit(&self, target: &str, level: LogLevel, line: &str, error: Option<&(dyn Error + 'static)>) {
        self.log_for(target, level, line, error);
    }
}

/// A sink bound to one target
#[derive(Clone)]
pub struct ClassSink {
    target: &'static str,
    sink: Arc<dyn Sink>,
}

impl ClassSink {
    pub fn new(target: &'static str, sink: Arc<dyn Sink>) -> Self {
        Self { target, sink }
    }

    pub fn target(&self) -> &'static str {
        self.target
    }

    pub fn is_enabled(&self, level: LogLevel) -> bool {
        self.sink.is_enabled(self.target, level)
    }

    pub fn emit(&self, level: LogLevel, line: &str, error: Option<&(dyn Error + 'static)>) {
        self.sink.emit(self.target, level, line, error);
    }
}

impl fmt::Debug for ClassSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassSink")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

/// Class path prefixes bound to sinks
#[derive(Default)]
pub struct SinkRegistry {
    bindings: RwLock<Vec<(String, Arc<dyn Sink>)>>,
    default_sink: RwLock<Option<Arc<dyn Sink>>>,
}

impl SinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry used by [`LineEncoder`] severity methods
    pub fn global() -> &'static SinkRegistry {
        GLOBAL_SINKS.get_or_init(SinkRegistry::new)
    }

    /// Bind `prefix` and every path below it to `sink`, replacing any
    /// previous binding of the same prefix
    pub fn bind(&self, prefix: impl Into<String>, sink: Arc<dyn Sink>) {
        let prefix = prefix.into();
        let mut bindings = self.bindings.write();
        match bindings.iter_mut().find(|(bound, _)| *bound == prefix) {
            Some(existing) => existing.1 = sink,
            None => bindings.push((prefix, sink)),
        }
    }

    pub fn bind_class(&self, class: ClassRef, sink: Arc<dyn Sink>) {
        self.bind(class.name(), sink);
    }

    pub fn unbind(&self, prefix: &str) -> Option<Arc<dyn Sink>> {
        let mut bindings = self.bindings.write();
        let index = bindings.iter().position(|(bound, _)| bound == prefix)?;
        Some(bindings.remove(index).1)
    }

    /// Replace the sink used when nothing else matches
    pub fn set_default(&self, sink: Arc<dyn Sink>) {
        *self.default_sink.write() = Some(sink);
    }

    /// The default sink, created on first use as an info-level console logger
    pub fn default_sink(&self) -> Arc<dyn Sink> {
        if let Some(sink) = self.default_sink.read().as_ref() {
            return Arc::clone(sink);
        }
        let mut slot = self.default_sink.write();
        let sink = slot.get_or_insert_with(|| {
            let logger: Arc<dyn Sink> = Arc::new(
                Logger::builder()
                    .min_level(LogLevel::Info)
                    .appender(ConsoleAppender::new())
                    .build(),
            );
            logger
        });
        Arc::clone(sink)
    }

    /// Sink for lines attributed to `class`
    ///
    /// Falls back to the binding for [`LineEncoder`] and then to the default
    /// sink. The target is the class name when the class is known.
    pub fn sink_for(&self, class: Option<&ClassRef>) -> ClassSink {
        let encoder = LineEncoder::class();
        let target = class.map_or(encoder.name(), ClassRef::name);

        let sink = class
            .and_then(|class| self.lookup(class.name()))
            .or_else(|| self.lookup(encoder.name()))
            .unwrap_or_else(|| self.default_sink());
        ClassSink::new(target, sink)
    }

    /// Sink of the longest bound prefix covering `name`
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Sink>> {
        self.bindings
            .read()
            .iter()
            .filter(|(prefix, _)| covers(prefix, name))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, sink)| Arc::clone(sink))
    }
}

impl fmt::Debug for SinkRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefixes: Vec<String> = self
            .bindings
            .read()
            .iter()
            .map(|(prefix, _)| prefix.clone())
            .collect();
        f.debug_struct("SinkRegistry")
            .field("bindings", &prefixes)
            .field("has_default", &self.default_sink.read().is_some())
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingSink;
    use super::*;

    fn ids(sink: &Arc<dyn Sink>) -> *const () {
        Arc::as_ptr(sink) as *const ()
    }

    #[test]
    fn longest_prefix_wins() {
        let registry = SinkRegistry::new();
        let app: Arc<dyn Sink> = RecordingSink::new(LogLevel::Info);
        let db: Arc<dyn Sink> = RecordingSink::new(LogLevel::Info);
        registry.bind("app", Arc::clone(&app));
        registry.bind("app::db", Arc::clone(&db));

        let found = registry.lookup("app::db::Pool").unwrap();
        assert_eq!(ids(&found), ids(&db));

        let found = registry.lookup("app::web::Handler").unwrap();
        assert_eq!(ids(&found), ids(&app));

        assert!(registry.lookup("application::Main").is_none());
    }

    #[test]
    fn unresolved_class_uses_encoder_binding() {
        let registry = SinkRegistry::new();
        let encoder_sink = RecordingSink::new(LogLevel::Trace);
        registry.bind_class(LineEncoder::class(), encoder_sink.clone());

        let sink = registry.sink_for(None);
        assert_eq!(sink.target(), LineEncoder::class().name());
        sink.emit(LogLevel::Info, "c=\"X\"", None);
        assert_eq!(encoder_sink.take().len(), 1);
    }

    #[test]
    fn unbound_class_falls_back_to_default() {
        let registry = SinkRegistry::new();
        let fallback = RecordingSink::new(LogLevel::Warn);
        registry.set_default(fallback.clone());

        let class = ClassRef::named("app::Unbound");
        let sink = registry.sink_for(Some(&class));
        assert_eq!(sink.target(), "app::Unbound");
        assert!(!sink.is_enabled(LogLevel::Info));
        assert!(sink.is_enabled(LogLevel::Error));
    }

    #[test]
    fn unbind_removes_binding() {
        let registry = SinkRegistry::new();
        registry.bind("app", RecordingSink::new(LogLevel::Info));
        assert!(registry.unbind("app").is_some());
        assert!(registry.unbind("app").is_none());
        assert!(registry.lookup("app::Foo").is_none());
    }

    #[test]
    fn default_sink_is_created_once() {
        let registry = SinkRegistry::new();
        let first = registry.default_sink();
        let second = registry.default_sink();
        assert_eq!(ids(&first), ids(&second));
        assert!(!first.is_enabled("app::Foo", LogLevel::Debug));
        assert!(first.is_enabled("app::Foo", LogLevel::Info));
    }

    #[test]
    fn logger_is_a_sink() {
        let logger = Logger::builder().min_level(LogLevel::Warn).build();
        logger.set_target_level("app::db", LogLevel::Debug);
        let sink: &dyn Sink = &logger;

        assert!(sink.is_enabled("app::db::Pool", LogLevel::Debug));
        assert!(!sink.is_enabled("app::web", LogLevel::Info));
    }
}
