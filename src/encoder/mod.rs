//! Ordered key=value line builder
//!
//! A [`LineEncoder`] created through [`opslog!`](crate::opslog) or
//! [`LineEncoder::entry_point`] starts with two fields describing its caller:
//! `c`, the simple name of the calling class, and `p`, the calling method.
//! Fields are then chained on and the line is emitted at a level:
//!
//! ```
//! use rust_opslog::prelude::*;
//!
//! struct Checkout;
//!
//! impl Checkout {
//!     fn submit(&self) -> String {
//!         opslog!().add("items", 3).add("user", "ann").render()
//!     }
//! }
//!
//! assert_eq!(Checkout.submit(), r#"c="Checkout" p="submit" items=3 user="ann""#);
//! ```

mod value;

pub use value::{escape, format_timestamp, FieldValue, NULL_TEXT};

use crate::caller::{Caller, CallerResolver, ClassRef, FrameGuard};
use crate::core::{LogLevel, Result};
use crate::emitter::SinkRegistry;
use std::error::Error;
use std::fmt;

pub const COMPONENT_KEY: &str = "c";
pub const PROCESS_KEY: &str = "p";
pub const MESSAGE_KEY: &str = "msg";
pub const ERROR_TYPE_KEY: &str = "exc";
pub const ERROR_MESSAGE_KEY: &str = "excmsg";

/// Component and process value when nothing is known about the caller
pub const UNKNOWN: &str = "unknown";

struct AttachedError {
    error: Box<dyn Error + Send + Sync + 'static>,
    forward_trace: bool,
}

/// An ordered set of `key=value` fields
///
/// Setting an existing key replaces its value in place. Emitting does not
/// consume or clear the fields, so one encoder may be emitted several times.
pub struct LineEncoder {
    fields: Vec<(String, FieldValue)>,
    error: Option<AttachedError>,
    class: Option<ClassRef>,
    caller_name: Option<String>,
}

impl LineEncoder {
    /// An empty encoder that is not attributed to any caller
    pub fn new() -> Self {
        Self {
            fields: Vec::new(),
            error: None,
            class: None,
            caller_name: None,
        }
    }

    /// The class marking the encoder's boundary on the call stack
    pub fn class() -> ClassRef {
        ClassRef::of::<LineEncoder>()
    }

    /// Create an encoder attributed to whoever called this function
    ///
    /// # Panics
    ///
    /// Panics if the encoder frames cannot be found on the call stack or
    /// nothing called them, see [`try_entry_point`](Self::try_entry_point).
    #[inline(never)]
    pub fn entry_point() -> Self {
        match Self::attributed() {
            Ok(encoder) => encoder,
            Err(err) => panic!("{err}"),
        }
    }

    #[inline(never)]
    pub fn try_entry_point() -> Result<Self> {
        Self::attributed()
    }

    #[inline(never)]
    fn attributed() -> Result<Self> {
        let class = Self::class();
        let _frame = FrameGuard::enter(class, "entry_point");
        let caller = CallerResolver::global().locate_caller(&class)?;
        Ok(Self::for_caller(caller))
    }

    /// Encoder pre-populated from an already located caller
    pub fn for_caller(caller: Option<Caller>) -> Self {
        let Some(caller) = caller else {
            return Self::new().with_component(UNKNOWN).with_process(UNKNOWN);
        };

        let component = caller.simple_name();
        let process = if caller.method.is_empty() {
            UNKNOWN.to_string()
        } else {
            caller.method.clone()
        };

        let mut encoder = Self::new().with_component(component).with_process(process);
        encoder.class = caller.class;
        encoder.caller_name = Some(caller.class_name);
        encoder
    }

    /// Class the encoder was attributed to, when it could be resolved
    pub fn caller_class(&self) -> Option<ClassRef> {
        self.class
    }

    /// Fully qualified name of the calling class, resolved or not
    pub fn caller_name(&self) -> Option<&str> {
        self.caller_name.as_deref()
    }

    #[must_use]
    pub fn add(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set(key.into(), value.into());
        self
    }

    /// Add the quoted `Display` form of `value`
    #[must_use]
    pub fn add_display(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.set(key.into(), FieldValue::Text(value.to_string()));
        self
    }

    /// Add `value` unquoted and unescaped
    #[must_use]
    pub fn add_raw(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.set(key.into(), FieldValue::raw(value));
        self
    }

    /// Keep the key but leave it out of the rendered line
    #[must_use]
    pub fn unset(mut self, key: impl Into<String>) -> Self {
        self.set(key.into(), FieldValue::Null);
        self
    }

    #[must_use]
    pub fn set_message(self, message: impl Into<String>) -> Self {
        self.add(MESSAGE_KEY, message.into())
    }

    #[must_use]
    pub fn with_component(self, component: impl Into<String>) -> Self {
        self.add(COMPONENT_KEY, component.into())
    }

    #[must_use]
    pub fn with_process(self, process: impl Into<String>) -> Self {
        self.add(PROCESS_KEY, process.into())
    }

    /// Attach an error and forward it to the sink for trace logging
    #[must_use]
    pub fn attach_error<E>(self, error: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        self.attach_error_with(error, true)
    }

    /// Attach an error as fields only
    #[must_use]
    pub fn attach_error_without_trace<E>(self, error: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        self.attach_error_with(error, false)
    }

    /// Record `exc` and `excmsg` for `error`
    ///
    /// With `include_trace` the error also goes to the sink on emission and
    /// the emitted line ends with a line break.
    #[must_use]
    pub fn attach_error_with<E>(mut self, error: E, include_trace: bool) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        self.set(
            ERROR_TYPE_KEY.to_string(),
            FieldValue::text(std::any::type_name::<E>()),
        );
        self.set(
            ERROR_MESSAGE_KEY.to_string(),
            FieldValue::Text(error.to_string()),
        );
        self.error = Some(AttachedError {
            error: Box::new(error),
            forward_trace: include_trace,
        });
        self
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value)
    }

    /// Fields in insertion order, including unset ones
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Space separated `key=value` pairs in insertion order
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.fields {
            if value.is_null() {
                continue;
            }
            if !out.is_empty() {
                out.push(' ');
            }
            value::push_escaped(&mut out, key);
            out.push('=');
            value.write_to(&mut out);
        }
        out
    }

    pub fn at(self, level: LogLevel) -> Self {
        self.emit_to(SinkRegistry::global(), level)
    }

    /// Emit through `registry` instead of the global one
    pub fn emit_to(self, registry: &SinkRegistry, level: LogLevel) -> Self {
        let sink = registry.sink_for(self.class.as_ref());
        if !sink.is_enabled(level) {
            return self;
        }

        let forwarded = self
            .error
            .as_ref()
            .filter(|attached| attached.forward_trace)
            .map(|attached| attached.error.as_ref() as &(dyn Error + 'static));

        let mut line = self.render();
        if forwarded.is_some() {
            line.push('\n');
        }
        sink.emit(level, &line, forwarded);
        self
    }

    pub fn trace(self) -> Self {
        self.at(LogLevel::Trace)
    }

    pub fn debug(self) -> Self {
        self.at(LogLevel::Debug)
    }

    pub fn info(self) -> Self {
        self.at(LogLevel::Info)
    }

    pub fn warn(self) -> Self {
        self.at(LogLevel::Warn)
    }

    pub fn error(self) -> Self {
        self.at(LogLevel::Error)
    }

    pub fn fatal(self) -> Self {
        self.at(LogLevel::Fatal)
    }

    fn set(&mut self, key: String, value: FieldValue) {
        match self.fields.iter_mut().find(|(existing, _)| *existing == key) {
            Some(field) => field.1 = value,
            None => self.fields.push((key, value)),
        }
    }
}

impl Default for LineEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LineEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl fmt::Debug for LineEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineEncoder")
            .field("fields", &self.fields)
            .field("class", &self.class)
            .field("has_error", &self.error.is_some())
            .finish()
    }
}
