//! Call-site attribution
//!
//! Finds the class (type, trait or module path) and method that called into a
//! reference class. The call stack is scanned innermost first; the reference
//! class may occupy several consecutive frames, and the caller is the first
//! frame past its last one.
//!
//! Two [`StackInspector`] strategies exist and are tried in order by
//! [`CallerResolver`]:
//!
//! 1. [`StackContextInspector`] reads the thread-local shadow stack maintained
//!    by [`FrameGuard`]s. It yields [`ClassRef`]s directly, but the facility
//!    can be disabled for the whole process.
//! 2. [`StackTraceInspector`] captures a [`std::backtrace::Backtrace`], parses
//!    its symbol names and resolves the caller's class name through the
//!    [`ClassRegistry`].

mod registry;
mod stack_context;
mod stack_trace;

pub use registry::ClassRegistry;
pub use stack_context::{FrameGuard, StackContextInspector, StackContextState, STACK_CONTEXT_ENV};
pub use stack_trace::{parse_frames, StackTraceInspector};

use crate::core::{LoggerError, Result};
use std::fmt;

/// A class as seen by the attribution machinery
///
/// The name is a fully qualified `::` path in [`std::any::type_name`] form.
/// Inherent methods belong to their self type, trait default methods to the
/// trait and free functions to their module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassRef {
    name: &'static str,
}

impl ClassRef {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::named(std::any::type_name::<T>())
    }

    pub const fn named(name: &'static str) -> Self {
        Self { name }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Unqualified name, see [`simple_name`]
    pub fn simple_name(&self) -> String {
        simple_name(self.name)
    }
}

impl fmt::Display for ClassRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// One `(class, method)` pair of a textual stack trace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub class_name: String,
    pub method_name: String,
}

/// The frame found just outside a reference class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    /// `None` when the class name could not be resolved to a known class
    pub class: Option<ClassRef>,
    pub class_name: String,
    pub method: String,
}

impl Caller {
    pub fn simple_name(&self) -> String {
        simple_name(&self.class_name)
    }
}

/// A strategy for reading the current thread's call stack
pub trait StackInspector {
    /// Locate the caller of `reference`
    ///
    /// Returns `Ok(None)` when the strategy cannot answer at all, and
    /// [`LoggerError::StackIntegrity`] when `reference` is not on the stack or
    /// nothing called it.
    fn caller_of(&self, reference: &ClassRef) -> Result<Option<Caller>>;
}

/// Tries a fast inspector, then a fallback inspector
pub struct CallerResolver<F, S> {
    fast: F,
    fallback: S,
}

impl CallerResolver<StackContextInspector<'static>, StackTraceInspector<'static>> {
    /// Resolver over the process-wide stack context and class registry
    pub fn global() -> Self {
        Self::new(StackContextInspector::global(), StackTraceInspector::global())
    }
}

impl<F: StackInspector, S: StackInspector> CallerResolver<F, S> {
    pub fn new(fast: F, fallback: S) -> Self {
        Self { fast, fallback }
    }

    /// Class and method of the frame below `reference`
    pub fn locate_caller(&self, reference: &ClassRef) -> Result<Option<Caller>> {
        if let Some(caller) = self.fast.caller_of(reference)? {
            return Ok(Some(caller));
        }
        self.fallback.caller_of(reference)
    }

    /// Class of the frame below `reference`, `None` when unknown
    pub fn resolve_caller_of(&self, reference: &ClassRef) -> Result<Option<ClassRef>> {
        Ok(self.locate_caller(reference)?.and_then(|caller| caller.class))
    }
}

impl<F: StackInspector, S: StackInspector> StackInspector for CallerResolver<F, S> {
    fn caller_of(&self, reference: &ClassRef) -> Result<Option<Caller>> {
        self.locate_caller(reference)
    }
}

/// Class of whatever called into `reference` on this thread
pub fn resolve_caller_of(reference: &ClassRef) -> Result<Option<ClassRef>> {
    CallerResolver::global().resolve_caller_of(reference)
}

/// First frame past the last consecutive run of reference frames
///
/// Frames are given innermost first.
pub(crate) fn frame_below<T>(
    frames: impl IntoIterator<Item = T>,
    is_reference: impl Fn(&T) -> bool,
) -> Option<T> {
    let mut found = false;
    for frame in frames {
        if is_reference(&frame) {
            found = true;
        } else if found {
            return Some(frame);
        }
    }
    None
}

pub(crate) fn missing_caller(reference: &ClassRef) -> LoggerError {
    LoggerError::stack_integrity(reference.name())
}

/// Split a function path into its class and method
///
/// Accepts [`std::any::type_name`] output of function items as well as
/// demangled symbol names: trailing closure segments (`{{closure}}`,
/// `{closure#0}`) and symbol hashes (`::h0123456789abcdef`) are skipped and
/// `<T as Trait>` qualification is reduced to `T`.
///
/// ```
/// use rust_opslog::caller::split_callable;
///
/// assert_eq!(split_callable("app::Foo::run"), Some(("app::Foo", "run")));
/// assert_eq!(
///     split_callable("<app::Foo as core::fmt::Display>::fmt"),
///     Some(("app::Foo", "fmt"))
/// );
/// assert_eq!(split_callable("main"), None);
/// ```
pub fn split_callable(path: &str) -> Option<(&str, &str)> {
    let path = path.trim();
    let spans = segment_spans(path);

    let mut end = spans.len();
    while end > 0 {
        let (start, stop) = spans[end - 1];
        let segment = &path[start..stop];
        if segment.starts_with('{') || is_symbol_hash(segment) {
            end -= 1;
        } else {
            break;
        }
    }
    if end < 2 {
        return None;
    }

    let (method_start, method_end) = spans[end - 1];
    let class = normalize_class(&path[..method_start - 2]);
    let method = &path[method_start..method_end];
    if class.is_empty() || method.is_empty() {
        return None;
    }
    Some((class, method))
}

/// Unqualified, nesting-aware class name
///
/// Trailing type-like segments (leading uppercase letter) are kept and joined
/// with `$`; a module path yields its last segment. Generic arguments are
/// dropped.
///
/// ```
/// use rust_opslog::caller::simple_name;
///
/// assert_eq!(simple_name("app::service::Foo"), "Foo");
/// assert_eq!(simple_name("app::Outer::BaseLogger"), "Outer$BaseLogger");
/// assert_eq!(simple_name("app::Cache<alloc::string::String>"), "Cache");
/// assert_eq!(simple_name("app::jobs"), "jobs");
/// ```
pub fn simple_name(class_name: &str) -> String {
    let class_name = normalize_class(class_name.trim());
    let segments: Vec<&str> = segment_spans(class_name)
        .into_iter()
        .map(|(start, stop)| strip_generics(&class_name[start..stop]))
        .filter(|segment| !segment.is_empty())
        .collect();

    let type_like = segments
        .iter()
        .rev()
        .take_while(|segment| segment.starts_with(|c: char| c.is_uppercase()))
        .count();

    match type_like {
        0 => segments.last().copied().unwrap_or(class_name).to_string(),
        n => segments[segments.len() - n..].join("$"),
    }
}

/// Byte spans of the `::` separated segments, ignoring separators inside `<...>`
fn segment_spans(path: &str) -> Vec<(usize, usize)> {
    let bytes = path.as_bytes();
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'<' => depth += 1,
            // `->` in fn pointer types
            b'>' if i > 0 && bytes[i - 1] == b'-' => {}
            b'>' => depth = depth.saturating_sub(1),
            b':' if depth == 0 && bytes.get(i + 1) == Some(&b':') => {
                spans.push((start, i));
                i += 2;
                start = i;
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    spans.push((start, bytes.len()));
    spans
}

/// `<T as Trait>` and `<T>` to `T`
fn normalize_class(class: &str) -> &str {
    let class = class.trim();
    let Some(inner) = class
        .strip_prefix('<')
        .and_then(|rest| rest.strip_suffix('>'))
    else {
        return class;
    };

    let bytes = inner.as_bytes();
    let mut depth = 0usize;
    for (i, byte) in bytes.iter().enumerate() {
        match byte {
            b'<' => depth += 1,
            b'>' if i > 0 && bytes[i - 1] == b'-' => {}
            b'>' => depth = depth.saturating_sub(1),
            b' ' if depth == 0 && inner[i..].starts_with(" as ") => return inner[..i].trim(),
            _ => {}
        }
    }
    inner.trim()
}

fn strip_generics(segment: &str) -> &str {
    match segment.find('<') {
        Some(0) => segment,
        Some(index) => &segment[..index],
        None => segment,
    }
}

fn is_symbol_hash(segment: &str) -> bool {
    segment.len() == 17
        && segment.starts_with('h')
        && segment[1..].chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Fixed(Result<Option<Caller>>);

    impl StackInspector for Fixed {
        fn caller_of(&self, reference: &ClassRef) -> Result<Option<Caller>> {
            match &self.0 {
                Ok(caller) => Ok(caller.clone()),
                Err(_) => Err(missing_caller(reference)),
            }
        }
    }

    struct Counting<'a>(&'a Cell<u32>);

    impl StackInspector for Counting<'_> {
        fn caller_of(&self, _reference: &ClassRef) -> Result<Option<Caller>> {
            self.0.set(self.0.get() + 1);
            Ok(None)
        }
    }

    fn caller(class_name: &'static str, method: &str) -> Caller {
        Caller {
            class: Some(ClassRef::named(class_name)),
            class_name: class_name.to_string(),
            method: method.to_string(),
        }
    }

    #[test]
    fn frame_below_skips_consecutive_reference_frames() {
        let frames = ["inner", "Ref", "Ref", "Caller", "Outer"];
        assert_eq!(frame_below(frames, |f| *f == "Ref"), Some("Caller"));
    }

    #[test]
    fn frame_below_stops_at_first_boundary() {
        let frames = ["Ref", "First", "Ref", "Second"];
        assert_eq!(frame_below(frames, |f| *f == "Ref"), Some("First"));
    }

    #[test]
    fn frame_below_fails_without_reference_or_caller() {
        assert_eq!(frame_below(["a", "b"], |f| *f == "Ref"), None);
        assert_eq!(frame_below(["a", "Ref", "Ref"], |f| *f == "Ref"), None);
    }

    #[test]
    fn fast_answer_wins() {
        let calls = Cell::new(0);
        let resolver = CallerResolver::new(
            Fixed(Ok(Some(caller("app::Fast", "run")))),
            Counting(&calls),
        );

        let found = resolver.locate_caller(&ClassRef::named("app::Ref")).unwrap();
        assert_eq!(found, Some(caller("app::Fast", "run")));
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn fallback_used_when_fast_has_no_answer() {
        let resolver = CallerResolver::new(
            Fixed(Ok(None)),
            Fixed(Ok(Some(caller("app::Slow", "run")))),
        );

        let class = resolver.resolve_caller_of(&ClassRef::named("app::Ref")).unwrap();
        assert_eq!(class, Some(ClassRef::named("app::Slow")));
    }

    #[test]
    fn fast_integrity_error_propagates() {
        let calls = Cell::new(0);
        let resolver = CallerResolver::new(
            Fixed(Err(LoggerError::other("unused"))),
            Counting(&calls),
        );

        let err = resolver.locate_caller(&ClassRef::named("app::Ref")).unwrap_err();
        assert!(matches!(err, LoggerError::StackIntegrity { .. }));
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn split_type_name_paths() {
        assert_eq!(
            split_callable("app::service::Foo::foo_method"),
            Some(("app::service::Foo", "foo_method"))
        );
        assert_eq!(
            split_callable("app::Foo::run::{{closure}}::{{closure}}"),
            Some(("app::Foo", "run"))
        );
        assert_eq!(
            split_callable("app::Wrapper<alloc::vec::Vec<u8>>::push"),
            Some(("app::Wrapper<alloc::vec::Vec<u8>>", "push"))
        );
        assert_eq!(
            split_callable("<app::Foo>::bar"),
            Some(("app::Foo", "bar"))
        );
    }

    #[test]
    fn split_symbol_names() {
        assert_eq!(
            split_callable("app::Foo::run::h0123456789abcdef"),
            Some(("app::Foo", "run"))
        );
        assert_eq!(
            split_callable("app::Foo::run::{closure#0}"),
            Some(("app::Foo", "run"))
        );
        assert_eq!(
            split_callable("<alloc::boxed::Box<F,A> as core::ops::function::FnOnce<Args>>::call_once"),
            Some(("alloc::boxed::Box<F,A>", "call_once"))
        );
        assert_eq!(split_callable("__rust_begin_short_backtrace"), None);
        assert_eq!(split_callable("<unknown>"), None);
    }

    #[test]
    fn simple_names() {
        assert_eq!(simple_name("app::Foo"), "Foo");
        assert_eq!(simple_name("Foo"), "Foo");
        assert_eq!(simple_name("app::tests::Outer::BaseLogger"), "Outer$BaseLogger");
        assert_eq!(simple_name("<app::Foo as app::Tr>"), "Foo");
        assert_eq!(simple_name("app::Map<K, fn() -> V>"), "Map");
        assert_eq!(simple_name("app::jobs::nightly"), "nightly");
    }

    #[test]
    fn class_ref_of_uses_type_name() {
        struct Local;
        let class = ClassRef::of::<Local>();
        assert!(class.name().ends_with("Local"));
        assert_eq!(class.simple_name(), "Local");
        assert_eq!(ClassRef::of::<Local>(), class);
    }
}
