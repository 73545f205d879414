//! Caller lookup from a captured backtrace
//!
//! Used when the shadow stack is unavailable. Slower, and only frames whose
//! symbol names survive in the binary can be seen; inlined functions vanish.

use super::{
    frame_below, missing_caller, split_callable, Caller, ClassRef, ClassRegistry, StackFrame,
    StackInspector,
};
use crate::core::Result;
use std::backtrace::{Backtrace, BacktraceStatus};

#[derive(Debug, Clone, Copy)]
pub struct StackTraceInspector<'a> {
    registry: &'a ClassRegistry,
}

impl<'a> StackTraceInspector<'a> {
    pub fn new(registry: &'a ClassRegistry) -> Self {
        Self { registry }
    }

    /// Caller of `reference` within already parsed frames, innermost first
    pub fn caller_in(&self, frames: &[StackFrame], reference: &ClassRef) -> Result<Caller> {
        let frame = frame_below(frames.iter(), |frame| frame.class_name == reference.name())
            .ok_or_else(|| missing_caller(reference))?;

        Ok(Caller {
            class: self.registry.resolve(&frame.class_name),
            class_name: frame.class_name.clone(),
            method: frame.method_name.clone(),
        })
    }
}

impl StackTraceInspector<'static> {
    pub fn global() -> Self {
        Self::new(ClassRegistry::global())
    }
}

impl StackInspector for StackTraceInspector<'_> {
    fn caller_of(&self, reference: &ClassRef) -> Result<Option<Caller>> {
        let backtrace = Backtrace::force_capture();
        if backtrace.status() != BacktraceStatus::Captured {
            return Ok(None);
        }

        let frames = parse_frames(&backtrace.to_string());
        if frames.is_empty() {
            return Ok(None);
        }
        self.caller_in(&frames, reference).map(Some)
    }
}

/// Parse the rendering of a [`Backtrace`] into frames, innermost first
///
/// Source location lines (`at src/lib.rs:10:5`) and symbols that do not
/// name a method of some class are skipped.
pub fn parse_frames(text: &str) -> Vec<StackFrame> {
    text.lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with("at ") {
                return None;
            }
            let symbol = match line.split_once(": ") {
                Some((index, symbol)) if index.chars().all(|c| c.is_ascii_digit()) => symbol,
                _ => line,
            };
            split_callable(symbol).map(|(class, method)| StackFrame {
                class_name: class.to_string(),
                method_name: method.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::LoggerError;

    const SAMPLE: &str = "   0: std::backtrace_rs::backtrace::libunwind::trace
             at /rustc/library/std/src/../../backtrace/src/backtrace/libunwind.rs:116:5
   1: std::backtrace::Backtrace::create
             at /rustc/library/std/src/backtrace.rs:331:13
   2: app::logging::Encoder::entry_point
             at ./src/logging.rs:40:9
   3: app::logging::Encoder::entry_point_inner
   4: app::service::Foo::foo_method
             at ./src/service.rs:12:5
   5: app::service::Foo::foo_method::{{closure}}
   6: app::main
   7: core::ops::function::FnOnce::call_once
   8: main
   9: <unknown>
";

    struct Probe;

    impl Probe {
        #[inline(never)]
        fn direct(inspector: &StackTraceInspector<'_>) -> Result<Option<Caller>> {
            inspector.caller_of(&ClassRef::of::<Probe>())
        }

        #[inline(never)]
        fn indirect(inspector: &StackTraceInspector<'_>) -> Result<Option<Caller>> {
            let found = Self::direct(inspector);
            std::hint::black_box(found)
        }
    }

    #[test]
    fn parses_symbol_lines_only() {
        let frames = parse_frames(SAMPLE);
        let names: Vec<(&str, &str)> = frames
            .iter()
            .map(|f| (f.class_name.as_str(), f.method_name.as_str()))
            .collect();

        assert_eq!(
            names,
            vec![
                ("std::backtrace_rs::backtrace::libunwind", "trace"),
                ("std::backtrace::Backtrace", "create"),
                ("app::logging::Encoder", "entry_point"),
                ("app::logging::Encoder", "entry_point_inner"),
                ("app::service::Foo", "foo_method"),
                ("app::service::Foo", "foo_method"),
                ("app", "main"),
                ("core::ops::function::FnOnce", "call_once"),
            ]
        );
    }

    #[test]
    fn caller_in_resolves_registered_class() {
        let registry = ClassRegistry::new();
        registry.register(ClassRef::named("app::service::Foo"));
        let inspector = StackTraceInspector::new(&registry);

        let caller = inspector
            .caller_in(&parse_frames(SAMPLE), &ClassRef::named("app::logging::Encoder"))
            .unwrap();

        assert_eq!(caller.class, Some(ClassRef::named("app::service::Foo")));
        assert_eq!(caller.method, "foo_method");
        assert_eq!(caller.simple_name(), "Foo");
    }

    #[test]
    fn caller_in_unregistered_class_has_name_only() {
        let registry = ClassRegistry::new();
        let inspector = StackTraceInspector::new(&registry);

        let caller = inspector
            .caller_in(&parse_frames(SAMPLE), &ClassRef::named("app::service::Foo"))
            .unwrap();

        assert_eq!(caller.class, None);
        assert_eq!(caller.class_name, "app");
        assert_eq!(caller.method, "main");
    }

    #[test]
    fn caller_in_missing_reference() {
        let registry = ClassRegistry::new();
        let inspector = StackTraceInspector::new(&registry);

        let err = inspector
            .caller_in(&parse_frames(SAMPLE), &ClassRef::named("app::Nowhere"))
            .unwrap_err();
        assert!(matches!(err, LoggerError::StackIntegrity { .. }));
    }

    #[test]
    fn caller_in_reference_is_outermost() {
        let registry = ClassRegistry::new();
        let inspector = StackTraceInspector::new(&registry);
        let frames = parse_frames("0: app::A::run\n1: app::Ref::call\n2: app::Ref::call2\n");

        let err = inspector
            .caller_in(&frames, &ClassRef::named("app::Ref"))
            .unwrap_err();
        assert!(matches!(err, LoggerError::StackIntegrity { .. }));
    }

    #[test]
    fn live_backtrace_finds_test_function() {
        let registry = ClassRegistry::new();
        let inspector = StackTraceInspector::new(&registry);

        let Some(caller) = Probe::direct(&inspector).unwrap() else {
            return;
        };
        assert_eq!(caller.class_name, module_path!());
        assert!(caller.method.starts_with("live_backtrace_finds_test_function"));
    }

    #[test]
    fn live_backtrace_skips_nested_reference_frames() {
        let registry = ClassRegistry::new();
        let inspector = StackTraceInspector::new(&registry);

        let Some(caller) = Probe::indirect(&inspector).unwrap() else {
            return;
        };
        assert_eq!(caller.class_name, module_path!());
        assert!(caller.method.starts_with("live_backtrace_skips_nested_reference_frames"));
    }
}
