//! Thread-local shadow call stack
//!
//! Instrumented functions push a frame with [`FrameGuard::enter`] (usually
//! through the [`enter!`](crate::enter) macro) and pop it when the guard drops.
//! A frame pushed with [`FrameGuard::call_site`] additionally asserts that its
//! function calls straight into whatever pushes the next frame, which is what
//! [`opslog!`](crate::opslog) does around the encoder entry point.
//! Whether the facility is usable is decided once per process by
//! [`StackContextState`].

use super::{frame_below, split_callable, Caller, ClassRef, ClassRegistry, StackInspector};
use crate::core::Result;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Environment variable that disables the stack context when set to `off`,
/// `deny`, `false` or `0`
pub const STACK_CONTEXT_ENV: &str = "OPSLOG_STACK_CONTEXT";

const UNDETERMINED: u8 = 0;
const AVAILABLE: u8 = 1;
const UNAVAILABLE: u8 = 2;

static GLOBAL_STATE: StackContextState = StackContextState::new();

thread_local! {
    static SHADOW_STACK: RefCell<Vec<ContextFrame>> = const { RefCell::new(Vec::new()) };
}

#[derive(Debug, Clone, Copy)]
struct ContextFrame {
    class: ClassRef,
    method: &'static str,
    /// The next frame up was pushed by a function this one called directly
    call_site: bool,
}

/// Availability of the stack context facility
///
/// Starts undetermined. The first query probes the policy and the result is
/// kept for the lifetime of the value. Concurrent first queries may both
/// probe; they reach the same answer.
#[derive(Debug)]
pub struct StackContextState {
    status: AtomicU8,
    denied: AtomicBool,
}

impl StackContextState {
    pub const fn new() -> Self {
        Self {
            status: AtomicU8::new(UNDETERMINED),
            denied: AtomicBool::new(false),
        }
    }

    /// Process-wide state consulted by [`FrameGuard`]
    pub fn global() -> &'static StackContextState {
        &GLOBAL_STATE
    }

    /// Refuse the facility
    ///
    /// Has no effect once availability has been determined.
    pub fn deny(&self) {
        self.denied.store(true, Ordering::Relaxed);
    }

    pub fn is_available(&self) -> bool {
        match self.status.load(Ordering::Relaxed) {
            AVAILABLE => true,
            UNAVAILABLE => false,
            _ => {
                let available = self.probe();
                let status = if available { AVAILABLE } else { UNAVAILABLE };
                self.status.store(status, Ordering::Relaxed);
                available
            }
        }
    }

    pub fn is_determined(&self) -> bool {
        self.status.load(Ordering::Relaxed) != UNDETERMINED
    }

    fn probe(&self) -> bool {
        if self.denied.load(Ordering::Relaxed) {
            return false;
        }
        let policy = std::env::var(STACK_CONTEXT_ENV).ok();
        !policy_denies(policy.as_deref())
    }
}

impl Default for StackContextState {
    fn default() -> Self {
        Self::new()
    }
}

fn policy_denies(value: Option<&str>) -> bool {
    let Some(value) = value else {
        return false;
    };
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "off" | "deny" | "false" | "0"
    )
}

/// A frame on the current thread's shadow stack
///
/// The class is always registered with the global [`ClassRegistry`] so the
/// backtrace fallback can resolve it. The frame itself is only pushed while
/// the stack context is available. Dropping the guard pops its frame and any
/// frames left above it.
#[must_use = "the frame is popped as soon as the guard is dropped"]
#[derive(Debug)]
pub struct FrameGuard {
    depth: Option<usize>,
    _not_send: PhantomData<*const ()>,
}

impl FrameGuard {
    pub fn enter(class: ClassRef, method: &'static str) -> Self {
        Self::push(class, method, false)
    }

    /// Enter a frame whose function calls the next instrumented function
    /// directly
    ///
    /// Only call-site frames are trusted as callers by
    /// [`StackContextInspector`]. Keep the guard alive for that one call and
    /// no longer, or an uninstrumented function called later in the same
    /// scope would be attributed to this frame.
    pub fn call_site(class: ClassRef, method: &'static str) -> Self {
        Self::push(class, method, true)
    }

    /// Enter a frame described by a function path such as `app::Foo::run`
    pub fn enter_path(path: &'static str) -> Self {
        Self::push_path(path, false)
    }

    /// [`call_site`](Self::call_site) for a function path
    pub fn call_site_path(path: &'static str) -> Self {
        Self::push_path(path, true)
    }

    fn push_path(path: &'static str, call_site: bool) -> Self {
        match split_callable(path) {
            Some((class, method)) => Self::push(ClassRef::named(class), method, call_site),
            None => Self::push(ClassRef::named(path), "", call_site),
        }
    }

    fn push(class: ClassRef, method: &'static str, call_site: bool) -> Self {
        ClassRegistry::global().register(class);

        if !StackContextState::global().is_available() {
            return Self::detached();
        }

        let depth = SHADOW_STACK
            .try_with(|stack| {
                let mut stack = stack.borrow_mut();
                let depth = stack.len();
                stack.push(ContextFrame {
                    class,
                    method,
                    call_site,
                });
                depth
            })
            .ok();

        Self {
            depth,
            _not_send: PhantomData,
        }
    }

    fn detached() -> Self {
        Self {
            depth: None,
            _not_send: PhantomData,
        }
    }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        if let Some(depth) = self.depth {
            let _ = SHADOW_STACK.try_with(|stack| stack.borrow_mut().truncate(depth));
        }
    }
}

/// [`StackInspector`] over the shadow stack
///
/// Only instrumented functions appear on the shadow stack, so the frame found
/// below the reference is only known to be the caller when it is a
/// [call site](FrameGuard::call_site). Any other frame may have reached the
/// reference through uninstrumented functions. In that case, and when there
/// is no frame below the reference at all, the inspector has no answer and
/// leaves the decision to the next strategy.
#[derive(Debug, Clone, Copy)]
pub struct StackContextInspector<'a> {
    state: &'a StackContextState,
}

impl<'a> StackContextInspector<'a> {
    pub fn new(state: &'a StackContextState) -> Self {
        Self { state }
    }
}

impl StackContextInspector<'static> {
    pub fn global() -> Self {
        Self::new(StackContextState::global())
    }
}

impl StackInspector for StackContextInspector<'_> {
    fn caller_of(&self, reference: &ClassRef) -> Result<Option<Caller>> {
        if !self.state.is_available() {
            return Ok(None);
        }

        let below = SHADOW_STACK
            .try_with(|stack| {
                let stack = stack.borrow();
                frame_below(stack.iter().rev().copied(), |frame| frame.class == *reference)
            })
            .ok()
            .flatten();

        Ok(below.filter(|frame| frame.call_site).map(|frame| Caller {
            class: Some(frame.class),
            class_name: frame.class.name().to_string(),
            method: frame.method.to_string(),
        }))
    }
}

#[cfg(test)]
pub(crate) fn depth() -> usize {
    SHADOW_STACK.with(|stack| stack.borrow().len())
}
