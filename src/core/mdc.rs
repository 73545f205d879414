//! Mapped diagnostic context
//!
//! Thread-local key/value pairs attached to every [`LogEntry`](super::LogEntry)
//! created on the same thread. Appenders that ship events (see the HEC
//! appender) forward them as event properties.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::marker::PhantomData;

thread_local! {
    static CONTEXT: RefCell<BTreeMap<String, String>> = const { RefCell::new(BTreeMap::new()) };
}

/// Access to the current thread's diagnostic context
///
/// # Example
///
/// ```
/// use rust_opslog::Mdc;
///
/// {
///     let _guard = Mdc::put("request_id", "abc-123");
///     assert_eq!(Mdc::get("request_id").as_deref(), Some("abc-123"));
/// }
/// assert_eq!(Mdc::get("request_id"), None);
/// ```
pub struct Mdc;

impl Mdc {
    /// Set a key for the lifetime of the returned guard
    ///
    /// If the key was already set, the previous value is restored when the
    /// guard drops.
    pub fn put(key: impl Into<String>, value: impl Into<String>) -> MdcGuard {
        let key = key.into();
        let previous = CONTEXT.with(|ctx| ctx.borrow_mut().insert(key.clone(), value.into()));
        MdcGuard {
            key,
            previous,
            _not_send: PhantomData,
        }
    }

    pub fn get(key: &str) -> Option<String> {
        CONTEXT.with(|ctx| ctx.borrow().get(key).cloned())
    }

    pub fn remove(key: &str) {
        CONTEXT.with(|ctx| {
            ctx.borrow_mut().remove(key);
        });
    }

    pub fn clear() {
        CONTEXT.with(|ctx| ctx.borrow_mut().clear());
    }

    /// Copy of the current thread's context
    pub fn snapshot() -> BTreeMap<String, String> {
        CONTEXT.with(|ctx| ctx.borrow().clone())
    }
}

/// RAII guard returned by [`Mdc::put`]
pub struct MdcGuard {
    key: String,
    previous: Option<String>,
    // The guard restores state of the thread that created it.
    _not_send: PhantomData<*const ()>,
}

impl Drop for MdcGuard {
    fn drop(&mut self) {
        let key = std::mem::take(&mut self.key);
        let previous = self.previous.take();
        CONTEXT.with(|ctx| {
            let mut ctx = ctx.borrow_mut();
            match previous {
                Some(value) => {
                    ctx.insert(key, value);
                }
                None => {
                    ctx.remove(&key);
                }
            }
        });
    }
}
