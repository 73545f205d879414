//! Macros for call-site attribution.
//!
//! [`opslog!`] is the usual way to start a line: it records the enclosing
//! function on the shadow stack as the call site of the encoder and creates a
//! [`LineEncoder`] attributed to it.
//!
//! # Examples
//!
//! ```
//! use rust_opslog::prelude::*;
//!
//! struct Importer;
//!
//! impl Importer {
//!     fn load(&self, rows: usize) -> LineEncoder {
//!         opslog!().add("rows", rows).info()
//!     }
//! }
//!
//! let line = Importer.load(12).render();
//! assert_eq!(line, r#"c="Importer" p="load" rows=12"#);
//! ```
//!
//! [`LineEncoder`]: crate::encoder::LineEncoder

/// Path of the enclosing function, e.g. `app::Foo::run`.
///
/// Closures report the function they are defined in, with trailing
/// `{{closure}}` segments that [`split_callable`](crate::caller::split_callable)
/// removes.
#[doc(hidden)]
#[macro_export]
macro_rules! __function_path {
    () => {{
        fn __here() {}
        fn __type_name_of<T>(_: T) -> &'static str {
            ::std::any::type_name::<T>()
        }
        let path = __type_name_of(__here);
        path.strip_suffix("::__here").unwrap_or(path)
    }};
}

/// Push the enclosing function onto the shadow stack.
///
/// The frame is popped when the returned guard is dropped, so bind it for as
/// long as the function runs. The function's class is registered for
/// backtrace attribution, and the frame hides any call site pushed further
/// out from encoders created below it.
///
/// # Examples
///
/// ```
/// use rust_opslog::enter;
///
/// fn handle_request() {
///     let _frame = enter!();
///     // lines from uninstrumented helpers called here name the helper
/// }
/// # handle_request();
/// ```
#[macro_export]
macro_rules! enter {
    () => {
        $crate::caller::FrameGuard::enter_path($crate::__function_path!())
    };
}

/// Create a [`LineEncoder`](crate::encoder::LineEncoder) attributed to the
/// enclosing function.
///
/// # Panics
///
/// Panics when the caller cannot be located on the stack; use
/// [`LineEncoder::try_entry_point`](crate::encoder::LineEncoder::try_entry_point)
/// to handle that case. Without a call-site frame on the shadow stack it is
/// attributed from a backtrace.
///
/// # Examples
///
/// ```
/// use rust_opslog::opslog;
///
/// struct KeyStore;
///
/// impl KeyStore {
///     fn rotate(&self) -> String {
///         opslog!().add("rotated", 4).render()
///     }
/// }
///
/// assert_eq!(KeyStore.rotate(), r#"c="KeyStore" p="rotate" rotated=4"#);
/// ```
#[macro_export]
macro_rules! opslog {
    () => {{
        let _frame = $crate::caller::FrameGuard::call_site_path($crate::__function_path!());
        $crate::encoder::LineEncoder::entry_point()
    }};
}
