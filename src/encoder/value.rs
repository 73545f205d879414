//! Typed values of a key=value line

use crate::core::TimestampFormat;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use std::fmt;
use std::time::SystemTime;

/// Rendered in place of a missing value
pub const NULL_TEXT: &str = "null";

/// One value of a [`LineEncoder`](super::LineEncoder) field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Quoted, with embedded quotes escaped
    Text(String),
    /// Unquoted numeric text
    Number(String),
    /// Unquoted, emitted exactly as given
    Raw(String),
    /// Field kept but not rendered
    Null,
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        FieldValue::Text(value.into())
    }

    pub fn raw(value: impl fmt::Display) -> Self {
        FieldValue::Raw(value.to_string())
    }

    pub fn null_text() -> Self {
        FieldValue::Text(NULL_TEXT.to_string())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub(crate) fn write_to(&self, out: &mut String) {
        match self {
            FieldValue::Text(text) => {
                out.push('"');
                push_escaped(out, text);
                out.push('"');
            }
            FieldValue::Number(text) | FieldValue::Raw(text) => out.push_str(text),
            FieldValue::Null => {}
        }
    }
}

/// Escape embedded quotes as `\\"`
///
/// ```
/// use rust_opslog::encoder::escape;
///
/// assert_eq!(escape(r#"say "hi""#), r#"say \\"hi\\""#);
/// ```
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    push_escaped(&mut out, text);
    out
}

pub(crate) fn push_escaped(out: &mut String, text: &str) {
    for c in text.chars() {
        if c == '"' {
            out.push_str("\\\\\"");
        } else {
            out.push(c);
        }
    }
}

/// Timestamp text used for every date-like value
pub fn format_timestamp(datetime: &DateTime<Utc>) -> String {
    TimestampFormat::CommaMillis.format(datetime)
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<&String> for FieldValue {
    fn from(value: &String) -> Self {
        FieldValue::Text(value.clone())
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<char> for FieldValue {
    fn from(value: char) -> Self {
        FieldValue::Text(value.to_string())
    }
}

macro_rules! number_field {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for FieldValue {
                fn from(value: $ty) -> Self {
                    FieldValue::Number(value.to_string())
                }
            }
        )*
    };
}

number_field!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64);

impl<Tz: TimeZone> From<DateTime<Tz>> for FieldValue {
    fn from(value: DateTime<Tz>) -> Self {
        FieldValue::Text(format_timestamp(&value.with_timezone(&Utc)))
    }
}

impl From<NaiveDateTime> for FieldValue {
    fn from(value: NaiveDateTime) -> Self {
        FieldValue::Text(format_timestamp(&value.and_utc()))
    }
}

impl From<SystemTime> for FieldValue {
    fn from(value: SystemTime) -> Self {
        let datetime: DateTime<Utc> = value.into();
        FieldValue::Text(format_timestamp(&datetime))
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => value.into(),
            None => FieldValue::null_text(),
        }
    }
}
