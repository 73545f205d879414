//! Timestamp formatting utilities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Timestamp rendering used by appenders and the line encoder
///
/// # Examples
///
/// ```
/// use rust_opslog::TimestampFormat;
/// use chrono::{TimeZone, Utc};
///
/// let at = Utc.with_ymd_and_hms(2021, 3, 4, 5, 6, 7).unwrap();
/// assert_eq!(TimestampFormat::CommaMillis.format(&at), "2021-03-04 05:06:07,000+0000");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimestampFormat {
    /// `2025-01-08T10:30:45.123Z`
    #[default]
    Iso8601,

    /// `2025-01-08T10:30:45.123+00:00`
    Rfc3339,

    /// `1736332245123`
    UnixMillis,

    /// `2025-01-08 10:30:45,123+0000`
    ///
    /// The `yyyy-MM-dd HH:mm:ss,SSSZ` pattern of the key=value wire format.
    CommaMillis,

    /// Any strftime format string
    Custom(String),
}

impl TimestampFormat {
    #[must_use]
    pub fn format(&self, datetime: &DateTime<Utc>) -> String {
        match self {
            TimestampFormat::Iso8601 => datetime.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
            TimestampFormat::Rfc3339 => {
                datetime.to_rfc3339_opts(chrono::SecondsFormat::Millis, false)
            }
            TimestampFormat::UnixMillis => datetime.timestamp_millis().to_string(),
            TimestampFormat::CommaMillis => {
                datetime.format("%Y-%m-%d %H:%M:%S,%3f%z").to_string()
            }
            TimestampFormat::Custom(format_str) => datetime.format(format_str).to_string(),
        }
    }

    #[must_use]
    pub fn format_system_time(&self, timestamp: &SystemTime) -> String {
        let datetime: DateTime<Utc> = (*timestamp).into();
        self.format(&datetime)
    }
}

/// Seconds since the Unix epoch with millisecond fraction
pub fn epoch_seconds(datetime: &DateTime<Utc>) -> f64 {
    datetime.timestamp_millis() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_datetime() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 8, 10, 30, 45)
            .single()
            .expect("valid datetime")
            + chrono::Duration::microseconds(123456)
    }

    #[test]
    fn test_iso8601_format() {
        assert_eq!(
            TimestampFormat::Iso8601.format(&fixed_datetime()),
            "2025-01-08T10:30:45.123Z"
        );
    }

    #[test]
    fn test_rfc3339_format() {
        assert_eq!(
            TimestampFormat::Rfc3339.format(&fixed_datetime()),
            "2025-01-08T10:30:45.123+00:00"
        );
    }

    #[test]
    fn test_comma_millis_format() {
        assert_eq!(
            TimestampFormat::CommaMillis.format(&fixed_datetime()),
            "2025-01-08 10:30:45,123+0000"
        );
    }

    #[test]
    fn test_custom_format() {
        let format = TimestampFormat::Custom("%Y/%m/%d %H:%M".to_string());
        assert_eq!(format.format(&fixed_datetime()), "2025/01/08 10:30");
    }

    #[test]
    fn test_epoch_seconds_keeps_millis() {
        let seconds = epoch_seconds(&fixed_datetime());
        assert_eq!(seconds, 1736332245.123);
    }

    #[test]
    fn test_deserialization() {
        let format: TimestampFormat =
            serde_json::from_str("\"CommaMillis\"").expect("deserialize CommaMillis");
        assert_eq!(format, TimestampFormat::CommaMillis);
    }
}
