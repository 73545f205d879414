//! Layouts turning a [`LogEntry`] into one output record
//!
//! - Text: human-readable (default)
//! - Json: one JSON object per entry
//! - Message: the bare message, used when the message already is a structured
//!   key=value line

use super::log_entry::LogEntry;
use super::timestamp::TimestampFormat;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// `[2025-01-08T10:30:45.123Z] [INFO ] main app::Foo - c="Foo" p="run"`
    #[default]
    Text,

    /// `{"timestamp":"...","level":"INFO","logger":"app::Foo","message":"..."}`
    Json,

    /// `c="Foo" p="run"`
    Message,
}

impl OutputFormat {
    pub fn format(&self, entry: &LogEntry, timestamp_format: &TimestampFormat) -> String {
        match self {
            OutputFormat::Text => Self::format_text(entry, timestamp_format),
            OutputFormat::Json => Self::format_json(entry, timestamp_format),
            OutputFormat::Message => entry.message.clone(),
        }
    }

    fn format_text(entry: &LogEntry, timestamp_format: &TimestampFormat) -> String {
        let mut out = format!(
            "[{}] [{:<5}] {}",
            timestamp_format.format(&entry.timestamp),
            entry.level,
            entry.thread_label(),
        );
        if let Some(ref logger) = entry.logger {
            out.push(' ');
            out.push_str(logger);
        }
        out.push_str(" - ");
        out.push_str(&entry.message);

        if let Some(ref trace) = entry.error_trace {
            out.push('\n');
            out.push_str(trace);
        }
        out
    }

    fn format_json(entry: &LogEntry, timestamp_format: &TimestampFormat) -> String {
        let mut json_obj = serde_json::Map::new();
        json_obj.insert(
            "timestamp".to_string(),
            serde_json::Value::String(timestamp_format.format(&entry.timestamp)),
        );
        json_obj.insert(
            "level".to_string(),
            serde_json::Value::String(entry.level.to_str().to_string()),
        );
        if let Some(ref logger) = entry.logger {
            json_obj.insert(
                "logger".to_string(),
                serde_json::Value::String(logger.clone()),
            );
        }
        json_obj.insert(
            "thread".to_string(),
            serde_json::Value::String(entry.thread_label().to_string()),
        );
        json_obj.insert(
            "message".to_string(),
            serde_json::Value::String(entry.message.clone()),
        );
        if let Some(ref trace) = entry.error_trace {
            json_obj.insert(
                "error".to_string(),
                serde_json::Value::String(trace.clone()),
            );
        }
        for (key, value) in &entry.properties {
            json_obj
                .entry(key.clone())
                .or_insert_with(|| serde_json::Value::String(value.clone()));
        }

        serde_json::to_string(&serde_json::Value::Object(json_obj)).unwrap_or_default()
    }
}
