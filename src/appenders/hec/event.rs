//! Events and their collector envelope

use crate::core::timestamp::epoch_seconds;
use crate::core::{LogEntry, LogLevel, Result};
use crate::encoder::LineEncoder;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Logger name given to access events
pub const ACCESS_LOGGER: &str = "access.log";

/// One event for the collector
///
/// The message is sent as the event body itself, the remaining data as
/// indexed fields.
#[derive(Debug, Clone, PartialEq)]
pub struct HecEvent {
    /// Seconds since the Unix epoch, with millisecond fraction
    pub time: f64,
    pub severity: String,
    pub message: String,
    pub logger_name: Option<String>,
    pub thread_name: Option<String>,
    pub properties: BTreeMap<String, String>,
    pub exception_message: Option<String>,
    pub marker: Option<String>,
}

impl HecEvent {
    /// Event for a log entry whose layout produced `message`
    pub fn from_entry(entry: &LogEntry, message: String) -> Self {
        Self {
            time: epoch_seconds(&entry.timestamp),
            severity: entry.level.to_str().to_string(),
            message,
            logger_name: entry.logger.clone(),
            thread_name: Some(entry.thread_label().to_string()),
            properties: entry.properties.clone(),
            exception_message: entry.error_message.clone(),
            marker: entry.marker.clone(),
        }
    }

    pub fn from_access(event: &AccessEvent) -> Self {
        Self {
            time: epoch_seconds(&event.timestamp),
            severity: LogLevel::Info.to_str().to_string(),
            message: event.render(),
            logger_name: Some(ACCESS_LOGGER.to_string()),
            thread_name: event.thread_name.clone(),
            properties: BTreeMap::new(),
            exception_message: None,
            marker: None,
        }
    }

    /// Serialize into the collector's JSON envelope
    pub fn to_json(&self, metadata: &HecMetadata) -> Result<String> {
        let envelope = Envelope {
            time: self.time,
            host: metadata.host.as_deref(),
            index: metadata.index.as_deref(),
            source: metadata.source.as_deref(),
            sourcetype: metadata.sourcetype.as_deref(),
            event: &self.message,
            fields: Fields {
                severity: &self.severity,
                logger: self.logger_name.as_deref(),
                thread: self.thread_name.as_deref(),
                exception: self.exception_message.as_deref(),
                marker: self.marker.as_deref(),
                properties: &self.properties,
            },
        };
        Ok(serde_json::to_string(&envelope)?)
    }
}

/// Envelope attributes shared by every event of an appender
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HecMetadata {
    pub host: Option<String>,
    pub index: Option<String>,
    pub source: Option<String>,
    pub sourcetype: Option<String>,
}

#[derive(Serialize)]
struct Envelope<'a> {
    time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    host: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    index: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sourcetype: Option<&'a str>,
    event: &'a str,
    fields: Fields<'a>,
}

#[derive(Serialize)]
struct Fields<'a> {
    severity: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    logger: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thread: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exception: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    marker: Option<&'a str>,
    #[serde(flatten)]
    properties: &'a BTreeMap<String, String>,
}

/// A served HTTP request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessEvent {
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub uri: String,
    pub status: u16,
    pub remote_addr: Option<String>,
    pub elapsed: Duration,
    pub thread_name: Option<String>,
}

impl AccessEvent {
    pub fn new(method: impl Into<String>, uri: impl Into<String>, status: u16) -> Self {
        Self {
            timestamp: Utc::now(),
            method: method.into(),
            uri: uri.into(),
            status,
            remote_addr: None,
            elapsed: Duration::ZERO,
            thread_name: std::thread::current().name().map(String::from),
        }
    }

    #[must_use]
    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }

    #[must_use]
    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }

    /// Key=value layout of the request
    pub fn render(&self) -> String {
        LineEncoder::new()
            .add("method", self.method.as_str())
            .add("uri", self.uri.as_str())
            .add("status", self.status)
            .add("remote", self.remote_addr.as_deref())
            .add("elapsed_ms", self.elapsed.as_millis() as u64)
            .render()
    }
}
