//! Log records handed to the target by the logging framework.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Severity of a log record.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Trace level
    Trace,
    /// Debug level
    Debug,
    /// Info level (default)
    #[default]
    Info,
    /// Warn level
    Warn,
    /// Error level
    Error,
    /// Fatal level
    Fatal,
}

impl Level {
    /// Canonical upper-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single structured log event.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogRecord {
    /// Event time
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    /// Severity
    #[serde(default)]
    pub level: Level,

    /// Logger name
    #[serde(default)]
    pub logger: String,

    /// Formatted message
    #[serde(default)]
    pub message: String,

    /// Exception text, if any
    #[serde(default)]
    pub exception: Option<String>,

    /// Structured event properties
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
}

impl LogRecord {
    /// Create a record stamped with the current time.
    pub fn new(level: Level, logger: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            logger: logger.into(),
            message: message.into(),
            exception: None,
            properties: BTreeMap::new(),
        }
    }

    /// Attach a structured property.
    pub fn with_property(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Attach exception text.
    pub fn with_exception(mut self, exception: impl Into<String>) -> Self {
        self.exception = Some(exception.into());
        self
    }

    /// Override the timestamp.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}
