//! Canonical JSON encoding of log entries.
//!
//! The key names match what the collector side expects: `timestamp`,
//! `severity`, `logger` and `message`. User fields never replace them.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use crate::config::DurationFormat;
use crate::level::Level;
use crate::record::{FieldValue, Record};

pub const TIME_KEY: &str = "timestamp";
pub const LEVEL_KEY: &str = "severity";
pub const NAME_KEY: &str = "logger";
pub const MESSAGE_KEY: &str = "message";

/// Fixed part of a log entry.
#[derive(Debug, Clone, Copy)]
pub struct Entry<'a> {
    pub time: DateTime<Utc>,
    pub level: Level,
    pub logger: Option<&'a str>,
    pub message: &'a str,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Encoder {
    duration_format: DurationFormat,
}

impl Encoder {
    pub fn new(duration_format: DurationFormat) -> Self {
        Self { duration_format }
    }

    pub fn encode_value(&self, value: &FieldValue) -> Value {
        match value {
            FieldValue::Json(value) => value.clone(),
            FieldValue::Duration(duration) => match self.duration_format {
                DurationFormat::String => {
                    Value::String(humantime::format_duration(*duration).to_string())
                }
                DurationFormat::Seconds => Value::from(duration.as_secs_f64()),
            },
        }
    }

    /// Serialize `entry` and `fields` into one newline-terminated JSON object.
    pub fn encode<K, I>(&self, entry: &Entry<'_>, fields: I) -> Result<Vec<u8>, serde_json::Error>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let mut record = Record::new();
        for (key, value) in fields {
            record.insert(key.into(), value);
        }

        record.insert(TIME_KEY.to_string(), Value::String(format_timestamp(entry.time)));
        record.insert(LEVEL_KEY.to_string(), Value::from(entry.level.as_str()));
        match entry.logger {
            Some(name) => {
                record.insert(NAME_KEY.to_string(), Value::from(name));
            }
            None => {
                record.remove(NAME_KEY);
            }
        }
        record.insert(MESSAGE_KEY.to_string(), Value::from(entry.message));

        let mut buf = serde_json::to_vec(&record)?;
        buf.push(b'\n');
        Ok(buf)
    }
}

/// RFC 3339 in UTC with nanosecond precision.
pub fn format_timestamp(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Nanos, true)
}
