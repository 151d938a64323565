//! Readings and merged records

use obd_protocol::{Response, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One value observed for one command at one instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Command that produced this reading
    pub command: String,
    /// Decoded value, `None` if the query failed or was undecodable
    pub value: Option<Value>,
    /// Collection time (Unix ms)
    pub timestamp_ms: u64,
}

impl Reading {
    pub fn new(command: impl Into<String>, value: Option<Value>, timestamp_ms: u64) -> Self {
        Self {
            command: command.into(),
            value,
            timestamp_ms,
        }
    }

    /// Reading with no value, used as the sentinel and for failed queries
    pub fn empty(command: impl Into<String>, timestamp_ms: u64) -> Self {
        Self::new(command, None, timestamp_ms)
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_none()
    }

    /// Numeric magnitude, if present
    pub fn magnitude(&self) -> Option<f64> {
        self.value.as_ref().and_then(Value::magnitude)
    }

    /// Trouble codes, if this reading carries them
    pub fn codes(&self) -> Option<&[String]> {
        self.value.as_ref().and_then(Value::codes)
    }
}

impl From<Response> for Reading {
    fn from(response: Response) -> Self {
        Self::new(response.command, response.value, response.timestamp_ms)
    }
}

/// All commands' readings for one collection cycle
///
/// Serializes flat: `{"time": 1700000000000, "RPM": 812.5, "SPEED": null}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRecord {
    /// Timestamp of the cycle, taken from the first command that has one
    #[serde(rename = "time")]
    pub timestamp_ms: u64,
    /// Magnitude per command, `None` when missing or non-numeric
    #[serde(flatten)]
    pub values: BTreeMap<String, Option<f64>>,
}

impl MetricRecord {
    /// Magnitude recorded for `command` in this cycle
    pub fn get(&self, command: &str) -> Option<f64> {
        self.values.get(command).copied().flatten()
    }
}
