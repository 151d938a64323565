//! Decoded values returned by the adapter

use serde::{Deserialize, Serialize};
use std::fmt;

/// Physical unit attached to a decoded magnitude
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
    /// Percentage (0-100)
    Percent,
    /// Degrees Celsius
    Celsius,
    /// Kilometres per hour
    KilometersPerHour,
    /// Revolutions per minute
    Rpm,
    /// Litres per hour
    LitersPerHour,
    /// Grams per second
    GramsPerSecond,
    /// Kilopascal
    Kilopascal,
}

impl Unit {
    /// Display symbol for the unit
    pub fn symbol(&self) -> &'static str {
        match self {
            Unit::Percent => "%",
            Unit::Celsius => "°C",
            Unit::KilometersPerHour => "km/h",
            Unit::Rpm => "RPM",
            Unit::LitersPerHour => "L/h",
            Unit::GramsPerSecond => "g/s",
            Unit::Kilopascal => "kPa",
        }
    }
}

/// A magnitude with its physical unit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    pub magnitude: f64,
    pub unit: Unit,
}

impl Quantity {
    pub fn new(magnitude: f64, unit: Unit) -> Self {
        Self { magnitude, unit }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} {}", self.magnitude, self.unit.symbol())
    }
}

/// Decoded value of a command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Scalar reading with a unit
    Quantity(Quantity),
    /// Diagnostic trouble codes (e.g. "P0301")
    Codes(Vec<String>),
}

impl Value {
    /// Numeric magnitude, if this is a scalar reading
    pub fn magnitude(&self) -> Option<f64> {
        match self {
            Value::Quantity(q) => Some(q.magnitude),
            Value::Codes(_) => None,
        }
    }

    /// Trouble codes, if this is a DTC reading
    pub fn codes(&self) -> Option<&[String]> {
        match self {
            Value::Codes(codes) => Some(codes.as_slice()),
            Value::Quantity(_) => None,
        }
    }
}

/// Response from a single command query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Name of the command that was queried
    pub command: String,
    /// Decoded value, `None` when the bytes could not be decoded
    pub value: Option<Value>,
    /// Timestamp when the response was received (Unix ms)
    pub timestamp_ms: u64,
    /// Raw bytes from the response
    pub raw_bytes: Vec<u8>,
}
