//! Conversions from the latest reading to accessor values
//!
//! Each function maps a missing reading or a missing value to a fixed
//! default. The temperature and fuel-rate defaults are not physically
//! possible, so callers can tell "no data yet" apart from a real reading.

use metric_store::Reading;

/// Temperature reported before any reading arrives (absolute zero, °C)
pub const UNSET_TEMPERATURE_C: f64 = -273.15;

/// Fuel rate reported before any reading arrives (L/h)
pub const UNSET_FUEL_RATE: f64 = -1.0;

/// Percentage reading as a fraction (55 % → 0.55), 0.0 when absent
pub fn fraction(reading: Option<&Reading>) -> f64 {
    reading
        .and_then(Reading::magnitude)
        .map_or(0.0, |percent| percent / 100.0)
}

/// Temperature in °C, [`UNSET_TEMPERATURE_C`] when absent
pub fn temperature(reading: Option<&Reading>) -> f64 {
    reading
        .and_then(Reading::magnitude)
        .unwrap_or(UNSET_TEMPERATURE_C)
}

/// Magnitude unchanged, 0.0 when absent
pub fn magnitude(reading: Option<&Reading>) -> f64 {
    reading.and_then(Reading::magnitude).unwrap_or(0.0)
}

/// Fuel rate in L/h, [`UNSET_FUEL_RATE`] when absent
pub fn fuel_rate(reading: Option<&Reading>) -> f64 {
    reading
        .and_then(Reading::magnitude)
        .unwrap_or(UNSET_FUEL_RATE)
}

/// Active trouble codes, empty when absent
pub fn trouble_codes(reading: Option<&Reading>) -> Vec<String> {
    reading
        .and_then(Reading::codes)
        .map(<[String]>::to_vec)
        .unwrap_or_default()
}
