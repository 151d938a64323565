//! OBD-II Command Definitions and Response Decoding
//!
//! Defines the named commands the adapter understands, the catalog that
//! resolves them by name, and the SAE J1979 decoding formulas.

use crate::mode;
use crate::names;
use crate::response::{Quantity, Unit, Value};
use serde::Serialize;
use std::collections::BTreeMap;

/// A named diagnostic query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Command {
    /// Stable identifier (e.g. "RPM")
    pub name: &'static str,
    /// OBD-II service mode
    pub mode: u8,
    /// Parameter ID within the mode (0 for modes without PIDs)
    pub pid: u8,
    /// Number of data bytes expected (0 = variable length)
    pub response_bytes: usize,
    /// Unit of the decoded value, `None` for non-scalar commands
    pub unit: Option<Unit>,
    /// Human readable description
    pub description: &'static str,
}

impl Command {
    /// ELM327 request string for this command (e.g. "010C")
    pub fn request(&self) -> String {
        if self.mode == mode::READ_DTC {
            format!("{:02X}", self.mode)
        } else {
            format!("{:02X}{:02X}", self.mode, self.pid)
        }
    }

    /// Decode raw data bytes into a value
    ///
    /// Returns `None` when the response is too short or the command has
    /// no known formula.
    pub fn decode(&self, bytes: &[u8]) -> Option<Value> {
        if self.mode == mode::READ_DTC {
            return Some(Value::Codes(decode_dtcs(bytes)));
        }
        if self.mode != mode::CURRENT_DATA || bytes.len() < self.response_bytes.max(1) {
            return None;
        }

        let a = bytes[0] as f64;
        let b = bytes.get(1).copied().unwrap_or(0) as f64;

        let magnitude = match self.pid {
            // Engine load, throttle, fuel level: A * 100 / 255 (%)
            0x04 | 0x11 | 0x2F => a * 100.0 / 255.0,
            // Coolant, ambient air, oil temp: A - 40 (°C)
            0x05 | 0x46 | 0x5C => a - 40.0,
            // Intake manifold pressure: A (kPa)
            0x0B => a,
            // RPM: ((A*256)+B)/4
            0x0C => (a * 256.0 + b) / 4.0,
            // Speed: A (km/h)
            0x0D => a,
            // MAF: ((A*256)+B) / 100 (g/s)
            0x10 => (a * 256.0 + b) / 100.0,
            // Fuel rate: ((A*256)+B) / 20 (L/h)
            0x5E => (a * 256.0 + b) / 20.0,
            _ => return None,
        };

        self.unit.map(|unit| Value::Quantity(Quantity::new(magnitude, unit)))
    }
}

/// Decode Mode 03 byte pairs into trouble codes
///
/// Each code is two bytes: the top two bits select the system letter
/// (P, C, B, U), followed by four hex digits. Zero pairs are padding.
pub fn decode_dtcs(bytes: &[u8]) -> Vec<String> {
    const SYSTEMS: [char; 4] = ['P', 'C', 'B', 'U'];

    bytes
        .chunks_exact(2)
        .filter(|pair| pair[0] != 0 || pair[1] != 0)
        .map(|pair| {
            let (a, b) = (pair[0], pair[1]);
            format!(
                "{}{}{:X}{:X}{:X}",
                SYSTEMS[(a >> 6) as usize],
                (a >> 4) & 0x03,
                a & 0x0F,
                b >> 4,
                b & 0x0F
            )
        })
        .collect()
}

/// Encode a trouble code such as "P0301" into its two-byte form
pub fn encode_dtc(code: &str) -> Option<[u8; 2]> {
    let mut chars = code.chars();
    let system = match chars.next()? {
        'P' => 0u8,
        'C' => 1,
        'B' => 2,
        'U' => 3,
        _ => return None,
    };
    let digits: Vec<u8> = chars
        .map(|c| c.to_digit(16).map(|d| d as u8))
        .collect::<Option<_>>()?;
    if digits.len() != 4 || digits[0] > 3 {
        return None;
    }

    Some([
        (system << 6) | (digits[0] << 4) | digits[1],
        (digits[2] << 4) | digits[3],
    ])
}

const fn current(
    name: &'static str,
    pid: u8,
    response_bytes: usize,
    unit: Unit,
    description: &'static str,
) -> Command {
    Command {
        name,
        mode: mode::CURRENT_DATA,
        pid,
        response_bytes,
        unit: Some(unit),
        description,
    }
}

/// Commands known to the standard catalog
pub const STANDARD_COMMANDS: [Command; 12] = [
    current(names::ENGINE_LOAD, 0x04, 1, Unit::Percent, "Calculated engine load"),
    current(names::COOLANT_TEMP, 0x05, 1, Unit::Celsius, "Engine coolant temperature"),
    current(names::INTAKE_PRESSURE, 0x0B, 1, Unit::Kilopascal, "Intake manifold absolute pressure"),
    current(names::RPM, 0x0C, 2, Unit::Rpm, "Engine RPM"),
    current(names::SPEED, 0x0D, 1, Unit::KilometersPerHour, "Vehicle speed"),
    current(names::MAF, 0x10, 2, Unit::GramsPerSecond, "Mass air flow rate"),
    current(names::THROTTLE_POS, 0x11, 1, Unit::Percent, "Throttle position"),
    current(names::FUEL_LEVEL, 0x2F, 1, Unit::Percent, "Fuel tank level input"),
    current(names::AMBIENT_AIR_TEMP, 0x46, 1, Unit::Celsius, "Ambient air temperature"),
    current(names::OIL_TEMP, 0x5C, 1, Unit::Celsius, "Engine oil temperature"),
    current(names::FUEL_RATE, 0x5E, 2, Unit::LitersPerHour, "Engine fuel rate"),
    Command {
        name: names::GET_CURRENT_DTC,
        mode: mode::READ_DTC,
        pid: 0x00,
        response_bytes: 0,
        unit: None,
        description: "Get diagnostic trouble codes",
    },
];

/// Maps command names to their definitions
#[derive(Debug, Clone, Default)]
pub struct CommandCatalog {
    commands: BTreeMap<&'static str, Command>,
}

impl CommandCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with every standard command
    pub fn standard() -> Self {
        STANDARD_COMMANDS.iter().copied().collect()
    }

    /// Add or replace a command
    pub fn insert(&mut self, command: Command) {
        self.commands.insert(command.name, command);
    }

    /// Look up a command by name
    pub fn get(&self, name: &str) -> Option<&Command> {
        self.commands.get(name)
    }

    /// Check whether a command name is known
    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    /// All known command names, sorted
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.commands.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl FromIterator<Command> for CommandCatalog {
    fn from_iter<I: IntoIterator<Item = Command>>(iter: I) -> Self {
        let mut catalog = Self::new();
        for command in iter {
            catalog.insert(command);
        }
        catalog
    }
}
