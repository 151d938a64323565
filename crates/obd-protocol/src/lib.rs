//! OBD-II Protocol Contract
//!
//! Defines what a telemetry poller needs from an OBD-II adapter: a
//! liveness check, decoded command queries, and a catalog of named
//! commands. A simulated adapter is provided for running without hardware.

mod command;
mod connection;
mod error;
mod response;
mod simulator;

pub use command::{decode_dtcs, encode_dtc, Command, CommandCatalog, STANDARD_COMMANDS};
pub use connection::Connection;
pub use error::ObdError;
pub use response::{Quantity, Response, Unit, Value};
pub use simulator::{LinkHandle, SimulatedAdapter};

/// OBD-II mode constants
pub mod mode {
    /// Current data
    pub const CURRENT_DATA: u8 = 0x01;
    /// Diagnostic trouble codes
    pub const READ_DTC: u8 = 0x03;
}

/// Standard command names
pub mod names {
    pub const ENGINE_LOAD: &str = "ENGINE_LOAD";
    pub const COOLANT_TEMP: &str = "COOLANT_TEMP";
    pub const INTAKE_PRESSURE: &str = "INTAKE_PRESSURE";
    pub const RPM: &str = "RPM";
    pub const SPEED: &str = "SPEED";
    pub const MAF: &str = "MAF";
    pub const THROTTLE_POS: &str = "THROTTLE_POS";
    pub const FUEL_LEVEL: &str = "FUEL_LEVEL";
    pub const AMBIENT_AIR_TEMP: &str = "AMBIENT_AIR_TEMP";
    pub const OIL_TEMP: &str = "OIL_TEMP";
    pub const FUEL_RATE: &str = "FUEL_RATE";
    pub const GET_CURRENT_DTC: &str = "GET_CURRENT_DTC";
}

/// Current wall-clock time in Unix milliseconds
pub fn unix_time_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
