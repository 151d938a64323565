//! OBD-II Error Types

use thiserror::Error;

/// Errors that can occur while talking to an OBD-II adapter
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ObdError {
    /// Timeout waiting for response
    #[error("Timeout waiting for OBD response after {0}ms")]
    Timeout(u64),

    /// Adapter answered with "NO DATA" for the command
    #[error("No data returned for {0}")]
    NoData(String),

    /// Command not known to the adapter or the vehicle
    #[error("Command {0} not supported")]
    UnsupportedCommand(String),

    /// Vehicle not connected
    #[error("Vehicle ignition is off or not connected")]
    VehicleNotConnected,
}
