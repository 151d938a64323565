//! Connector configuration

use crate::error::ConnectorError;
use config::{Config, Environment, File};
use obd_protocol::names;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Commands polled when none are configured
pub const DEFAULT_COMMANDS: [&str; 8] = [
    names::ENGINE_LOAD,
    names::COOLANT_TEMP,
    names::RPM,
    names::SPEED,
    names::FUEL_LEVEL,
    names::OIL_TEMP,
    names::FUEL_RATE,
    names::GET_CURRENT_DTC,
];

/// Polling connector configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorConfig {
    /// Pause between polling cycles (milliseconds)
    pub loop_wait_ms: u64,
    /// Commands to poll, in polling order
    pub commands: Vec<String>,
    /// Bypass the adapter's response cache on every query
    pub force_refresh: bool,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            loop_wait_ms: 200,
            commands: DEFAULT_COMMANDS.iter().map(|c| c.to_string()).collect(),
            force_refresh: true,
        }
    }
}

impl ConnectorConfig {
    /// Load from an optional file, then `OBD_*` environment variables
    ///
    /// `OBD_LOOP_WAIT_MS=500` and `OBD_COMMANDS=RPM,SPEED` override the
    /// file. Keys this struct does not know are ignored.
    pub fn load(path: Option<&Path>) -> Result<Self, ConnectorError> {
        Ok(settings(path)?.try_deserialize()?)
    }

    /// Inter-cycle wait as a duration
    pub fn loop_wait(&self) -> Duration {
        Duration::from_millis(self.loop_wait_ms)
    }

    /// Same config with a different inter-cycle wait
    pub fn with_loop_wait(mut self, wait: Duration) -> Self {
        self.loop_wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX);
        self
    }
}

/// Layered settings shared by every config section of the process
pub fn settings(path: Option<&Path>) -> Result<Config, config::ConfigError> {
    let mut builder = Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(File::from(path));
    }
    builder
        .add_source(
            Environment::with_prefix("OBD")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("commands"),
        )
        .build()
}
