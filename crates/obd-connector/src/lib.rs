//! OBD-II Polling Connector
//!
//! Runs one background loop that queries an OBD-II connection at a fixed
//! cadence and appends every result to a [`MetricStore`]. Callers read
//! the latest values through typed accessors, or the whole history as a
//! merged time series, without ever touching the connection.
//!
//! A dropped link ends the loop with [`ConnectorError::ConnectionLost`],
//! visible through [`PollingConnector::state`], [`PollingConnector::subscribe`]
//! and [`PollingConnector::join`].
//!
//! [`MetricStore`]: metric_store::MetricStore

mod config;
mod connector;
pub mod convert;
mod error;
mod poller;

pub use config::{settings, ConnectorConfig, DEFAULT_COMMANDS};
pub use connector::{ConnectorState, PollingConnector};
pub use error::ConnectorError;
pub use metric_store::{MetricRecord, Reading};
