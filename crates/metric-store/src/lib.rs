//! Metric Store
//!
//! Keeps every reading collected per command, in collection order, and
//! serves consistent copies of it to readers while a poller appends.

mod reading;
mod store;

pub use reading::{MetricRecord, Reading};
pub use store::MetricStore;

use thiserror::Error;

/// Metric store errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Command {0} is already registered")]
    DuplicateCommand(String),
    #[error("Command {0} was never registered")]
    UnknownCommand(String),
}
