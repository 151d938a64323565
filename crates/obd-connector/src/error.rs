//! Connector Error Types

use metric_store::StoreError;
use thiserror::Error;

/// Errors raised by the polling connector
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Adapter reported no link when the connector was built
    #[error("No OBD connection")]
    NoConnection,

    /// Requested command is not in the catalog
    #[error("Command {0} not supported")]
    UnsupportedCommand(String),

    /// Link dropped while the polling loop was running
    #[error("OBD connection unexpectedly closed")]
    ConnectionLost,

    /// `start()` called on a connector that already left the Created state
    #[error("Connector already started")]
    AlreadyStarted,

    /// `start()` called outside a tokio runtime
    #[error("No async runtime available: {0}")]
    NoRuntime(String),

    /// Polling task panicked or was aborted
    #[error("Polling task failed: {0}")]
    TaskFailed(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}
