//! Connection contract for OBD-II adapters

use crate::command::Command;
use crate::error::ObdError;
use crate::response::Response;
use async_trait::async_trait;

/// A live link to an OBD-II adapter
///
/// Implementors own the wire protocol. Callers only see liveness and
/// decoded responses.
#[async_trait]
pub trait Connection: Send {
    /// Whether the adapter still reports a working link to the vehicle
    fn is_connected(&self) -> bool;

    /// Query a command and return the decoded response
    ///
    /// `force` bypasses any response cache the adapter keeps.
    async fn query(&mut self, command: &Command, force: bool) -> Result<Response, ObdError>;
}

#[async_trait]
impl<C: Connection + ?Sized> Connection for Box<C> {
    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    async fn query(&mut self, command: &Command, force: bool) -> Result<Response, ObdError> {
        (**self).query(command, force).await
    }
}
