//! Background polling loop

use crate::connector::ConnectorState;
use crate::error::ConnectorError;
use metric_store::{MetricStore, Reading};
use metrics::counter;
use obd_protocol::{unix_time_ms, Command, Connection};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Owns the connection once polling starts
pub(crate) struct Poller {
    pub(crate) connection: Box<dyn Connection>,
    pub(crate) commands: Vec<Command>,
    pub(crate) store: Arc<MetricStore>,
    pub(crate) loop_wait: Duration,
    pub(crate) force_refresh: bool,
    pub(crate) stop_rx: watch::Receiver<bool>,
    pub(crate) state_tx: Arc<watch::Sender<ConnectorState>>,
}

impl Poller {
    /// Poll until stopped or the link drops
    pub(crate) async fn run(mut self) -> Result<(), ConnectorError> {
        info!(
            "Starting OBD polling loop: {} commands every {:?}",
            self.commands.len(),
            self.loop_wait
        );

        let mut cycles = 0u64;
        let outcome = loop {
            if self.wait_for_next_cycle().await {
                break Ok(());
            }
            if !self.connection.is_connected() {
                error!("OBD connection unexpectedly closed after {} cycles", cycles);
                counter!("obd_connection_lost_total").increment(1);
                break Err(ConnectorError::ConnectionLost);
            }
            self.poll_cycle().await;
            cycles += 1;
        };

        let state = match &outcome {
            Ok(()) => ConnectorState::Stopped,
            Err(_) => ConnectorState::Failed,
        };
        self.state_tx.send_replace(state);
        info!("OBD polling loop exited ({:?}) after {} cycles", state, cycles);
        outcome
    }

    /// Sleep for one interval, waking early on stop
    ///
    /// Returns true once stop has been requested or the connector is gone.
    async fn wait_for_next_cycle(&mut self) -> bool {
        if *self.stop_rx.borrow() {
            return true;
        }
        let sender_gone = tokio::select! {
            _ = tokio::time::sleep(self.loop_wait) => false,
            changed = self.stop_rx.changed() => changed.is_err(),
        };
        sender_gone || *self.stop_rx.borrow()
    }

    /// Query every command once, in registration order
    async fn poll_cycle(&mut self) {
        for command in &self.commands {
            let reading = match self.connection.query(command, self.force_refresh).await {
                Ok(response) => Reading::from(response),
                Err(e) => {
                    warn!("{} query failed: {}", command.name, e);
                    counter!("obd_query_failures_total", "command" => command.name).increment(1);
                    if let Err(e) = self.store.record_failure(command.name) {
                        error!("Failed to count query failure: {}", e);
                    }
                    Reading::empty(command.name, unix_time_ms())
                }
            };

            if let Err(e) = self.store.append(command.name, reading) {
                error!("Failed to store {} reading: {}", command.name, e);
            }
        }
        counter!("obd_poll_cycles_total").increment(1);
        debug!("Poll cycle complete");
    }
}
