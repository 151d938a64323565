//! Polling Connector Implementation

use crate::config::ConnectorConfig;
use crate::convert;
use crate::error::ConnectorError;
use crate::poller::Poller;
use metric_store::{MetricRecord, MetricStore, Reading};
use obd_protocol::{names, Command, CommandCatalog, Connection};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Lifecycle of a connector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectorState {
    /// Built, loop not started
    Created,
    /// Loop running
    Running,
    /// Loop exited after `stop()`
    Stopped,
    /// Loop exited because the connection was lost
    Failed,
}

impl ConnectorState {
    /// Whether the loop has ended for good
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectorState::Stopped | ConnectorState::Failed)
    }
}

/// Polls an OBD-II connection in the background and serves the results
///
/// The connection moves into the polling task on [`start`](Self::start);
/// from then on nothing else can query it. Accessors read the shared
/// [`MetricStore`] and never fail: missing data maps to a default.
///
/// Dropping the connector ends the loop at its next wait.
pub struct PollingConnector {
    store: Arc<MetricStore>,
    commands: Vec<Command>,
    loop_wait: Duration,
    force_refresh: bool,
    /// Present until the loop takes it
    connection: Option<Box<dyn Connection>>,
    stop_tx: watch::Sender<bool>,
    state_tx: Arc<watch::Sender<ConnectorState>>,
    state_rx: watch::Receiver<ConnectorState>,
    task: Option<JoinHandle<Result<(), ConnectorError>>>,
}

impl PollingConnector {
    /// Create a connector for the given commands
    ///
    /// Fails if the connection is down or any command is unknown to the
    /// catalog. Commands are resolved before anything is registered.
    pub fn new<C, I, S>(
        connection: C,
        catalog: &CommandCatalog,
        commands: I,
        config: &ConnectorConfig,
    ) -> Result<Self, ConnectorError>
    where
        C: Connection + 'static,
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if !connection.is_connected() {
            return Err(ConnectorError::NoConnection);
        }

        let commands = commands
            .into_iter()
            .map(|name| {
                let name = name.as_ref();
                catalog
                    .get(name)
                    .copied()
                    .ok_or_else(|| ConnectorError::UnsupportedCommand(name.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut store = MetricStore::new();
        for command in &commands {
            store.register(command.name)?;
        }

        let (stop_tx, _) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(ConnectorState::Created);

        info!("OBD connector created with {} commands", commands.len());
        debug!("Commands: {:?}", commands.iter().map(|c| c.name).collect::<Vec<_>>());

        Ok(Self {
            store: Arc::new(store),
            commands,
            loop_wait: config.loop_wait(),
            force_refresh: config.force_refresh,
            connection: Some(Box::new(connection)),
            stop_tx,
            state_tx: Arc::new(state_tx),
            state_rx,
            task: None,
        })
    }

    /// Create a connector for the configured commands from the standard catalog
    pub fn from_config<C>(connection: C, config: &ConnectorConfig) -> Result<Self, ConnectorError>
    where
        C: Connection + 'static,
    {
        Self::new(connection, &CommandCatalog::standard(), &config.commands, config)
    }

    /// Spawn the polling loop on the current tokio runtime
    pub fn start(&mut self) -> Result<(), ConnectorError> {
        if self.state() != ConnectorState::Created {
            return Err(ConnectorError::AlreadyStarted);
        }
        let runtime = Handle::try_current().map_err(|e| ConnectorError::NoRuntime(e.to_string()))?;
        let connection = self.connection.take().ok_or(ConnectorError::AlreadyStarted)?;

        let poller = Poller {
            connection,
            commands: self.commands.clone(),
            store: Arc::clone(&self.store),
            loop_wait: self.loop_wait,
            force_refresh: self.force_refresh,
            stop_rx: self.stop_tx.subscribe(),
            state_tx: Arc::clone(&self.state_tx),
        };

        self.state_tx.send_replace(ConnectorState::Running);
        self.task = Some(runtime.spawn(poller.run()));
        info!("OBD connector started");
        Ok(())
    }

    /// Ask the loop to exit
    ///
    /// Returns immediately; the state becomes `Stopped` once the loop
    /// notices. Safe to call repeatedly. Before `start()` it does nothing.
    pub fn stop(&self) {
        if self.state() == ConnectorState::Created {
            warn!("stop() called before start(), ignoring");
            return;
        }
        if !self.stop_tx.send_replace(true) {
            info!("Stopping OBD connector");
        }
    }

    /// Wait for the loop to exit and return how it ended
    pub async fn join(&mut self) -> Result<(), ConnectorError> {
        match self.task.take() {
            Some(task) => task
                .await
                .map_err(|e| ConnectorError::TaskFailed(e.to_string()))?,
            None => self.fault().map_or(Ok(()), Err),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectorState {
        *self.state_rx.borrow()
    }

    /// The fault that ended the loop, if any
    pub fn fault(&self) -> Option<ConnectorError> {
        match self.state() {
            ConnectorState::Failed => Some(ConnectorError::ConnectionLost),
            _ => None,
        }
    }

    /// Receiver notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<ConnectorState> {
        self.state_rx.clone()
    }

    /// Engine load as a fraction (0.0-1.0)
    pub fn engine_load(&self) -> f64 {
        convert::fraction(self.latest(names::ENGINE_LOAD).as_deref())
    }

    /// Coolant temperature in °C (-273.15 until read)
    pub fn coolant_temp(&self) -> f64 {
        convert::temperature(self.latest(names::COOLANT_TEMP).as_deref())
    }

    /// Engine RPM
    pub fn engine_rpm(&self) -> f64 {
        convert::magnitude(self.latest(names::RPM).as_deref())
    }

    /// Vehicle speed in km/h
    pub fn vehicle_speed(&self) -> f64 {
        convert::magnitude(self.latest(names::SPEED).as_deref())
    }

    /// Fuel level as a fraction (0.0-1.0)
    pub fn fuel_level(&self) -> f64 {
        convert::fraction(self.latest(names::FUEL_LEVEL).as_deref())
    }

    /// Engine oil temperature in °C (-273.15 until read)
    pub fn oil_temp(&self) -> f64 {
        convert::temperature(self.latest(names::OIL_TEMP).as_deref())
    }

    /// Ambient air temperature in °C (-273.15 until read or when not polled)
    pub fn ambient_air_temp(&self) -> f64 {
        convert::temperature(self.latest(names::AMBIENT_AIR_TEMP).as_deref())
    }

    /// Instantaneous fuel consumption in L/h (-1.0 until read)
    pub fn fuel_rate(&self) -> f64 {
        convert::fuel_rate(self.latest(names::FUEL_RATE).as_deref())
    }

    /// Active diagnostic trouble codes
    pub fn diagnostic_trouble_codes(&self) -> Vec<String> {
        convert::trouble_codes(self.latest(names::GET_CURRENT_DTC).as_deref())
    }

    /// Every collected reading as a time series, one record per cycle
    ///
    /// Timestamps within a record are only approximately simultaneous.
    pub fn metrics(&self) -> Vec<MetricRecord> {
        self.store.snapshot()
    }

    /// Latest raw reading for a polled command
    pub fn latest(&self, command: &str) -> Option<Arc<Reading>> {
        self.store.latest(command).ok()
    }

    /// Readings held for a command, sentinel included
    pub fn history_len(&self, command: &str) -> Option<usize> {
        self.store.series_len(command)
    }

    /// Failed queries counted for a command
    pub fn failure_count(&self, command: &str) -> Option<u64> {
        self.store.failure_count(command)
    }

    /// Polled command names, in polling order
    pub fn commands(&self) -> Vec<&'static str> {
        self.commands.iter().map(|c| c.name).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_COMMANDS;
    use crate::convert::{UNSET_FUEL_RATE, UNSET_TEMPERATURE_C};
    use metric_store::StoreError;
    use obd_protocol::SimulatedAdapter;

    fn connector(adapter: SimulatedAdapter) -> PollingConnector {
        PollingConnector::from_config(adapter, &ConnectorConfig::default()).unwrap()
    }

    async fn run_for(connector: &mut PollingConnector, duration: Duration) {
        connector.start().unwrap();
        tokio::time::sleep(duration).await;
        connector.stop();
        connector.join().await.unwrap();
    }

    #[test]
    fn test_no_connection() {
        let adapter = SimulatedAdapter::new();
        adapter.link().drop_link();
        let result = PollingConnector::from_config(adapter, &ConnectorConfig::default());
        assert!(matches!(result, Err(ConnectorError::NoConnection)));
    }

    #[test]
    fn test_unsupported_command() {
        let result = PollingConnector::new(
            SimulatedAdapter::new(),
            &CommandCatalog::standard(),
            [names::RPM, "TURBO_BOOST", names::SPEED],
            &ConnectorConfig::default(),
        );
        assert!(matches!(
            result,
            Err(ConnectorError::UnsupportedCommand(name)) if name == "TURBO_BOOST"
        ));
    }

    #[test]
    fn test_duplicate_command() {
        let result = PollingConnector::new(
            SimulatedAdapter::new(),
            &CommandCatalog::standard(),
            [names::RPM, names::RPM],
            &ConnectorConfig::default(),
        );
        assert!(matches!(
            result,
            Err(ConnectorError::Store(StoreError::DuplicateCommand(_)))
        ));
    }

    #[test]
    fn test_defaults_before_first_cycle() {
        let connector = connector(SimulatedAdapter::new());

        assert_eq!(connector.state(), ConnectorState::Created);
        assert_eq!(connector.engine_load(), 0.0);
        assert_eq!(connector.fuel_level(), 0.0);
        assert_eq!(connector.engine_rpm(), 0.0);
        assert_eq!(connector.vehicle_speed(), 0.0);
        assert_eq!(connector.coolant_temp(), UNSET_TEMPERATURE_C);
        assert_eq!(connector.oil_temp(), UNSET_TEMPERATURE_C);
        assert_eq!(connector.fuel_rate(), UNSET_FUEL_RATE);
        assert!(connector.diagnostic_trouble_codes().is_empty());

        // Every command has its sentinel
        for command in DEFAULT_COMMANDS {
            assert_eq!(connector.history_len(command), Some(1));
        }
        let records = connector.metrics();
        assert_eq!(records.len(), 1);
        assert!(records[0].values.values().all(Option::is_none));
    }

    #[test]
    fn test_unpolled_command_uses_default() {
        let connector = connector(SimulatedAdapter::new());
        assert_eq!(connector.ambient_air_temp(), UNSET_TEMPERATURE_C);
        assert!(connector.latest(names::AMBIENT_AIR_TEMP).is_none());
    }

    #[test]
    fn test_start_requires_runtime() {
        let mut connector = connector(SimulatedAdapter::new());
        assert!(matches!(connector.start(), Err(ConnectorError::NoRuntime(_))));
        assert_eq!(connector.state(), ConnectorState::Created);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_before_start_is_noop() {
        let mut connector = connector(SimulatedAdapter::new());
        connector.stop();
        connector.stop();
        assert_eq!(connector.state(), ConnectorState::Created);
        assert_eq!(connector.history_len(names::RPM), Some(1));

        // Still startable afterwards
        run_for(&mut connector, Duration::from_millis(450)).await;
        assert_eq!(connector.state(), ConnectorState::Stopped);
        assert!(connector.history_len(names::RPM).unwrap() > 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice() {
        let mut connector = connector(SimulatedAdapter::new());
        connector.start().unwrap();
        assert_eq!(connector.state(), ConnectorState::Running);
        assert!(matches!(connector.start(), Err(ConnectorError::AlreadyStarted)));

        connector.stop();
        connector.join().await.unwrap();
        assert!(matches!(connector.start(), Err(ConnectorError::AlreadyStarted)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_fills_every_series() {
        let adapter = SimulatedAdapter::new().with_trouble_codes(["P0301"]);
        let mut connector = connector(adapter);
        run_for(&mut connector, Duration::from_millis(1_050)).await;

        assert_eq!(connector.state(), ConnectorState::Stopped);
        let len = connector.history_len(names::RPM).unwrap();
        assert!(len >= 2);
        for command in DEFAULT_COMMANDS {
            assert_eq!(connector.history_len(command), Some(len));
        }
        assert_eq!(connector.metrics().len(), len);

        assert!((800.0..=3500.0).contains(&connector.engine_rpm()));
        assert!((70.0..=105.0).contains(&connector.coolant_temp()));
        assert!((70.0..=105.0).contains(&connector.oil_temp()));
        assert!((0.0..=1.0).contains(&connector.engine_load()));
        assert!((0.0..=1.0).contains(&connector.fuel_level()));
        assert!(connector.fuel_rate() >= 0.0);
        assert_eq!(connector.diagnostic_trouble_codes(), vec!["P0301"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_readings_do_not_grow_after_stop() {
        let mut connector = connector(SimulatedAdapter::new());
        run_for(&mut connector, Duration::from_millis(650)).await;
        let len = connector.history_len(names::SPEED);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(connector.history_len(names::SPEED), len);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_interrupts_wait() {
        let config = ConnectorConfig::default().with_loop_wait(Duration::from_secs(60));
        let mut connector = PollingConnector::from_config(SimulatedAdapter::new(), &config).unwrap();
        connector.start().unwrap();
        tokio::task::yield_now().await;

        connector.stop();
        connector.stop();
        let joined = tokio::time::timeout(Duration::from_secs(1), connector.join()).await;
        assert!(matches!(joined, Ok(Ok(()))));
        assert_eq!(connector.state(), ConnectorState::Stopped);
        assert_eq!(connector.history_len(names::RPM), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_lost_on_fifth_cycle() {
        // One liveness check at construction, then four good cycles
        let adapter = SimulatedAdapter::new().with_liveness_budget(5);
        let link = adapter.link();
        let mut connector = connector(adapter);
        let mut status = connector.subscribe();

        connector.start().unwrap();
        let outcome = connector.join().await;

        assert!(matches!(outcome, Err(ConnectorError::ConnectionLost)));
        assert_eq!(connector.state(), ConnectorState::Failed);
        assert_eq!(*status.borrow_and_update(), ConnectorState::Failed);
        assert!(matches!(connector.fault(), Some(ConnectorError::ConnectionLost)));

        // Sentinel plus four complete cycles, nothing from the fifth
        for command in DEFAULT_COMMANDS {
            assert_eq!(connector.history_len(command), Some(5));
        }
        assert_eq!(connector.metrics().len(), 5);
        assert_eq!(link.queries(), 4 * DEFAULT_COMMANDS.len() as u64);

        // The fault stays observable
        assert!(matches!(connector.join().await, Err(ConnectorError::ConnectionLost)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_dropped_mid_run() {
        let adapter = SimulatedAdapter::new();
        let link = adapter.link();
        let mut connector = connector(adapter);
        connector.start().unwrap();

        tokio::time::sleep(Duration::from_millis(450)).await;
        link.drop_link();

        assert!(matches!(connector.join().await, Err(ConnectorError::ConnectionLost)));
        let len = connector.history_len(names::RPM);
        for command in DEFAULT_COMMANDS {
            assert_eq!(connector.history_len(command), len);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_failure_does_not_abort_cycle() {
        let adapter = SimulatedAdapter::new().failing(names::OIL_TEMP);
        let mut connector = connector(adapter);
        run_for(&mut connector, Duration::from_millis(650)).await;

        let len = connector.history_len(names::OIL_TEMP).unwrap();
        assert!(len > 1);
        assert_eq!(connector.history_len(names::RPM), Some(len));
        assert_eq!(connector.failure_count(names::OIL_TEMP), Some(len as u64 - 1));
        assert_eq!(connector.failure_count(names::RPM), Some(0));

        assert_eq!(connector.oil_temp(), UNSET_TEMPERATURE_C);
        assert!(connector.engine_rpm() > 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_mid_cycle_finishes_cycle() {
        // Cycle 1 runs from 200ms to 600ms: eight queries of 50ms each
        let adapter = SimulatedAdapter::new().with_latency(Duration::from_millis(50));
        let link = adapter.link();
        let mut connector = connector(adapter);
        connector.start().unwrap();

        tokio::time::sleep(Duration::from_millis(320)).await;
        assert!(link.queries() > 0);
        assert!(link.queries() < DEFAULT_COMMANDS.len() as u64);
        connector.stop();
        connector.join().await.unwrap();

        assert_eq!(connector.state(), ConnectorState::Stopped);
        assert_eq!(link.queries(), DEFAULT_COMMANDS.len() as u64);
        for command in DEFAULT_COMMANDS {
            assert_eq!(connector.history_len(command), Some(2));
        }
        assert_eq!(connector.metrics().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_query_counts_as_failure() {
        let adapter = SimulatedAdapter::new()
            .with_latency(Duration::from_millis(80))
            .with_timeout(Duration::from_millis(20));
        let mut connector = PollingConnector::new(
            adapter,
            &CommandCatalog::standard(),
            [names::RPM, names::SPEED],
            &ConnectorConfig::default(),
        )
        .unwrap();
        run_for(&mut connector, Duration::from_millis(650)).await;

        let len = connector.history_len(names::RPM).unwrap();
        assert!(len > 1);
        assert_eq!(connector.history_len(names::SPEED), Some(len));
        assert_eq!(connector.failure_count(names::RPM), Some(len as u64 - 1));
        assert_eq!(connector.engine_rpm(), 0.0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_reads_while_polling_are_consistent() {
        let config = ConnectorConfig::default().with_loop_wait(Duration::from_millis(1));
        let mut connector = PollingConnector::from_config(SimulatedAdapter::new(), &config).unwrap();
        let polled = connector.commands();
        connector.start().unwrap();

        while connector.history_len(names::RPM).unwrap_or(0) < 4 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        let mut seen = 0;
        for i in 0..2000 {
            let records = connector.metrics();
            assert!(records.len() >= seen);
            seen = records.len();

            // Every record before the newest holds a full cycle
            for record in &records[1..records.len() - 1] {
                for command in &polled {
                    let value = record.get(command);
                    if *command == names::GET_CURRENT_DTC {
                        assert_eq!(value, None);
                    } else {
                        assert!(value.is_some(), "{} missing from a finished cycle", command);
                    }
                }
            }

            let rpm = connector.engine_rpm();
            assert!((800.0..=3500.0).contains(&rpm), "rpm {}", rpm);
            if i % 100 == 0 {
                tokio::task::yield_now().await;
            }
        }

        connector.stop();
        connector.join().await.unwrap();
        let len = connector.history_len(names::RPM);
        for command in DEFAULT_COMMANDS {
            assert_eq!(connector.history_len(command), len);
        }
        assert!(connector.metrics().len() >= seen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_ambient_air_temp() {
        let mut connector = PollingConnector::new(
            SimulatedAdapter::new(),
            &CommandCatalog::standard(),
            [names::AMBIENT_AIR_TEMP],
            &ConnectorConfig::default(),
        )
        .unwrap();
        assert_eq!(connector.commands(), vec![names::AMBIENT_AIR_TEMP]);

        run_for(&mut connector, Duration::from_millis(250)).await;
        assert!((0.0..=35.0).contains(&connector.ambient_air_temp()));
        assert_eq!(connector.coolant_temp(), UNSET_TEMPERATURE_C);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_connector_ends_loop() {
        let adapter = SimulatedAdapter::new();
        let link = adapter.link();
        let mut connector = connector(adapter);
        connector.start().unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
        drop(connector);

        let queries = link.queries();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(link.queries(), queries);
    }
}
