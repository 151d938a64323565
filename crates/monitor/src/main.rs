//! OBD Monitor - Main Entry Point

use anyhow::Result;
use monitor::{export_metrics, init_logging, install_metrics_exporter, MonitorConfig, TelemetrySummary};
use obd_connector::{ConnectorConfig, PollingConnector};
use obd_protocol::SimulatedAdapter;
use std::path::PathBuf;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let settings = MonitorConfig::load(config_path.as_deref())?;
    let connector_config = ConnectorConfig::load(config_path.as_deref())?;
    init_logging(settings.json_logs)?;

    info!("=== OBD Monitor v{} ===", env!("CARGO_PKG_VERSION"));
    if let Some(addr) = settings.metrics_addr {
        install_metrics_exporter(addr)?;
    }

    let mut connector = PollingConnector::from_config(SimulatedAdapter::new(), &connector_config)?;
    let mut state = connector.subscribe();
    connector.start()?;

    let mut ticker = tokio::time::interval(settings.report_interval());
    loop {
        tokio::select! {
            _ = ticker.tick() => TelemetrySummary::collect(&connector).log(),
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupt received, shutting down");
                connector.stop();
                break;
            }
            changed = state.changed() => {
                if changed.is_err() || state.borrow().is_terminal() {
                    break;
                }
            }
        }
    }

    let outcome = connector.join().await;
    if let Some(path) = &settings.export_path {
        export_metrics(&connector.metrics(), path)?;
    }
    if let Err(e) = &outcome {
        warn!("Polling ended with error: {}", e);
    }
    Ok(outcome?)
}
