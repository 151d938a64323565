//! OBD-II Telemetry Monitor
//!
//! Console front end for the polling connector: logs the latest values
//! on an interval and exports the collected time series on shutdown.

use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use obd_connector::{settings, MetricRecord, PollingConnector};
use obd_protocol::names;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Monitor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Seconds between telemetry log lines
    pub report_interval_secs: u64,
    /// Write the full time series here as JSON on shutdown
    pub export_path: Option<PathBuf>,
    /// Emit logs as JSON lines
    pub json_logs: bool,
    /// Serve Prometheus metrics on this address
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: 5,
            export_path: None,
            json_logs: false,
            metrics_addr: None,
        }
    }
}

impl MonitorConfig {
    /// Load from an optional file, then `OBD_*` environment variables
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        settings(path)?
            .try_deserialize::<Self>()
            .context("Invalid monitor configuration")
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs.max(1))
    }
}

/// Latest value of every accessor at one moment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetrySummary {
    pub engine_load: f64,
    pub coolant_temp: f64,
    pub engine_rpm: f64,
    pub vehicle_speed: f64,
    pub fuel_level: f64,
    pub oil_temp: f64,
    pub fuel_rate: f64,
    /// Only present when AMBIENT_AIR_TEMP is polled
    pub ambient_air_temp: Option<f64>,
    pub dtcs: Vec<String>,
}

impl TelemetrySummary {
    /// Read every accessor once
    pub fn collect(connector: &PollingConnector) -> Self {
        Self {
            engine_load: connector.engine_load(),
            coolant_temp: connector.coolant_temp(),
            engine_rpm: connector.engine_rpm(),
            vehicle_speed: connector.vehicle_speed(),
            fuel_level: connector.fuel_level(),
            oil_temp: connector.oil_temp(),
            fuel_rate: connector.fuel_rate(),
            ambient_air_temp: connector
                .commands()
                .contains(&names::AMBIENT_AIR_TEMP)
                .then(|| connector.ambient_air_temp()),
            dtcs: connector.diagnostic_trouble_codes(),
        }
    }

    pub fn log(&self) {
        info!(
            engine_load = self.engine_load,
            coolant_temp = self.coolant_temp,
            engine_rpm = self.engine_rpm,
            vehicle_speed = self.vehicle_speed,
            fuel_level = self.fuel_level,
            oil_temp = self.oil_temp,
            fuel_rate = self.fuel_rate,
            ambient_air_temp = ?self.ambient_air_temp,
            dtcs = ?self.dtcs,
            "Live telemetry"
        );
    }
}

/// Write the merged time series to `path` as pretty JSON
pub fn export_metrics(records: &[MetricRecord], path: &Path) -> anyhow::Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), records)?;
    info!("Exported {} records to {}", records.len(), path.display());
    Ok(())
}

/// Initialize logging
pub fn init_logging(json: bool) -> anyhow::Result<()> {
    let builder = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(true);

    let result = if json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    result.context("Failed to set tracing subscriber")
}

/// Serve Prometheus metrics over HTTP
pub fn install_metrics_exporter(addr: SocketAddr) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;
    info!("Serving metrics on {}", addr);
    Ok(())
}
