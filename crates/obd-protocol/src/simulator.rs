//! Simulated OBD-II Adapter
//!
//! Produces plausible engine data without hardware. Values are derived
//! from a hash of the query sequence so runs are repeatable.

use crate::command::{encode_dtc, Command};
use crate::connection::Connection;
use crate::error::ObdError;
use crate::mode;
use crate::response::Response;
use crate::unix_time_ms;
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Shared control over a simulated link
///
/// Cloned handles stay valid after the adapter has been moved into a
/// poller, so tests can pull the plug mid-run.
#[derive(Debug, Clone)]
pub struct LinkHandle {
    up: Arc<AtomicBool>,
    queries: Arc<AtomicU64>,
}

impl LinkHandle {
    fn new() -> Self {
        Self {
            up: Arc::new(AtomicBool::new(true)),
            queries: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Simulate the vehicle link going away
    pub fn drop_link(&self) {
        if self.up.swap(false, Ordering::SeqCst) {
            warn!("Simulated OBD link dropped");
        }
    }

    pub fn is_up(&self) -> bool {
        self.up.load(Ordering::SeqCst)
    }

    /// Total queries answered by the adapter
    pub fn queries(&self) -> u64 {
        self.queries.load(Ordering::SeqCst)
    }
}

/// Adapter that answers queries with generated data
pub struct SimulatedAdapter {
    link: LinkHandle,
    /// Liveness checks left before the link drops on its own
    liveness_budget: Option<AtomicU64>,
    /// Commands that always fail with `NoData`
    failing: HashSet<String>,
    /// Codes reported by GET_CURRENT_DTC
    trouble_codes: Vec<String>,
    /// Simulated round-trip time per query
    latency: Duration,
    /// Give up on a query after this long
    timeout: Option<Duration>,
    /// Last response per command, served when `force` is false
    cache: HashMap<String, Response>,
    sequence: u64,
}

impl SimulatedAdapter {
    /// Create a connected adapter with no faults
    pub fn new() -> Self {
        info!("Creating simulated OBD adapter");
        Self {
            link: LinkHandle::new(),
            liveness_budget: None,
            failing: HashSet::new(),
            trouble_codes: Vec::new(),
            latency: Duration::ZERO,
            timeout: None,
            cache: HashMap::new(),
            sequence: 0,
        }
    }

    /// Report connected for the first `checks` liveness checks only
    pub fn with_liveness_budget(mut self, checks: u64) -> Self {
        self.liveness_budget = Some(AtomicU64::new(checks));
        self
    }

    /// Make every query for `command` fail
    pub fn failing(mut self, command: &str) -> Self {
        self.failing.insert(command.to_string());
        self
    }

    /// Report these trouble codes from Mode 03
    pub fn with_trouble_codes<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.trouble_codes = codes.into_iter().map(Into::into).collect();
        self
    }

    /// Delay every query by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail queries that take longer than `timeout` with `Timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Handle for controlling the link from outside
    pub fn link(&self) -> LinkHandle {
        self.link.clone()
    }

    /// Generate raw response bytes for a command
    fn generate_bytes(&self, command: &Command, timestamp_ms: u64) -> Result<Vec<u8>, ObdError> {
        if command.mode == mode::READ_DTC {
            return Ok(self
                .trouble_codes
                .iter()
                .filter_map(|code| encode_dtc(code))
                .flatten()
                .collect());
        }

        let mut hasher = DefaultHasher::new();
        timestamp_ms.hash(&mut hasher);
        self.sequence.hash(&mut hasher);
        command.pid.hash(&mut hasher);
        let hash = hasher.finish();

        let bytes = match command.pid {
            // RPM: 800-3500 RPM range
            0x0C => {
                let rpm = 800 + (hash % 2700) as u16;
                let encoded = rpm * 4;
                vec![(encoded >> 8) as u8, (encoded & 0xFF) as u8]
            }
            // Speed: 0-120 km/h
            0x0D => vec![(hash % 120) as u8],
            // Coolant and oil temp: 70-105°C (stored as value + 40)
            0x05 | 0x5C => vec![(110 + (hash % 35)) as u8],
            // Ambient air: 0-35°C
            0x46 => vec![(40 + (hash % 35)) as u8],
            // Engine load and throttle: 20-80%
            0x04 | 0x11 => vec![(51 + (hash % 153)) as u8],
            // Fuel level: 10-90%
            0x2F => vec![(25 + (hash % 205)) as u8],
            // MAF: 5-50 g/s
            0x10 => {
                let maf = 500 + (hash % 4500) as u16;
                vec![(maf >> 8) as u8, (maf & 0xFF) as u8]
            }
            // Fuel rate: 0.5-15 L/h
            0x5E => {
                let rate = 10 + (hash % 290) as u16;
                vec![(rate >> 8) as u8, (rate & 0xFF) as u8]
            }
            // Intake pressure: 30-100 kPa
            0x0B => vec![(30 + (hash % 70)) as u8],
            _ => return Err(ObdError::UnsupportedCommand(command.name.to_string())),
        };
        Ok(bytes)
    }
}

impl Default for SimulatedAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connection for SimulatedAdapter {
    fn is_connected(&self) -> bool {
        if !self.link.is_up() {
            return false;
        }
        let Some(budget) = &self.liveness_budget else {
            return true;
        };

        let alive = budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if !alive {
            self.link.drop_link();
        }
        alive
    }

    async fn query(&mut self, command: &Command, force: bool) -> Result<Response, ObdError> {
        if !self.link.is_up() {
            return Err(ObdError::VehicleNotConnected);
        }
        if !force {
            if let Some(cached) = self.cache.get(command.name) {
                return Ok(cached.clone());
            }
        }
        match self.timeout {
            Some(timeout) if self.latency > timeout => {
                tokio::time::sleep(timeout).await;
                let waited_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                return Err(ObdError::Timeout(waited_ms));
            }
            _ if !self.latency.is_zero() => tokio::time::sleep(self.latency).await,
            _ => {}
        }

        debug!("Querying {} ({})", command.name, command.request());
        self.sequence += 1;
        self.link.queries.fetch_add(1, Ordering::SeqCst);

        if self.failing.contains(command.name) {
            return Err(ObdError::NoData(command.name.to_string()));
        }

        let timestamp_ms = unix_time_ms();
        let raw_bytes = self.generate_bytes(command, timestamp_ms)?;
        let response = Response {
            command: command.name.to_string(),
            value: command.decode(&raw_bytes),
            timestamp_ms,
            raw_bytes,
        };
        self.cache.insert(command.name.to_string(), response.clone());
        Ok(response)
    }
}
