//! Append-Only Metric Store Implementation

use crate::reading::{MetricRecord, Reading};
use crate::StoreError;
use obd_protocol::unix_time_ms;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// Readings collected for one command
#[derive(Debug)]
struct MetricSeries {
    command: String,
    /// Never empty: seeded with a sentinel at registration
    readings: Vec<Arc<Reading>>,
    /// Queries for this command that failed
    failures: u64,
}

/// Thread-safe table of per-command reading series
///
/// One writer appends while any number of readers take copies. Every
/// operation holds a store-wide lock only long enough to push or clone
/// `Arc`s, so readers never see a half-written reading.
#[derive(Debug, Default)]
pub struct MetricStore {
    /// Command name to position in `series`; fixed after registration
    index: HashMap<String, usize>,
    /// Series in registration order
    series: RwLock<Vec<MetricSeries>>,
}

impl MetricStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command, seeding its series with an empty sentinel
    pub fn register(&mut self, command: impl Into<String>) -> Result<(), StoreError> {
        let command = command.into();
        if self.index.contains_key(&command) {
            return Err(StoreError::DuplicateCommand(command));
        }

        let series = self.series.get_mut().unwrap_or_else(PoisonError::into_inner);
        self.index.insert(command.clone(), series.len());
        series.push(MetricSeries {
            readings: vec![Arc::new(Reading::empty(command.clone(), unix_time_ms()))],
            command,
            failures: 0,
        });
        debug!("Registered command #{}", series.len());
        Ok(())
    }

    /// Append a reading to a command's series
    pub fn append(&self, command: &str, reading: Reading) -> Result<(), StoreError> {
        let slot = self.slot(command)?;
        let reading = Arc::new(reading);
        self.write()[slot].readings.push(reading);
        Ok(())
    }

    /// Count a failed query for a command
    pub fn record_failure(&self, command: &str) -> Result<(), StoreError> {
        let slot = self.slot(command)?;
        self.write()[slot].failures += 1;
        Ok(())
    }

    /// Most recent reading for a command (the sentinel until one is collected)
    pub fn latest(&self, command: &str) -> Result<Arc<Reading>, StoreError> {
        let slot = self.slot(command)?;
        self.read()[slot]
            .readings
            .last()
            .cloned()
            .ok_or_else(|| StoreError::UnknownCommand(command.to_string()))
    }

    /// Merge all series into one record per collection cycle
    ///
    /// Cycles are aligned by index. A series shorter than the longest one
    /// contributes `None` for the missing tail.
    ///
    /// Copies every `Arc` of the full history under the read lock, so a
    /// concurrent `append` waits for time proportional to the history size.
    pub fn snapshot(&self) -> Vec<MetricRecord> {
        let columns: Vec<(String, Vec<Arc<Reading>>)> = self
            .read()
            .iter()
            .map(|s| (s.command.clone(), s.readings.clone()))
            .collect();

        let cycles = columns.iter().map(|(_, r)| r.len()).max().unwrap_or(0);

        (0..cycles)
            .map(|i| {
                let timestamp_ms = columns
                    .iter()
                    .find_map(|(_, readings)| readings.get(i))
                    .map(|r| r.timestamp_ms)
                    .unwrap_or_default();
                let values = columns
                    .iter()
                    .map(|(command, readings)| {
                        (command.clone(), readings.get(i).and_then(|r| r.magnitude()))
                    })
                    .collect();
                MetricRecord {
                    timestamp_ms,
                    values,
                }
            })
            .collect()
    }

    /// Number of readings held for a command, sentinel included
    pub fn series_len(&self, command: &str) -> Option<usize> {
        let slot = self.index.get(command)?;
        Some(self.read()[*slot].readings.len())
    }

    /// Number of failed queries counted for a command
    pub fn failure_count(&self, command: &str) -> Option<u64> {
        let slot = self.index.get(command)?;
        Some(self.read()[*slot].failures)
    }

    /// Registered commands in registration order
    pub fn commands(&self) -> Vec<String> {
        self.read().iter().map(|s| s.command.clone()).collect()
    }

    /// Check if a command is registered
    pub fn contains(&self, command: &str) -> bool {
        self.index.contains_key(command)
    }

    /// Number of registered commands
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    fn slot(&self, command: &str) -> Result<usize, StoreError> {
        self.index
            .get(command)
            .copied()
            .ok_or_else(|| StoreError::UnknownCommand(command.to_string()))
    }

    // Critical sections never panic, so a poisoned lock still holds
    // consistent data.
    fn read(&self) -> RwLockReadGuard<'_, Vec<MetricSeries>> {
        self.series.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<MetricSeries>> {
        self.series.write().unwrap_or_else(PoisonError::into_inner)
    }
}
