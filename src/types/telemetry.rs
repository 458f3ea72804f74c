//! Telemetry snapshot decoded from the drone's state datagrams

use serde::Serialize;
use std::collections::HashMap;
use std::time::Instant;
use tracing::debug;

/// One fully parsed telemetry datagram.
///
/// Snapshots are immutable and shared as `Arc<TelemetrySnapshot>`; a new datagram
/// produces a new snapshot that replaces the previous one as a whole.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    fields: HashMap<String, f64>,

    /// Arrival order of the datagram this snapshot came from (1-based)
    #[serde(skip)]
    sequence: u64,

    #[serde(skip)]
    received_at: Instant,
}

impl TelemetrySnapshot {
    /// Parse a datagram body of the form `key1:value1;key2:value2;...`.
    ///
    /// Items without a `:` are skipped. Each item is split on its first `:`, and
    /// an item whose value is not a number is skipped on its own without affecting
    /// the other items of the same datagram.
    pub fn parse(text: &str) -> Self {
        let mut fields = HashMap::new();

        for item in text.split(';') {
            let Some((key, value)) = item.split_once(':') else {
                continue;
            };
            let key = key.trim();
            match value.trim().parse::<f64>() {
                Ok(number) => {
                    fields.insert(key.to_string(), number);
                }
                Err(e) => {
                    debug!(key, value, "Skipping malformed telemetry field: {}", e);
                }
            }
        }

        Self::from_fields(fields)
    }

    /// Build a snapshot from already-decoded fields.
    pub fn from_fields(fields: HashMap<String, f64>) -> Self {
        Self { fields, sequence: 0, received_at: Instant::now() }
    }

    pub(crate) fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    /// Look up a field by its wire name.
    pub fn get(&self, key: &str) -> Option<f64> {
        self.fields.get(key).copied()
    }

    pub fn fields(&self) -> &HashMap<String, f64> {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn received_at(&self) -> Instant {
        self.received_at
    }

    /// Pitch in degrees
    pub fn pitch(&self) -> Option<f64> {
        self.get("pitch")
    }

    /// Roll in degrees
    pub fn roll(&self) -> Option<f64> {
        self.get("roll")
    }

    /// Yaw in degrees
    pub fn yaw(&self) -> Option<f64> {
        self.get("yaw")
    }

    /// Velocity components (x, y, z) in dm/s
    pub fn velocity(&self) -> Option<(f64, f64, f64)> {
        Some((self.get("vgx")?, self.get("vgy")?, self.get("vgz")?))
    }

    /// Acceleration components (x, y, z)
    pub fn acceleration(&self) -> Option<(f64, f64, f64)> {
        Some((self.get("agx")?, self.get("agy")?, self.get("agz")?))
    }

    /// Lowest and highest board temperature in °C
    pub fn temperature_range(&self) -> Option<(f64, f64)> {
        Some((self.get("templ")?, self.get("temph")?))
    }

    /// Time-of-flight distance sensor reading in cm
    pub fn tof(&self) -> Option<f64> {
        self.get("tof")
    }

    /// Height in cm
    pub fn height(&self) -> Option<f64> {
        self.get("h")
    }

    /// Battery percentage
    pub fn battery(&self) -> Option<f64> {
        self.get("bat")
    }

    /// Barometer altitude in m
    pub fn barometer(&self) -> Option<f64> {
        self.get("baro")
    }

    /// Motor-on time in seconds
    pub fn flight_time(&self) -> Option<f64> {
        self.get("time")
    }
}
