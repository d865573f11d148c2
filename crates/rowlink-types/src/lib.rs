//! Shared vocabulary for the rowlink workspace: device identity, CSAFE
//! command tokens, decoded readings, workout requests, and the error
//! taxonomy every other crate reports through.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod command;

pub use command::{CsafeCommand, CsafeToken, ResponseMap};

/// Stable key distinguishing one physical erg from another across discovery
/// cycles (e.g. `"serial:430012345"` or `"bus1-addr4"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single decoded field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    /// Force-plot samples.
    Samples(Vec<u32>),
    /// Human-readable label substituted for an enumerated code.
    Label(String),
}

impl FieldValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view; integers are widened.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(v) => Some(*v as f64),
            FieldValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_label(&self) -> Option<&str> {
        match self {
            FieldValue::Label(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        FieldValue::Int(i64::from(v))
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<Vec<u32>> for FieldValue {
    fn from(v: Vec<u32>) -> Self {
        FieldValue::Samples(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Label(v.to_string())
    }
}

/// Named fields produced by one query (telemetry snapshot, workout summary,
/// device info).  Serialises as a flat JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reading(BTreeMap<String, FieldValue>);

impl Reading {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Integer value of `key`, `None` if absent or not an integer.
    pub fn int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(FieldValue::as_i64)
    }

    pub fn float(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(FieldValue::as_f64)
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(FieldValue::as_label)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut FieldValue)> {
        self.0.iter_mut().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy every field of `other` into `self`, overwriting duplicates.
    pub fn merge(&mut self, other: &Reading) {
        self.0
            .extend(other.0.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
}

/// Result of one polling cycle for a single erg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErgUpdate {
    pub monitor: Reading,
    pub workout: Reading,
}

impl ErgUpdate {
    /// Flatten monitor and workout fields into one reading; workout fields
    /// win on duplicate keys.
    pub fn merged(&self) -> Reading {
        let mut all = self.monitor.clone();
        all.merge(&self.workout);
        all
    }
}

/// Parameters for programming a workout on an erg.
///
/// At most one of `program`, `workout_time`, `distance` selects the goal;
/// `split` applies to time and distance goals; the pace boat is taken from
/// `pace`, else `calpace`, else `powerpace`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkoutRequest {
    /// Stored workout program, 0 to 15.
    pub program: Option<u32>,
    /// Up to `[hours, minutes, seconds]`; missing leading parts are zero.
    pub workout_time: Option<Vec<u32>>,
    /// Meters, 100 to 50000.
    pub distance: Option<u32>,
    /// Seconds for time goals, whole meters for distance goals.
    pub split: Option<f64>,
    /// Pace boat in seconds per 500 m.
    pub pace: Option<f64>,
    /// Pace boat in kcal per hour.
    pub calpace: Option<f64>,
    /// Pace boat in watts.
    pub powerpace: Option<u32>,
}

impl WorkoutRequest {
    pub fn program(program: u32) -> Self {
        Self {
            program: Some(program),
            ..Self::default()
        }
    }

    pub fn time(workout_time: impl Into<Vec<u32>>) -> Self {
        Self {
            workout_time: Some(workout_time.into()),
            ..Self::default()
        }
    }

    pub fn distance(meters: u32) -> Self {
        Self {
            distance: Some(meters),
            ..Self::default()
        }
    }

    pub fn with_split(mut self, split: f64) -> Self {
        self.split = Some(split);
        self
    }

    pub fn with_pace(mut self, seconds_per_500m: f64) -> Self {
        self.pace = Some(seconds_per_500m);
        self
    }

    pub fn with_calpace(mut self, kcal_per_hour: f64) -> Self {
        self.calpace = Some(kcal_per_hour);
        self
    }

    pub fn with_powerpace(mut self, watts: u32) -> Self {
        self.powerpace = Some(watts);
        self
    }
}

/// Rejected workout parameters.  Never retried.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValidationError {
    #[error("{field} {value} outside of range [{min}, {max}]")]
    OutOfRange {
        field: String,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("workout too short: {seconds} s, minimum is 20 s")]
    WorkoutTooShort { seconds: u32 },

    #[error("workout time needs 1 to 3 components, got {components}")]
    InvalidTime { components: usize },

    #[error("split {value} outside of range [{min}, {max}]")]
    InvalidSplit { value: i64, min: i64, max: i64 },

    #[error("{field} must be a whole number")]
    NotWhole { field: String },

    #[error("incompatible workout goal: {0}")]
    IncompatibleGoal(String),

    #[error("invalid pace boat: {0}")]
    InvalidPaceBoat(String),
}

/// Error type spanning validation, transport faults, decoding, and manager
/// lifecycle failures.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RowError {
    #[error("Invalid workout: {0}")]
    Validation(#[from] ValidationError),

    #[error("Device {device} busy: {details}")]
    Busy { device: DeviceId, details: String },

    #[error("Device {device} disconnected: {details}")]
    Disconnected { device: DeviceId, details: String },

    #[error("Malformed response from {device}: {details}")]
    Decode { device: DeviceId, details: String },

    #[error("Cannot encode request for {device}: {details}")]
    Encode { device: DeviceId, details: String },

    /// The session was shut down before the request went out.
    #[error("Request to {device} cancelled")]
    Cancelled { device: DeviceId },

    #[error("Name {0} already exists")]
    NameConflict(String),

    #[error("Bus error: {0}")]
    Bus(String),

    #[error("Device manager is stopped")]
    ManagerStopped,

    #[error("Startup failed: {0}")]
    Startup(String),

    #[error("Channel error: {0}")]
    Channel(String),
}

impl RowError {
    /// The device is gone; its worker must terminate.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, RowError::Disconnected { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RowError::Cancelled { .. })
    }

    /// Worth retrying on the next scheduled cycle.
    pub fn is_transient(&self) -> bool {
        matches!(self, RowError::Busy { .. } | RowError::Decode { .. })
    }
}
