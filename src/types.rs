use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};

/// Heating output state reported by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PowerState {
    /// Heating is running
    On,
    /// Heating is idle
    Off,
}

impl From<String> for PowerState {
    fn from(value: String) -> Self {
        if value.eq_ignore_ascii_case("on") {
            Self::On
        } else {
            Self::Off
        }
    }
}

impl From<PowerState> for String {
    fn from(value: PowerState) -> Self {
        value.to_string()
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::On => write!(f, "ON"),
            Self::Off => write!(f, "OFF"),
        }
    }
}

/// Snapshot of the thermostat as returned by `/getParams`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThermostatState {
    /// Current room temperature
    #[serde(rename = "temp")]
    pub temperature: f32,
    /// Lower bound of the hysteresis band
    #[serde(rename = "minTemp")]
    pub min_temp: f32,
    /// Upper bound of the hysteresis band
    #[serde(rename = "maxTemp")]
    pub max_temp: f32,
    /// Heating output state
    #[serde(rename = "state", alias = "power")]
    pub power: PowerState,
}

impl ThermostatState {
    /// Create a new state snapshot
    #[must_use]
    pub const fn new(temperature: f32, min_temp: f32, max_temp: f32, power: PowerState) -> Self {
        Self {
            temperature,
            min_temp,
            max_temp,
            power,
        }
    }
}

/// Partial update of the thermostat band
///
/// Absent fields are left unchanged on the device and are omitted from the
/// request body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterUpdate {
    /// New lower bound
    #[serde(rename = "minTemp", skip_serializing_if = "Option::is_none", default)]
    pub min_temp: Option<f32>,
    /// New upper bound
    #[serde(rename = "maxTemp", skip_serializing_if = "Option::is_none", default)]
    pub max_temp: Option<f32>,
}

impl ParameterUpdate {
    /// Create an update from optional bounds
    #[must_use]
    pub const fn new(min_temp: Option<f32>, max_temp: Option<f32>) -> Self {
        Self { min_temp, max_temp }
    }

    /// Set the lower bound
    #[must_use]
    pub const fn with_min(mut self, value: f32) -> Self {
        self.min_temp = Some(value);
        self
    }

    /// Set the upper bound
    #[must_use]
    pub const fn with_max(mut self, value: f32) -> Self {
        self.max_temp = Some(value);
        self
    }

    /// True when the update would change nothing
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.min_temp.is_none() && self.max_temp.is_none()
    }
}

/// One sample of the temperature history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemperaturePoint {
    /// Measured temperature
    pub value: f32,
    /// Time of day of the sample
    #[serde(rename = "time", alias = "timestamp")]
    pub timestamp: String,
    /// Calendar date of the sample
    pub date: String,
}

/// One heating on/off period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatePoint {
    /// Length of the period in seconds
    pub duration: f32,
    /// Whether heating was on during the period
    #[serde(default)]
    pub state: bool,
    /// Time of day the period was recorded
    #[serde(rename = "time", alias = "timestamp")]
    pub timestamp: String,
    /// Calendar date the period was recorded
    pub date: String,
}

/// Wire wrapper around every decoded payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope<T> {
    /// Status reported inside the body
    pub status: i32,
    /// Payload
    pub data: T,
}

/// Row returned by `/temperature/getAverage`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AverageTemp {
    /// Mean temperature over the range
    #[serde(rename = "averageTemp")]
    pub average_temp: f32,
}

/// Row returned by `/state/getAverage`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AverageState {
    /// Mean on-period length in seconds
    #[serde(rename = "averageOnTime")]
    pub average_on_time: f32,
}

/// Optional date bounds for history queries
///
/// Bounds are passed through verbatim: either `yyyy-MM-dd` dates or a
/// relative span understood by the controller such as `24h`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DateRange {
    /// Inclusive start bound
    pub start: Option<String>,
    /// Inclusive end bound
    pub end: Option<String>,
}

impl DateRange {
    /// Range with both bounds
    #[must_use]
    pub fn between(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: Some(start.into()),
            end: Some(end.into()),
        }
    }

    /// Range open towards the present
    #[must_use]
    pub fn since(start: impl Into<String>) -> Self {
        Self {
            start: Some(start.into()),
            end: None,
        }
    }

    /// The last 24 hours
    #[must_use]
    pub fn last_day() -> Self {
        Self::since("24h")
    }

    /// Query pairs for the bounds that are present and non-empty
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        [("startDate", &self.start), ("endDate", &self.end)]
            .into_iter()
            .filter_map(|(key, value)| {
                value
                    .as_deref()
                    .filter(|v| !v.is_empty())
                    .map(|v| (key, v.to_string()))
            })
            .collect()
    }
}

/// Which heating periods to list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateFilter {
    /// Periods with heating on
    On,
    /// Periods with heating off
    Off,
}

impl fmt::Display for StateFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::On => write!(f, "on"),
            Self::Off => write!(f, "off"),
        }
    }
}

/// Value published by the polling loop on every iteration
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PollUpdate {
    /// Fresh state from the controller
    State(ThermostatState),
    /// The controller could not be reached or returned no usable data
    NoConnection,
}

/// Request deadlines
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Deadline for a single API request in milliseconds
    pub request_timeout_ms: u64,
    /// Deadline for the login exchange in milliseconds
    pub auth_timeout_ms: u64,
}

impl TimeoutConfig {
    /// Request deadline as a duration
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Login deadline as a duration
    #[must_use]
    pub const fn auth_timeout(&self) -> Duration {
        Duration::from_millis(self.auth_timeout_ms)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 1_000,
            auth_timeout_ms: 1_000,
        }
    }
}

/// Polling cadence
#[derive(Debug, Clone)]
pub struct PollingConfig {
    /// Pause after a successful poll in milliseconds
    pub success_interval_ms: u64,
    /// Pause after a poll that produced no data in milliseconds
    pub no_data_interval_ms: u64,
}

impl PollingConfig {
    /// Pause after a successful poll
    #[must_use]
    pub const fn success_interval(&self) -> Duration {
        Duration::from_millis(self.success_interval_ms)
    }

    /// Pause after a poll that produced no data
    #[must_use]
    pub const fn no_data_interval(&self) -> Duration {
        Duration::from_millis(self.no_data_interval_ms)
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            success_interval_ms: 1_000,
            no_data_interval_ms: 5_000,
        }
    }
}
