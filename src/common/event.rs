//! Discrete, timestamped markers recorded next to the periodic samples

use serde::{Deserialize, Serialize};

/// Severity of an event
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Verbose,
    Debug,
    Warning,
    Error,
}

impl EventLevel {
    /// Numeric code used by the on-disk formats
    pub fn code(&self) -> i64 {
        match self {
            EventLevel::Verbose => 0,
            EventLevel::Debug => 1,
            EventLevel::Warning => 2,
            EventLevel::Error => 3,
        }
    }

    /// Inverse of [`EventLevel::code`]
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(EventLevel::Verbose),
            1 => Some(EventLevel::Debug),
            2 => Some(EventLevel::Warning),
            3 => Some(EventLevel::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventLevel::Verbose => write!(f, "verbose"),
            EventLevel::Debug => write!(f, "debug"),
            EventLevel::Warning => write!(f, "warning"),
            EventLevel::Error => write!(f, "error"),
        }
    }
}

/// A log line, trigger or threshold crossing at a point in time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    /// Seconds since the start of the recording
    pub time: f64,
    /// Index of the originating sensor, or -1 for the whole device
    pub origin: i64,
    pub message: String,
    pub level: EventLevel,
    /// Instrument-specific payload
    #[serde(default)]
    pub raw_data: Vec<u8>,
}

impl Event {
    /// Origin value for events that concern the whole device
    pub const DEVICE: i64 = -1;

    pub fn new(time: f64, origin: i64, level: EventLevel, message: impl Into<String>) -> Self {
        Self {
            time,
            origin,
            message: message.into(),
            level,
            raw_data: Vec::new(),
        }
    }

    /// Builder method: attach a raw payload
    pub fn raw_data(mut self, raw_data: impl Into<Vec<u8>>) -> Self {
        self.raw_data = raw_data.into();
        self
    }

    /// Whether the event concerns the whole device rather than one sensor
    pub fn is_device_wide(&self) -> bool {
        self.origin < 0
    }
}
