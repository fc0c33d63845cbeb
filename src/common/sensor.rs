//! Static description of one data channel

use serde::{Deserialize, Serialize};

/// Metadata of a sensor; its position in the reader's sensor list is the
/// index used in `Sample::values`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sensor {
    /// Human-readable name (e.g., "Voltage", "SynthSens[0]")
    pub name: String,
    /// Unit of measurement (e.g., "V", "A", "W")
    pub unit: String,
    /// Seconds between two samples, or -1 if unknown or irregular
    pub sampling_interval: f64,
    /// Hardware channel number
    #[serde(default)]
    pub channel: i32,
    /// Recording date as reported by the instrument
    #[serde(default)]
    pub date: String,
    /// Instrument or firmware version
    #[serde(default)]
    pub version: String,
}

impl Default for Sensor {
    fn default() -> Self {
        Self {
            name: String::new(),
            unit: String::new(),
            sampling_interval: Sensor::UNKNOWN_INTERVAL,
            channel: 0,
            date: String::new(),
            version: String::new(),
        }
    }
}

impl Sensor {
    /// Marker for an unknown or irregular sampling interval
    pub const UNKNOWN_INTERVAL: f64 = -1.0;

    pub fn new(name: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
            ..Default::default()
        }
    }

    /// Builder: set sampling interval in seconds
    pub fn sampling_interval(mut self, seconds: f64) -> Self {
        self.sampling_interval = seconds;
        self
    }

    /// Builder: set hardware channel
    pub fn channel(mut self, channel: i32) -> Self {
        self.channel = channel;
        self
    }

    /// Builder: set date and version metadata
    pub fn metadata(mut self, date: impl Into<String>, version: impl Into<String>) -> Self {
        self.date = date.into();
        self.version = version.into();
        self
    }

    /// Sampling rate in Hz if the interval is known
    pub fn sampling_rate(&self) -> Option<f64> {
        (self.sampling_interval > 0.0).then(|| 1.0 / self.sampling_interval)
    }
}

impl std::fmt::Display for Sensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensor_defaults() {
        let sensor = Sensor::new("Voltage", "V");
        assert_eq!(sensor.sampling_interval, Sensor::UNKNOWN_INTERVAL);
        assert_eq!(sensor.sampling_rate(), None);
        assert_eq!(sensor.to_string(), "Voltage (V)");
    }

    #[test]
    fn test_sensor_builder() {
        let sensor = Sensor::new("Current", "A")
            .sampling_interval(0.2)
            .channel(2)
            .metadata("2017-03-01", "1.4");

        assert_eq!(sensor.channel, 2);
        assert_eq!(sensor.sampling_rate(), Some(5.0));
        assert_eq!(sensor.version, "1.4");
    }
}
