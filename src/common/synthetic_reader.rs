//! Closed-form reader
//!
//! Produces samples on a regular grid from one function per sensor. Sample
//! times are `k * interval`, so any two queries covering the same instant
//! return bit-identical samples regardless of where the query starts.

use crate::common::error::ReaderResult;
use crate::common::event::Event;
use crate::common::reader::{normalize_range, Reader};
use crate::common::sample::Sample;
use crate::common::sensor::Sensor;
use async_trait::async_trait;
use std::sync::Arc;

type SensorFn = Arc<dyn Fn(f64) -> f64 + Send + Sync>;
type EventFn = Arc<dyn Fn(f64, f64) -> Vec<Event> + Send + Sync>;

/// Filename reported by every synthetic reader
pub const SYNTHETIC_FILENAME: &str = "SYNTHETIC_READER";

pub struct SyntheticReader {
    interval: f64,
    sensors: Vec<SensorFn>,
    events: EventFn,
    length: f64,
}

impl SyntheticReader {
    pub fn builder() -> SyntheticReaderBuilder {
        SyntheticReaderBuilder::default()
    }
}

/// Builder for [`SyntheticReader`]
pub struct SyntheticReaderBuilder {
    interval: f64,
    sensors: Vec<SensorFn>,
    events: EventFn,
    length: f64,
}

impl Default for SyntheticReaderBuilder {
    fn default() -> Self {
        Self {
            interval: 0.2,
            sensors: Vec::new(),
            events: Arc::new(|_, _| Vec::new()),
            length: 10.0,
        }
    }
}

impl SyntheticReaderBuilder {
    /// Seconds between two samples
    pub fn interval(mut self, seconds: f64) -> Self {
        self.interval = seconds;
        self
    }

    /// Add a sensor whose value at time `t` is `f(t)`
    pub fn sensor(mut self, f: impl Fn(f64) -> f64 + Send + Sync + 'static) -> Self {
        self.sensors.push(Arc::new(f));
        self
    }

    /// Event source; called with the normalised query range
    pub fn events(mut self, f: impl Fn(f64, f64) -> Vec<Event> + Send + Sync + 'static) -> Self {
        self.events = Arc::new(f);
        self
    }

    pub fn length(mut self, seconds: f64) -> Self {
        self.length = seconds;
        self
    }

    pub fn build(self) -> SyntheticReader {
        SyntheticReader {
            interval: self.interval,
            sensors: self.sensors,
            events: self.events,
            length: self.length,
        }
    }
}

#[async_trait]
impl Reader for SyntheticReader {
    fn filename(&self) -> &str {
        SYNTHETIC_FILENAME
    }

    async fn sensors(&self) -> Vec<Sensor> {
        (0..self.sensors.len())
            .map(|i| Sensor::new(format!("SynthSens[{}]", i), "").sampling_interval(self.interval))
            .collect()
    }

    async fn samples(&self, begin: f64, end: f64) -> ReaderResult<Vec<Sample>> {
        let (begin, end) = normalize_range(begin, end, self.length);
        if self.interval <= 0.0 || begin > end {
            return Ok(Vec::new());
        }

        let mut k = (begin / self.interval).floor().max(0.0) as u64;
        while (k as f64) * self.interval < begin {
            k += 1;
        }

        let mut data = Vec::new();
        loop {
            let time = k as f64 * self.interval;
            if time > end {
                break;
            }
            data.push(Sample::new(time, self.sensors.iter().map(|f| f(time)).collect()));
            k += 1;
        }
        Ok(data)
    }

    async fn events(&self, begin: f64, end: f64) -> ReaderResult<Vec<Event>> {
        let (begin, end) = normalize_range(begin, end, self.length);
        let mut events: Vec<Event> = (self.events)(begin, end)
            .into_iter()
            .filter(|e| e.time >= begin && e.time <= end)
            .collect();
        events.sort_by(|a, b| a.time.total_cmp(&b.time));
        Ok(events)
    }

    async fn length(&self) -> f64 {
        self.length
    }
}

/// Three constant sensors (0.5, 1.5, 1.5) every 0.2 s over 10 s, with four
/// events, two of them sharing a timestamp
#[cfg(test)]
pub(crate) fn reference_reader() -> SyntheticReader {
    use crate::common::event::EventLevel;

    SyntheticReader::builder()
        .interval(0.2)
        .sensor(|_| 0.5)
        .sensor(|_| 1.5)
        .sensor(|_| 1.5)
        .events(|_, _| {
            vec![
                Event::new(3.0, Event::DEVICE, EventLevel::Debug, "MSG:TEST1E1").raw_data(b"TEST1E1".to_vec()),
                Event::new(4.0, 2, EventLevel::Warning, "MSG:TEST1E2").raw_data(b"TEST1E2".to_vec()),
                Event::new(9.0, 0, EventLevel::Verbose, "MSG:TEST1E3").raw_data(b"TEST1E3".to_vec()),
                Event::new(9.0, 1, EventLevel::Error, "MSG:TEST1E4").raw_data(b"TEST1E4".to_vec()),
            ]
        })
        .length(10.0)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_grid_times_are_query_independent() {
        let reader = reference_reader();
        let full = reader.samples(0.0, -1.0).await.unwrap();
        let tail = reader.samples(5.0, 7.0).await.unwrap();

        assert_eq!(full.len(), 51);
        let offset = full.iter().position(|s| s.time >= 5.0).unwrap();
        assert_eq!(&full[offset..offset + tail.len()], tail.as_slice());
    }

    #[tokio::test]
    async fn test_values_match_sensor_count() {
        let reader = reference_reader();
        let sensors = reader.sensors().await;
        let data = reader.samples(0.0, -1.0).await.unwrap();

        assert_eq!(sensors.len(), 3);
        assert_eq!(sensors[1].name, "SynthSens[1]");
        assert!(data.iter().all(|s| s.values == vec![0.5, 1.5, 1.5]));
        assert!(data.windows(2).all(|w| w[0].time < w[1].time));
    }

    #[tokio::test]
    async fn test_events_are_range_filtered() {
        let reader = reference_reader();

        assert_eq!(reader.events(0.0, -1.0).await.unwrap().len(), 4);
        let late = reader.events(8.5, 9.0).await.unwrap();
        assert_eq!(late.len(), 2);
        assert_eq!(late[0].origin, 0);
        assert_eq!(late[1].origin, 1);
    }

    #[tokio::test]
    async fn test_length_is_stable() {
        let reader = reference_reader();
        assert_eq!(reader.length().await, 10.0);
        assert_eq!(reader.length().await, reader.length().await);
    }
}
