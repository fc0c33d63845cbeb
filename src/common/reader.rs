//! Reader contract
//!
//! Every format exposes its data through [`Reader`]. A format only has to
//! answer raw range queries (`samples`, `events`), describe its sensors and
//! report its length; resolution-reduced queries, point sampling and the
//! statistics fallback are provided here once for all formats.
//!
//! # Resampling
//!
//! ```text
//! raw samples → bucket by (second, slot) → mean per bucket
//!             → fill gaps by linear interpolation → sort → clamp to [begin, end]
//! ```
//!
//! Each second is divided into `r` slots of `1/r` seconds. Empty buckets are
//! skipped; the gap filling afterwards inserts points at every whole step
//! between two consecutive bucket means.

use crate::common::error::ReaderResult;
use crate::common::event::Event;
use crate::common::sample::Sample;
use crate::common::sensor::Sensor;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Reader handle shared between decorators and consumers
pub type SharedReader = Arc<dyn Reader>;

/// Initial half-width of the point-sampling search window, in seconds
pub const INITIAL_EPSILON: f64 = 0.001;

/// Decimal places used when assigning samples to resolution slots
const SLOT_PRECISION: i32 = 6;

/// Descriptive statistics a reader can report per sensor
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum StatisticKind {
    Min,
    Max,
    Avg,
    Median,
    Variance,
}

impl StatisticKind {
    /// Get all kinds for iteration
    pub fn all() -> &'static [StatisticKind] {
        &[
            StatisticKind::Min,
            StatisticKind::Max,
            StatisticKind::Avg,
            StatisticKind::Median,
            StatisticKind::Variance,
        ]
    }
}

impl std::fmt::Display for StatisticKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatisticKind::Min => write!(f, "min"),
            StatisticKind::Max => write!(f, "max"),
            StatisticKind::Avg => write!(f, "avg"),
            StatisticKind::Median => write!(f, "median"),
            StatisticKind::Variance => write!(f, "variance"),
        }
    }
}

/// Uniform access to one recording.
///
/// All times are seconds. Range bounds are normalised, never rejected:
/// `begin` is clamped to `>= 0`, a negative `end` means "up to `length()`",
/// and `end` never exceeds `length()`. Raw range queries select the closed
/// interval `begin <= time <= end` and return items ordered by time. Every
/// returned sample carries exactly one value per sensor.
#[async_trait]
pub trait Reader: Send + Sync {
    /// Name of the backing file (e.g. `data.csv`)
    fn filename(&self) -> &str;

    /// Ordered sensor list; the order defines the index into `Sample::values`
    async fn sensors(&self) -> Vec<Sensor>;

    /// Raw, format-native samples in `[begin, end]`
    async fn samples(&self, begin: f64, end: f64) -> ReaderResult<Vec<Sample>>;

    /// Samples in `[begin, end]` reduced to `resolution` Hz
    async fn samples_at(&self, begin: f64, end: f64, resolution: i32) -> ReaderResult<Vec<Sample>> {
        resample_reader(self, begin, end, resolution).await
    }

    /// Value of every sensor at `time`, interpolated from the raw samples
    async fn sample(&self, time: f64) -> ReaderResult<Sample> {
        sample_at_time(self, time, None).await
    }

    /// Value of every sensor at `time`, interpolated from resampled data
    async fn sample_at(&self, time: f64, resolution: i32) -> ReaderResult<Sample> {
        sample_at_time(self, time, Some(resolution)).await
    }

    /// Events in `[begin, end]`
    async fn events(&self, begin: f64, end: f64) -> ReaderResult<Vec<Event>>;

    /// One optional value per sensor; absent when not known
    async fn statistic(&self, kind: StatisticKind) -> ReaderResult<Vec<Option<f64>>> {
        let _ = kind;
        Ok(vec![None; self.sensors().await.len()])
    }

    /// Timestamp of the last available sample, in seconds
    async fn length(&self) -> f64;
}

/// Normalise a query range against a reader length
pub fn normalize_range(begin: f64, end: f64, length: f64) -> (f64, f64) {
    let begin = begin.max(0.0);
    let end = if end < 0.0 { length } else { end };
    (begin, end.min(length))
}

/// Sub-slice of time-ordered `items` with `begin <= time <= end`
pub fn range_slice<T>(items: &[T], begin: f64, end: f64, time_of: impl Fn(&T) -> f64) -> &[T] {
    let first = items.partition_point(|item| time_of(item) < begin);
    let last = items.partition_point(|item| time_of(item) <= end);
    if last <= first {
        return &[];
    }
    &items[first..last]
}

fn round_to_precision(value: f64) -> f64 {
    let scale = 10f64.powi(SLOT_PRECISION);
    (value * scale).round() / scale
}

/// Default resolution query: fetch raw samples and resample them
pub async fn resample_reader<R: Reader + ?Sized>(
    reader: &R,
    begin: f64,
    end: f64,
    resolution: i32,
) -> ReaderResult<Vec<Sample>> {
    let (begin, end) = normalize_range(begin, end, reader.length().await);
    if begin > end {
        return Ok(Vec::new());
    }
    let raw = reader.samples(begin, end).await?;
    Ok(resample(raw, begin, end, resolution))
}

/// Reduce time-ordered raw samples to `resolution` Hz.
///
/// A `resolution` of 1 or less yields one sample per second.
pub fn resample(raw: Vec<Sample>, begin: f64, end: f64, resolution: i32) -> Vec<Sample> {
    let slots = resolution.max(1) as u64;
    let sample_length = 1.0 / slots as f64;
    let last_second = end.ceil();

    let mut buckets: BTreeMap<(u64, u64), Vec<Sample>> = BTreeMap::new();
    for sample in raw {
        if !sample.time.is_finite() || sample.time < 0.0 {
            continue;
        }
        let whole = sample.time.trunc();
        let mut second = whole as u64;
        let mut slot = round_to_precision((sample.time - whole) / sample_length).floor() as u64;
        if slot >= slots {
            second += 1;
            slot = 0;
        }
        if second as f64 >= last_second {
            continue;
        }
        buckets.entry((second, slot)).or_default().push(sample);
    }

    let means: Vec<Sample> = buckets
        .into_values()
        .filter_map(|mut bucket| {
            if bucket.len() == 1 {
                bucket.pop()
            } else {
                Sample::mean_of(&bucket)
            }
        })
        .collect();

    let mut result = fill_gaps(means, sample_length);
    result.sort_by(|a, b| a.time.total_cmp(&b.time));
    result.retain(|s| s.time >= begin && s.time <= end);
    result
}

/// Insert linearly interpolated samples at every whole step between
/// consecutive samples that are more than one step apart
fn fill_gaps(samples: Vec<Sample>, sample_length: f64) -> Vec<Sample> {
    let mut filled = Vec::new();
    for pair in samples.windows(2) {
        let (current, next) = (&pair[0], &pair[1]);
        let diff = next.subtract(current);
        let steps = round_to_precision(diff.time / sample_length);
        if steps <= 1.0 {
            continue;
        }
        let step = diff.scale(sample_length / diff.time);
        let mut j = 1.0;
        while j < steps {
            filled.push(current.add(&step.scale(j)));
            j += 1.0;
        }
    }
    if filled.is_empty() {
        return samples;
    }
    let mut result = samples;
    result.extend(filled);
    result
}

/// Point sampling through an adaptive window.
///
/// The window `time ± epsilon` doubles until it brackets `time` or reaches
/// the data boundary on the open side. An exact timestamp match is returned
/// unchanged; a bracketing pair is interpolated; anything else (before the
/// first or after the last sample, empty reader) yields `Sample::default()`.
pub async fn sample_at_time<R: Reader + ?Sized>(
    reader: &R,
    time: f64,
    resolution: Option<i32>,
) -> ReaderResult<Sample> {
    if !time.is_finite() {
        return Ok(Sample::default());
    }
    let length = reader.length().await;
    let mut epsilon = INITIAL_EPSILON;

    loop {
        let (begin, end) = (time - epsilon, time + epsilon);
        let data = match resolution {
            Some(r) => reader.samples_at(begin, end, r).await?,
            None => reader.samples(begin, end).await?,
        };

        if let Some(exact) = data.iter().find(|s| s.time == time) {
            return Ok(exact.clone());
        }

        let next = data.iter().position(|s| s.time > time);
        if let Some(index) = next {
            if index > 0 {
                return Ok(Sample::interpolate(&data[index - 1], &data[index], time));
            }
        }

        let has_prev = data.first().map_or(false, |s| s.time <= time);
        let left_done = begin <= 0.0 || has_prev;
        let right_done = end >= length || next.is_some();
        if left_done && right_done {
            return Ok(Sample::default());
        }
        epsilon *= 2.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::synthetic_reader::SyntheticReader;

    fn constant_reader(interval: f64, length: f64) -> SyntheticReader {
        SyntheticReader::builder()
            .interval(interval)
            .sensor(|_| 0.5)
            .sensor(|_| 1.5)
            .length(length)
            .build()
    }

    #[test]
    fn test_normalize_range() {
        assert_eq!(normalize_range(-3.0, -1.0, 10.0), (0.0, 10.0));
        assert_eq!(normalize_range(2.0, 50.0, 10.0), (2.0, 10.0));
        assert_eq!(normalize_range(2.0, 4.0, 10.0), (2.0, 4.0));
    }

    #[test]
    fn test_range_slice_is_closed() {
        let times = [0.0, 1.0, 2.0, 3.0];
        assert_eq!(range_slice(&times, 1.0, 2.0, |t| *t), &[1.0, 2.0]);
        assert_eq!(range_slice(&times, 2.5, 2.6, |t| *t), &[] as &[f64]);
        assert_eq!(range_slice(&times, 3.0, 1.0, |t| *t), &[] as &[f64]);
    }

    #[test]
    fn test_resample_averages_buckets() {
        let raw = vec![
            Sample::new(0.0, vec![1.0]),
            Sample::new(0.1, vec![3.0]),
            Sample::new(0.5, vec![5.0]),
            Sample::new(0.6, vec![7.0]),
        ];
        let out = resample(raw, 0.0, 1.0, 2);

        assert_eq!(out.len(), 2);
        assert!((out[0].time - 0.05).abs() < 1e-12);
        assert_eq!(out[0].values, vec![2.0]);
        assert!((out[1].time - 0.55).abs() < 1e-12);
        assert_eq!(out[1].values, vec![6.0]);
    }

    #[test]
    fn test_resample_fills_gaps() {
        let raw = vec![Sample::new(0.0, vec![0.0]), Sample::new(3.0, vec![3.0])];
        let out = resample(raw, 0.0, 3.5, 1);

        assert_eq!(out.len(), 4);
        for (index, sample) in out.iter().enumerate() {
            assert!((sample.time - index as f64).abs() < 1e-9);
            assert!((sample.values[0] - index as f64).abs() < 1e-9);
        }
    }

    #[test]
    fn test_resample_low_resolution_means_one_per_second() {
        let raw: Vec<Sample> = (0..20)
            .map(|k| Sample::new(k as f64 * 0.1, vec![k as f64]))
            .collect();
        let out = resample(raw, 0.0, 1.95, 0);

        assert_eq!(out.len(), 2);
        assert!((out[0].values[0] - 4.5).abs() < 1e-9);
        assert!((out[1].values[0] - 14.5).abs() < 1e-9);
    }

    #[test]
    fn test_resample_carries_rounded_up_slot() {
        // 0.99999999 rounds to slot 5 of 5; it belongs to the next second
        let raw = vec![Sample::new(0.99999999, vec![1.0]), Sample::new(1.0, vec![3.0])];
        let out = resample(raw, 0.0, 2.0, 5);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].values, vec![2.0]);
    }

    #[tokio::test]
    async fn test_resample_at_raw_rate_reproduces_raw_samples() {
        let reader = constant_reader(0.2, 9.9);

        let raw = reader.samples(0.0, 9.9).await.unwrap();
        let resampled = reader.samples_at(0.0, 9.9, 5).await.unwrap();

        assert_eq!(raw.len(), 50);
        assert_eq!(resampled, raw);
    }

    #[tokio::test]
    async fn test_resampled_output_is_ordered_and_bounded() {
        let reader = constant_reader(0.3, 10.0);
        let out = reader.samples_at(1.0, 6.5, 4).await.unwrap();

        assert!(!out.is_empty());
        assert!(out.windows(2).all(|w| w[0].time <= w[1].time));
        assert!(out.iter().all(|s| s.time >= 1.0 && s.time <= 6.5));
        assert!(out.iter().all(|s| s.values.len() == 2));
    }

    #[tokio::test]
    async fn test_sample_exact_match_is_unchanged() {
        let reader = constant_reader(0.2, 10.0);
        let raw = reader.samples(0.0, -1.0).await.unwrap();

        let picked = reader.sample(raw[7].time).await.unwrap();
        assert_eq!(picked, raw[7]);
    }

    #[tokio::test]
    async fn test_sample_interpolates_between_neighbours() {
        let reader = SyntheticReader::builder()
            .interval(1.0)
            .sensor(|t| 2.0 * t)
            .length(10.0)
            .build();

        let sample = reader.sample(3.25).await.unwrap();
        assert_eq!(sample.time, 3.25);
        assert!((sample.values[0] - 6.5).abs() < 1e-9);

        let sample = reader.sample_at(3.25, 1).await.unwrap();
        assert!((sample.values[0] - 6.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_sample_outside_data_is_sentinel() {
        let reader = constant_reader(1.0, 5.0);

        assert_eq!(reader.sample(7.5).await.unwrap(), Sample::default());
        assert_eq!(reader.sample(f64::NAN).await.unwrap(), Sample::default());
    }

    #[tokio::test]
    async fn test_default_statistic_is_absent() {
        let reader = constant_reader(1.0, 5.0);
        let stats = reader.statistic(StatisticKind::Median).await.unwrap();
        assert_eq!(stats, vec![None, None]);
    }
}
