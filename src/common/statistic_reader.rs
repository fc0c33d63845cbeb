//! Statistics decorator
//!
//! Scans the full raw dataset once at construction and derives min, max,
//! mean, median and variance per sensor. Each sensor is reduced on its own
//! blocking task. Every other query is passed through to the inner reader.

use crate::common::error::ReaderResult;
use crate::common::event::Event;
use crate::common::reader::{Reader, SharedReader, StatisticKind};
use crate::common::sample::Sample;
use crate::common::sensor::Sensor;
use async_trait::async_trait;
use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;

/// Descriptive statistics of one sensor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorStatistics {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg: Option<f64>,
    pub median: Option<f64>,
    pub variance: Option<f64>,
}

impl SensorStatistics {
    /// Reduce one sensor's values. Results that are zero, subnormal, infinite
    /// or NaN are reported as absent.
    pub fn from_values(mut values: Vec<f64>) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        values.sort_by(|a, b| a.total_cmp(b));

        let count = values.len();
        let min = values[0];
        let max = values[count - 1];
        let avg = values.iter().sum::<f64>() / count as f64;
        let median = if count % 2 == 0 {
            (values[count / 2 - 1] + values[count / 2]) / 2.0
        } else {
            values[count / 2]
        };
        let variance = values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / count as f64;

        Self {
            min: normal(min),
            max: normal(max),
            avg: normal(avg),
            median: normal(median),
            variance: normal(variance),
        }
    }

    pub fn get(&self, kind: StatisticKind) -> Option<f64> {
        match kind {
            StatisticKind::Min => self.min,
            StatisticKind::Max => self.max,
            StatisticKind::Avg => self.avg,
            StatisticKind::Median => self.median,
            StatisticKind::Variance => self.variance,
        }
    }
}

fn normal(value: f64) -> Option<f64> {
    value.is_normal().then_some(value)
}

/// Reader decorator with precomputed per-sensor statistics
pub struct StatisticReader {
    inner: SharedReader,
    statistics: HashMap<StatisticKind, Vec<Option<f64>>>,
}

impl StatisticReader {
    /// Wrap `inner`, scanning its whole dataset
    pub async fn new(inner: SharedReader) -> ReaderResult<Self> {
        let sensor_count = inner.sensors().await.len();
        let data = Arc::new(inner.samples(0.0, -1.0).await?);

        let handles: Vec<_> = (0..sensor_count)
            .map(|index| {
                let data = Arc::clone(&data);
                tokio::task::spawn_blocking(move || {
                    let values = data
                        .iter()
                        .filter_map(|s: &Sample| s.values.get(index).copied())
                        .collect();
                    SensorStatistics::from_values(values)
                })
            })
            .collect();

        let mut per_sensor = Vec::with_capacity(sensor_count);
        for joined in join_all(handles).await {
            per_sensor.push(joined?);
        }

        let statistics = StatisticKind::all()
            .iter()
            .map(|&kind| (kind, per_sensor.iter().map(|s| s.get(kind)).collect()))
            .collect();

        tracing::debug!(
            filename = inner.filename(),
            sensors = sensor_count,
            samples = data.len(),
            "Computed statistics"
        );

        Ok(Self { inner, statistics })
    }

    /// The wrapped reader
    pub fn inner(&self) -> &SharedReader {
        &self.inner
    }
}

#[async_trait]
impl Reader for StatisticReader {
    fn filename(&self) -> &str {
        self.inner.filename()
    }

    async fn sensors(&self) -> Vec<Sensor> {
        self.inner.sensors().await
    }

    async fn samples(&self, begin: f64, end: f64) -> ReaderResult<Vec<Sample>> {
        self.inner.samples(begin, end).await
    }

    async fn samples_at(&self, begin: f64, end: f64, resolution: i32) -> ReaderResult<Vec<Sample>> {
        self.inner.samples_at(begin, end, resolution).await
    }

    async fn sample(&self, time: f64) -> ReaderResult<Sample> {
        self.inner.sample(time).await
    }

    async fn sample_at(&self, time: f64, resolution: i32) -> ReaderResult<Sample> {
        self.inner.sample_at(time, resolution).await
    }

    async fn events(&self, begin: f64, end: f64) -> ReaderResult<Vec<Event>> {
        self.inner.events(begin, end).await
    }

    /// The inner reader's values when it knows all of them, otherwise the
    /// precomputed ones
    async fn statistic(&self, kind: StatisticKind) -> ReaderResult<Vec<Option<f64>>> {
        let native = self.inner.statistic(kind).await?;
        if !native.is_empty() && native.iter().all(Option::is_some) {
            return Ok(native);
        }
        Ok(self.statistics.get(&kind).cloned().unwrap_or_default())
    }

    async fn length(&self) -> f64 {
        self.inner.length().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::synthetic_reader::{reference_reader, SyntheticReader};

    /// Reader that reports its own statistics
    struct NativeStatistics(SyntheticReader);

    #[async_trait]
    impl Reader for NativeStatistics {
        fn filename(&self) -> &str {
            self.0.filename()
        }
        async fn sensors(&self) -> Vec<Sensor> {
            self.0.sensors().await
        }
        async fn samples(&self, begin: f64, end: f64) -> ReaderResult<Vec<Sample>> {
            self.0.samples(begin, end).await
        }
        async fn events(&self, begin: f64, end: f64) -> ReaderResult<Vec<Event>> {
            self.0.events(begin, end).await
        }
        async fn statistic(&self, _kind: StatisticKind) -> ReaderResult<Vec<Option<f64>>> {
            Ok(vec![Some(42.0)])
        }
        async fn length(&self) -> f64 {
            self.0.length().await
        }
    }

    #[test]
    fn test_from_values() {
        let stats = SensorStatistics::from_values(vec![4.0, 1.0, 3.0, 2.0]);

        assert_eq!(stats.min, Some(1.0));
        assert_eq!(stats.max, Some(4.0));
        assert_eq!(stats.avg, Some(2.5));
        assert_eq!(stats.median, Some(2.5));
        assert_eq!(stats.variance, Some(1.25));
    }

    #[test]
    fn test_odd_count_median_and_absent_values() {
        let stats = SensorStatistics::from_values(vec![-1.0, 0.0, 1.0]);

        assert_eq!(stats.min, Some(-1.0));
        assert_eq!(stats.median, None);
        assert_eq!(stats.avg, None);
        assert_eq!(SensorStatistics::from_values(Vec::new()), SensorStatistics::default());
    }

    #[tokio::test]
    async fn test_statistics_of_reference_reader() {
        let reader = StatisticReader::new(Arc::new(reference_reader())).await.unwrap();

        assert_eq!(
            reader.statistic(StatisticKind::Avg).await.unwrap(),
            vec![Some(0.5), Some(1.5), Some(1.5)]
        );
        assert_eq!(
            reader.statistic(StatisticKind::Max).await.unwrap(),
            vec![Some(0.5), Some(1.5), Some(1.5)]
        );
        // constant data has zero variance, which is not a normal number
        assert_eq!(
            reader.statistic(StatisticKind::Variance).await.unwrap(),
            vec![None, None, None]
        );
    }

    #[tokio::test]
    async fn test_ramp_statistics() {
        let inner = SyntheticReader::builder()
            .interval(1.0)
            .sensor(|t| t + 1.0)
            .length(3.0)
            .build();
        let reader = StatisticReader::new(Arc::new(inner)).await.unwrap();

        assert_eq!(reader.statistic(StatisticKind::Min).await.unwrap(), vec![Some(1.0)]);
        assert_eq!(reader.statistic(StatisticKind::Median).await.unwrap(), vec![Some(2.5)]);
        assert_eq!(reader.statistic(StatisticKind::Variance).await.unwrap(), vec![Some(1.25)]);
    }

    #[tokio::test]
    async fn test_prefers_complete_native_statistics() {
        let inner = SyntheticReader::builder().sensor(|_| 7.0).build();
        let reader = StatisticReader::new(Arc::new(NativeStatistics(inner))).await.unwrap();

        assert_eq!(reader.statistic(StatisticKind::Min).await.unwrap(), vec![Some(42.0)]);
    }

    #[tokio::test]
    async fn test_empty_dataset_reports_absent() {
        let inner = SyntheticReader::builder()
            .sensor(|_| 1.0)
            .sensor(|_| 2.0)
            .interval(0.0)
            .build();
        let reader = StatisticReader::new(Arc::new(inner)).await.unwrap();

        assert_eq!(reader.statistic(StatisticKind::Avg).await.unwrap(), vec![None, None]);
    }

    #[tokio::test]
    async fn test_queries_pass_through() {
        let inner: SharedReader = Arc::new(reference_reader());
        let reader = StatisticReader::new(Arc::clone(&inner)).await.unwrap();

        assert_eq!(reader.samples(1.0, 2.0).await.unwrap(), inner.samples(1.0, 2.0).await.unwrap());
        assert_eq!(reader.events(0.0, -1.0).await.unwrap().len(), 4);
        assert_eq!(reader.length().await, 10.0);
    }
}
