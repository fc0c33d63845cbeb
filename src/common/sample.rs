//! Sample value type and the arithmetic used by resampling
//!
//! A `Sample` is one row of a reader: a timestamp in seconds plus one value per
//! sensor, index-aligned with the reader's sensor list. Arithmetic is applied
//! to the time and to every value alike, which is what bucket averaging and
//! linear interpolation need.

use serde::{Deserialize, Serialize};

/// One timestamped row of sensor values
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Sample {
    /// Seconds since the start of the recording
    pub time: f64,
    /// One value per sensor
    pub values: Vec<f64>,
}

impl Sample {
    /// Create a sample from a time and its values
    pub fn new(time: f64, values: Vec<f64>) -> Self {
        Self { time, values }
    }

    /// Elementwise sum.
    ///
    /// If `other` carries more values than `self`, the extra values are
    /// appended unchanged.
    pub fn add(&self, other: &Sample) -> Sample {
        let mut result = self.clone();
        result.time += other.time;
        for (value, rhs) in result.values.iter_mut().zip(&other.values) {
            *value += rhs;
        }
        pad_from(&mut result.values, &other.values);
        result
    }

    /// Elementwise difference.
    ///
    /// If `other` carries more values than `self`, the extra values are
    /// appended unchanged (not negated).
    pub fn subtract(&self, other: &Sample) -> Sample {
        let mut result = self.clone();
        result.time -= other.time;
        for (value, rhs) in result.values.iter_mut().zip(&other.values) {
            *value -= rhs;
        }
        pad_from(&mut result.values, &other.values);
        result
    }

    /// Add a scalar to the time and to every value
    pub fn offset(&self, scalar: f64) -> Sample {
        Sample {
            time: self.time + scalar,
            values: self.values.iter().map(|v| v + scalar).collect(),
        }
    }

    /// Multiply the time and every value by a factor
    pub fn scale(&self, factor: f64) -> Sample {
        Sample {
            time: self.time * factor,
            values: self.values.iter().map(|v| v * factor).collect(),
        }
    }

    /// Divide the time and every value by a divisor
    pub fn divide(&self, divisor: f64) -> Sample {
        Sample {
            time: self.time / divisor,
            values: self.values.iter().map(|v| v / divisor).collect(),
        }
    }

    /// Componentwise mean of a set of samples, time included.
    ///
    /// Returns `None` for an empty slice.
    pub fn mean_of(samples: &[Sample]) -> Option<Sample> {
        let (first, rest) = samples.split_first()?;
        let sum = rest.iter().fold(first.clone(), |acc, s| acc.add(s));
        Some(sum.divide(samples.len() as f64))
    }

    /// Linear interpolation between `prev` and `next` at `time`.
    ///
    /// The weight of each endpoint grows as `time` approaches it, so at
    /// `time == prev.time` the result equals `prev`.
    pub fn interpolate(prev: &Sample, next: &Sample, time: f64) -> Sample {
        let span = next.time - prev.time;
        if span == 0.0 {
            return Sample::new(time, prev.values.clone());
        }
        let frac = (time - prev.time) / span;
        let mut middle = prev.scale(1.0 - frac).add(&next.scale(frac));
        middle.time = time;
        middle
    }
}

fn pad_from(values: &mut Vec<f64>, other: &[f64]) {
    if other.len() > values.len() {
        let start = values.len();
        values.extend_from_slice(&other[start..]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_subtract() {
        let a = Sample::new(1.0, vec![1.0, 2.0]);
        let b = Sample::new(0.5, vec![0.5, 0.5]);

        assert_eq!(a.add(&b), Sample::new(1.5, vec![1.5, 2.5]));
        assert_eq!(a.subtract(&b), Sample::new(0.5, vec![0.5, 1.5]));
    }

    #[test]
    fn test_mismatched_lengths_pad_with_longer() {
        let short = Sample::new(1.0, vec![1.0]);
        let long = Sample::new(1.0, vec![1.0, 5.0, 7.0]);

        assert_eq!(short.add(&long).values, vec![2.0, 5.0, 7.0]);
        // Extra values are copied, not negated
        assert_eq!(short.subtract(&long).values, vec![0.0, 5.0, 7.0]);
        // The longer side keeps its own tail
        assert_eq!(long.add(&short).values, vec![2.0, 5.0, 7.0]);
    }

    #[test]
    fn test_scalar_ops() {
        let s = Sample::new(2.0, vec![4.0, -2.0]);

        assert_eq!(s.scale(0.5), Sample::new(1.0, vec![2.0, -1.0]));
        assert_eq!(s.divide(2.0), Sample::new(1.0, vec![2.0, -1.0]));
        assert_eq!(s.offset(1.0), Sample::new(3.0, vec![5.0, -1.0]));
    }

    #[test]
    fn test_mean_of() {
        let samples = vec![
            Sample::new(0.0, vec![1.0, 10.0]),
            Sample::new(0.1, vec![3.0, 20.0]),
        ];
        let mean = Sample::mean_of(&samples).unwrap();

        assert!((mean.time - 0.05).abs() < 1e-12);
        assert_eq!(mean.values, vec![2.0, 15.0]);
        assert!(Sample::mean_of(&[]).is_none());
    }

    #[test]
    fn test_interpolate_weights_nearer_endpoint() {
        let prev = Sample::new(1.0, vec![0.0]);
        let next = Sample::new(2.0, vec![10.0]);

        assert_eq!(Sample::interpolate(&prev, &next, 1.0).values, vec![0.0]);
        assert_eq!(Sample::interpolate(&prev, &next, 1.25).values, vec![2.5]);
        assert_eq!(Sample::interpolate(&prev, &next, 1.25).time, 1.25);
    }

    #[test]
    fn test_equality_is_exact() {
        let a = Sample::new(1.0, vec![1.0]);
        assert_ne!(a, Sample::new(1.0, vec![1.0, 0.0]));
        assert_ne!(a, Sample::new(1.0 + 1e-15, vec![1.0]));
    }
}
