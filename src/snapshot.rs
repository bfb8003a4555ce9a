//! Immutable, weighted view of a reservoir's samples.

use crate::error::{MetricsError, Result};

/// A recorded value and its forward-decay weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedSample {
    pub value: f64,
    pub weight: f64,
}

impl WeightedSample {
    pub fn new(value: f64, weight: f64) -> Self {
        Self { value, weight }
    }
}

/// Samples sorted by value, with weights normalized to sum to 1.
///
/// `cumulative[i]` is the total normalized weight of the samples before `i`,
/// so `cumulative[0] == 0`.
#[derive(Debug, Clone, Default)]
pub struct WeightedSnapshot {
    values: Vec<f64>,
    norm_weights: Vec<f64>,
    cumulative: Vec<f64>,
}

impl WeightedSnapshot {
    pub fn new(samples: impl IntoIterator<Item = WeightedSample>) -> Self {
        let mut samples: Vec<WeightedSample> = samples.into_iter().collect();
        samples.sort_by(|a, b| a.value.total_cmp(&b.value));

        let total: f64 = samples.iter().map(|s| s.weight).sum();
        let norm_weights: Vec<f64> = samples
            .iter()
            .map(|s| if total != 0.0 { s.weight / total } else { 0.0 })
            .collect();

        let mut cumulative = vec![0.0; samples.len()];
        for i in 1..samples.len() {
            cumulative[i] = cumulative[i - 1] + norm_weights[i - 1];
        }

        Self {
            values: samples.into_iter().map(|s| s.value).collect(),
            norm_weights,
            cumulative,
        }
    }

    /// Value at the boundary of `quantile` (in `[0, 1]`).
    ///
    /// Locates the left insertion point of `quantile` in the cumulative
    /// weights and returns the mean of the two values straddling it; no
    /// interpolation within a sample's weight is attempted.
    pub fn get_value(&self, quantile: f64) -> Result<f64> {
        if !(0.0..=1.0).contains(&quantile) {
            return Err(MetricsError::OutOfRange(quantile));
        }
        if self.values.is_empty() {
            return Ok(0.0);
        }

        let pos = self.cumulative.partition_point(|&c| c < quantile);
        if pos < 1 {
            return Ok(self.values[0]);
        }
        if pos >= self.values.len() {
            return Ok(self.values[self.values.len() - 1]);
        }
        Ok((self.values[pos] + self.values[pos - 1]) / 2.0)
    }

    /// Sample counts over `buckets` equal-width slices of `[min, max]`.
    ///
    /// The last bucket takes every remaining sample up to the maximum. When
    /// all samples share one value (or there are none) the range cannot be
    /// sliced and a single bucket is returned.
    pub fn get_distribution(&self, buckets: usize) -> Vec<u64> {
        let buckets = buckets.max(1);
        let (min, max) = (self.min(), self.max());
        let step = (max - min) / buckets as f64;

        let mut distribution = Vec::with_capacity(buckets);
        let mut below = 0;
        if step > 0.0 {
            for i in 1..buckets {
                let boundary = min + step * i as f64;
                let next = self.values.partition_point(|&v| v < boundary);
                distribution.push((next - below) as u64);
                below = next;
            }
        }
        distribution.push((self.values.len() - below) as u64);
        distribution
    }

    pub fn size(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn min(&self) -> f64 {
        self.values.first().copied().unwrap_or(0.0)
    }

    pub fn max(&self) -> f64 {
        self.values.last().copied().unwrap_or(0.0)
    }

    /// Weighted mean.
    pub fn mean(&self) -> f64 {
        self.values
            .iter()
            .zip(&self.norm_weights)
            .map(|(v, w)| v * w)
            .sum()
    }

    /// Weighted population standard deviation; 0 for fewer than two samples.
    pub fn stddev(&self) -> f64 {
        if self.values.len() <= 1 {
            return 0.0;
        }
        let mean = self.mean();
        let variance: f64 = self
            .values
            .iter()
            .zip(&self.norm_weights)
            .map(|(v, w)| {
                let diff = v - mean;
                w * diff * diff
            })
            .sum();
        variance.sqrt()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_weights() -> WeightedSnapshot {
        WeightedSnapshot::new((0..10).map(|i| WeightedSample::new(i as f64, i as f64)))
    }

    #[test]
    fn test_statistics_follow_weights() {
        let s = linear_weights();
        assert_eq!((s.min(), s.max(), s.size()), (0.0, 9.0, 10));
        assert!((s.mean() - 6.333).abs() < 0.001);
        assert!((s.stddev() - 2.211).abs() < 0.001);
    }

    #[test]
    fn test_get_value() {
        let s = linear_weights();
        assert_eq!(s.get_value(0.5).unwrap(), 7.5);
        assert_eq!(s.get_value(0.0).unwrap(), 0.0);
        assert_eq!(s.get_value(1.0).unwrap(), 9.0);
    }

    #[test]
    fn test_get_value_out_of_range() {
        let s = linear_weights();
        for q in [-1.0, 2.0, f64::NAN] {
            assert!(matches!(s.get_value(q), Err(MetricsError::OutOfRange(_))));
        }
        assert_eq!(
            s.get_value(-1.0).unwrap_err().to_string(),
            "argument -1 is not in [0..1]"
        );
    }

    #[test]
    fn test_distribution() {
        let s = linear_weights();
        assert_eq!(s.get_distribution(5), vec![2, 2, 2, 2, 2]);
        assert_eq!(s.get_distribution(1), vec![10]);
    }

    #[test]
    fn test_unsorted_input_is_sorted() {
        let s = WeightedSnapshot::new(
            [3.0, 1.0, 2.0].map(|v| WeightedSample::new(v, 1.0)),
        );
        assert_eq!(s.values(), &[1.0, 2.0, 3.0]);
        assert_eq!(s.get_value(0.5).unwrap(), 2.5);
    }

    #[test]
    fn test_empty_snapshot() {
        let s = WeightedSnapshot::new(Vec::new());
        assert!(s.is_empty());
        assert_eq!((s.min(), s.max(), s.mean(), s.stddev()), (0.0, 0.0, 0.0, 0.0));
        assert_eq!(s.get_value(0.5).unwrap(), 0.0);
        assert_eq!(s.get_distribution(10), vec![0]);
        assert!(s.get_value(2.0).is_err());
    }

    #[test]
    fn test_zero_total_weight() {
        let s = WeightedSnapshot::new([1.0, 2.0].map(|v| WeightedSample::new(v, 0.0)));
        assert_eq!(s.mean(), 0.0);
        assert_eq!(s.size(), 2);
    }

    #[test]
    fn test_single_value_distribution() {
        let s = WeightedSnapshot::new([4.0; 3].map(|v| WeightedSample::new(v, 1.0)));
        assert_eq!(s.get_distribution(10), vec![3]);
        assert_eq!(s.stddev(), 0.0);
    }
}
