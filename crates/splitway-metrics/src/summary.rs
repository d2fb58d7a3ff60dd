//! Streaming summary statistics.

use serde::{Deserialize, Serialize};

/// Running count, sum, extremes and sum of squares of a value stream.
///
/// Mean and variance are reconstructed from these five numbers without
/// keeping the samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SummaryStatistic {
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    pub sum_squares: f64,
}

impl Default for SummaryStatistic {
    fn default() -> Self {
        Self::empty()
    }
}

impl SummaryStatistic {
    pub const fn empty() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sum_squares: 0.0,
        }
    }

    pub fn add(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.sum_squares += value * value;
    }

    /// Fold another statistic into this one.
    pub fn merge(&mut self, other: &SummaryStatistic) {
        self.count += other.count;
        self.sum += other.sum;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.sum_squares += other.sum_squares;
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn mean(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        self.sum / self.count as f64
    }

    /// Population variance, clamped at zero against rounding.
    pub fn variance(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        let mean = self.mean();
        (self.sum_squares / self.count as f64 - mean * mean).max(0.0)
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// `[count, sum, min, max, sum_squares]` as stored by older snapshots.
    ///
    /// Empty extremes use the legacy sentinels `f64::MAX` and
    /// `f64::MIN_POSITIVE`, which stay representable in JSON.
    pub fn to_legacy_array(&self) -> [f64; 5] {
        let (min, max) = if self.is_empty() {
            (f64::MAX, f64::MIN_POSITIVE)
        } else {
            (self.min, self.max)
        };
        [self.count as f64, self.sum, min, max, self.sum_squares]
    }
}

impl FromIterator<f64> for SummaryStatistic {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut stat = SummaryStatistic::empty();
        for value in iter {
            stat.add(value);
        }
        stat
    }
}

/// Summary of one series, as shown on dashboards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummarizedMetric {
    pub count: u64,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

impl From<&SummaryStatistic> for SummarizedMetric {
    fn from(stat: &SummaryStatistic) -> Self {
        if stat.is_empty() {
            return SummarizedMetric::default();
        }
        SummarizedMetric {
            count: stat.count,
            mean: stat.mean(),
            std_dev: stat.std_dev(),
            min: stat.min,
            max: stat.max,
        }
    }
}

/// Summarize a series; an empty series yields all zeros.
pub fn summarize(values: &[f64]) -> SummarizedMetric {
    let stat: SummaryStatistic = values.iter().copied().collect();
    SummarizedMetric::from(&stat)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn add_tracks_all_fields() {
        let mut stat = SummaryStatistic::empty();
        for v in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            stat.add(v);
        }
        assert_eq!(stat.count, 8);
        assert!(approx(stat.sum, 40.0));
        assert_eq!(stat.min, 2.0);
        assert_eq!(stat.max, 9.0);
        assert!(approx(stat.sum_squares, 232.0));
        assert!(approx(stat.mean(), 5.0));
        assert!(approx(stat.variance(), 4.0));
        assert!(approx(stat.std_dev(), 2.0));
    }

    #[test]
    fn empty_statistic() {
        let stat = SummaryStatistic::default();
        assert!(stat.is_empty());
        assert_eq!(stat.mean(), 0.0);
        assert_eq!(stat.variance(), 0.0);
        assert_eq!(stat.min, f64::INFINITY);
        assert_eq!(stat.max, f64::NEG_INFINITY);
    }

    #[test]
    fn constant_series_has_zero_variance() {
        let stat: SummaryStatistic = std::iter::repeat_n(0.1, 1000).collect();
        assert!(stat.variance() >= 0.0);
        assert!(stat.std_dev() < 1e-6);
    }

    #[test]
    fn merge_matches_single_pass() {
        let mut left: SummaryStatistic = [1.0, 2.0, 3.0].into_iter().collect();
        let right: SummaryStatistic = [10.0, -4.0].into_iter().collect();
        left.merge(&right);
        let all: SummaryStatistic = [1.0, 2.0, 3.0, 10.0, -4.0].into_iter().collect();
        assert_eq!(left, all);
    }

    #[test]
    fn statistic_is_a_value() {
        let mut a: SummaryStatistic = [1.0].into_iter().collect();
        let b = a;
        a.add(100.0);
        assert_eq!(b.count, 1);
        assert_eq!(a.count, 2);
    }

    #[test]
    fn legacy_array_carries_sum_of_squares() {
        let stat: SummaryStatistic = [3.0, 4.0].into_iter().collect();
        assert_eq!(stat.to_legacy_array(), [2.0, 7.0, 3.0, 4.0, 25.0]);
        assert_eq!(
            SummaryStatistic::empty().to_legacy_array(),
            [0.0, 0.0, f64::MAX, f64::MIN_POSITIVE, 0.0]
        );
    }

    #[test]
    fn summarize_values() {
        let s = summarize(&[10.0, 20.0, 30.0]);
        assert_eq!(s.count, 3);
        assert!(approx(s.mean, 20.0));
        assert!(approx(s.std_dev, (200.0f64 / 3.0).sqrt()));
        assert_eq!(s.min, 10.0);
        assert_eq!(s.max, 30.0);
    }

    #[test]
    fn summarize_empty_is_zero() {
        assert_eq!(summarize(&[]), SummarizedMetric::default());
    }

    #[test]
    fn summarized_metric_json_fields() {
        let json = serde_json::to_value(summarize(&[1.0])).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"count": 1, "mean": 1.0, "stdDev": 0.0, "min": 1.0, "max": 1.0})
        );
    }
}
