use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Descriptive statistics over a set of duration samples (milliseconds).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub min: f64,
    pub median: f64,
    pub mean: f64,
    pub max: f64,
    /// Population standard deviation. Informational only.
    pub stddev: f64,
}

/// Reduce `samples` to min/median/mean/max. Returns `None` for an empty slice.
///
/// The input is left untouched; the median is taken from a sorted copy.
pub fn summarize(samples: &[f64]) -> Option<Summary> {
    if samples.is_empty() {
        return None;
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    let n = sorted.len();
    let median = if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    };

    let min = sorted[0];
    let max = sorted[n - 1];
    // Rounding can push the mean a hair outside [min, max] for near-equal samples.
    let mean = (sorted.iter().sum::<f64>() / n as f64).clamp(min, max);
    let var = sorted.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64;

    Some(Summary {
        min,
        median,
        mean,
        max,
        stddev: var.sqrt(),
    })
}

/// Operations per second for a mean duration in milliseconds.
///
/// A zero mean (below clock resolution) yields `f64::INFINITY`.
pub fn ops_per_second(mean_ms: f64) -> f64 {
    if mean_ms <= 0.0 {
        f64::INFINITY
    } else {
        1000.0 / mean_ms
    }
}

/// Arithmetic mean, `None` when empty.
pub fn mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values
        .into_iter()
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(summarize(&[1.0, 2.0, 3.0]).unwrap().median, 2.0);
        assert_eq!(summarize(&[1.0, 2.0, 3.0, 4.0]).unwrap().median, 2.5);
        assert_eq!(summarize(&[4.0, 1.0, 3.0, 2.0]).unwrap().median, 2.5);
    }

    #[test]
    fn test_summary_fields() {
        let s = summarize(&[3.0, 1.0, 2.0]).unwrap();
        assert_eq!(s.min, 1.0);
        assert_eq!(s.max, 3.0);
        assert_eq!(s.mean, 2.0);
    }

    #[test]
    fn test_input_not_mutated() {
        let samples = vec![5.0, 1.0, 3.0];
        let _ = summarize(&samples);
        assert_eq!(samples, vec![5.0, 1.0, 3.0]);
    }

    #[test]
    fn test_empty_is_none() {
        assert!(summarize(&[]).is_none());
    }

    #[test]
    fn test_single_sample() {
        let s = summarize(&[0.25]).unwrap();
        assert_eq!((s.min, s.median, s.mean, s.max), (0.25, 0.25, 0.25, 0.25));
        assert_eq!(s.stddev, 0.0);
    }

    #[test]
    fn test_ops_per_second() {
        assert_eq!(ops_per_second(10.0), 100.0);
        assert_eq!(ops_per_second(0.5), 2000.0);
        assert!(ops_per_second(0.0).is_infinite());
    }

    #[test]
    fn test_mean_helper() {
        assert_eq!(mean([1.0, 2.0, 6.0]), Some(3.0));
        assert_eq!(mean(std::iter::empty()), None);
    }

    proptest! {
        #[test]
        fn prop_summary_ordering(samples in prop::collection::vec(0.0f64..1.0e6, 1..64)) {
            let s = summarize(&samples).unwrap();
            prop_assert!(s.min <= s.median && s.median <= s.max);
            prop_assert!(s.min <= s.mean && s.mean <= s.max);
            prop_assert!(s.stddev >= 0.0);
        }
    }
}
