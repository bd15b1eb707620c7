//! Small descriptive-statistics helpers shared by the analyses.

use serde::Serialize;

/// Linear-interpolation quantile of an ascending slice, `q` in `[0, 1]`.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

pub fn sorted_copy(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Standard deviation with `ddof` degrees of freedom removed (0 = population, 1 = sample).
pub fn std_dev(values: &[f64], ddof: usize) -> Option<f64> {
    if values.len() <= ddof {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some((ss / (values.len() - ddof) as f64).sqrt())
}

/// Percentile rank of `target` within `values`, ties sharing their average rank.
///
/// With `r` the 1-based average rank the result is `100 * (r - 1) / (n - 1)`, so the
/// maximum maps to 100 and the minimum to 0. Fewer than two values give 50.
pub fn percentile_rank(values: &[f64], target: f64) -> f64 {
    let n = values.len();
    if n < 2 {
        return 50.0;
    }
    let below = values.iter().filter(|v| **v < target).count() as f64;
    let equal = values.iter().filter(|v| **v == target).count() as f64;
    let rank = below + (equal + 1.0) / 2.0;
    (100.0 * (rank - 1.0) / (n as f64 - 1.0)).clamp(0.0, 100.0)
}

/// Mean, median, extremes and sample standard deviation of a series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Summary {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    /// Sample standard deviation; 0 for a single value.
    pub std: f64,
}

impl Summary {
    pub fn of(values: &[f64]) -> Option<Self> {
        let sorted = sorted_copy(values);
        Some(Self {
            count: values.len(),
            mean: mean(values)?,
            median: quantile_sorted(&sorted, 0.5)?,
            min: *sorted.first()?,
            max: *sorted.last()?,
            std: std_dev(values, 1).unwrap_or(0.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantile_interpolates_between_ranks() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile_sorted(&sorted, 0.0), Some(1.0));
        assert_eq!(quantile_sorted(&sorted, 1.0), Some(4.0));
        assert!((quantile_sorted(&sorted, 0.5).unwrap() - 2.5).abs() < 1e-12);
        assert!((quantile_sorted(&sorted, 0.1).unwrap() - 1.3).abs() < 1e-12);
        assert_eq!(quantile_sorted(&[], 0.5), None);
    }

    #[test]
    fn percentile_rank_ends_and_ties() {
        let values = [3.0, 1.0, 2.0, 2.0, 5.0];
        assert_eq!(percentile_rank(&values, 5.0), 100.0);
        assert_eq!(percentile_rank(&values, 1.0), 0.0);
        // The two 2.0s occupy ranks 2 and 3, so share rank 2.5.
        assert!((percentile_rank(&values, 2.0) - 37.5).abs() < 1e-12);
        assert_eq!(percentile_rank(&[7.0], 7.0), 50.0);
    }

    #[test]
    fn summary_uses_sample_std() {
        let s = Summary::of(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_eq!(s.median, 4.5);
        assert_eq!(s.min, 2.0);
        assert_eq!(s.max, 9.0);
        assert!((s.mean - 5.0).abs() < 1e-12);
        assert!((s.std - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
        assert!((std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0], 0).unwrap() - 2.0).abs() < 1e-12);
        assert!(Summary::of(&[]).is_none());
    }
}
