use crate::error::AnalyticsError;
use crate::stats::{quantile_sorted, sorted_copy};
use core_types::MarketState;
use serde::Serialize;

/// Percentiles of the return history that bound the six states.
pub const THRESHOLD_QUANTILES: [f64; 5] = [0.10, 0.25, 0.50, 0.75, 0.90];

/// Five ascending return boundaries separating the six market states.
///
/// The middle boundary is always exactly 0.0, so the lower three states are the
/// non-positive returns and the upper three the positive ones. The two lower
/// boundaries are clamped to at most 0 and the two upper ones to at least 0 to
/// keep that split intact on heavily one-sided histories.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StateThresholds {
    bounds: [f64; 5],
}

impl StateThresholds {
    /// Derives thresholds from the entire return history.
    pub fn from_returns(returns: &[f64]) -> Result<Self, AnalyticsError> {
        if returns.is_empty() {
            return Err(AnalyticsError::NotEnoughData(
                "cannot derive state thresholds from an empty history".to_string(),
            ));
        }
        if let Some(pos) = returns.iter().position(|r| !r.is_finite()) {
            return Err(AnalyticsError::NonFiniteInput(format!("return #{} is {}", pos, returns[pos])));
        }

        let sorted = sorted_copy(returns);
        let mut bounds = [0.0; 5];
        for (bound, q) in bounds.iter_mut().zip(THRESHOLD_QUANTILES) {
            // Non-empty input, so the quantile always exists.
            *bound = quantile_sorted(&sorted, q).unwrap_or(0.0);
        }
        Ok(Self::from_bounds(bounds))
    }

    /// Builds thresholds from explicit boundaries, pinning the middle one to zero.
    pub fn from_bounds(mut bounds: [f64; 5]) -> Self {
        bounds[0] = bounds[0].min(0.0);
        bounds[1] = bounds[1].min(0.0);
        bounds[2] = 0.0;
        bounds[3] = bounds[3].max(0.0);
        bounds[4] = bounds[4].max(0.0);
        Self { bounds }
    }

    pub fn bounds(&self) -> [f64; 5] {
        self.bounds
    }

    /// Maps a return onto its state: the first boundary it does not exceed.
    pub fn state_of(&self, ret: f64) -> MarketState {
        let idx = self.bounds.iter().position(|b| ret <= *b).unwrap_or(MarketState::ALL.len() - 1);
        MarketState::ALL[idx]
    }

    /// Maps every return, rejecting non-finite values.
    pub fn states_of(&self, returns: &[f64]) -> Result<Vec<MarketState>, AnalyticsError> {
        returns
            .iter()
            .enumerate()
            .map(|(i, r)| {
                if r.is_finite() {
                    Ok(self.state_of(*r))
                } else {
                    Err(AnalyticsError::NonFiniteInput(format!("return #{} is {}", i, r)))
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_returns() -> Vec<f64> {
        (0..200).map(|i| ((i * 37) % 101) as f64 / 10.0 - 5.0).collect()
    }

    #[test]
    fn middle_threshold_is_zero() {
        let t = StateThresholds::from_returns(&sample_returns()).unwrap();
        assert_eq!(t.bounds()[2], 0.0);
        let skewed: Vec<f64> = (1..50).map(|i| i as f64).collect();
        assert_eq!(StateThresholds::from_returns(&skewed).unwrap().bounds()[2], 0.0);
    }

    #[test]
    fn boundaries_map_to_lower_state() {
        let t = StateThresholds::from_bounds([-2.0, -1.0, 0.3, 1.0, 2.0]);
        assert_eq!(t.state_of(-2.0), MarketState::BigDown);
        assert_eq!(t.state_of(-1.5), MarketState::MidDown);
        assert_eq!(t.state_of(0.0), MarketState::SmallDown);
        assert_eq!(t.state_of(0.01), MarketState::SmallUp);
        assert_eq!(t.state_of(2.0), MarketState::MidUp);
        assert_eq!(t.state_of(2.01), MarketState::BigUp);
    }

    #[test]
    fn state_of_is_monotone() {
        let t = StateThresholds::from_returns(&sample_returns()).unwrap();
        let mut prev = MarketState::BigDown;
        for i in -100..=100 {
            let s = t.state_of(i as f64 / 10.0);
            assert!(s >= prev);
            prev = s;
        }
    }

    #[test]
    fn sign_split_survives_one_sided_history() {
        let positives: Vec<f64> = (1..=40).map(|i| i as f64 / 10.0).collect();
        let t = StateThresholds::from_returns(&positives).unwrap();
        for r in &positives {
            assert!(t.state_of(*r).is_up());
        }
        assert!(!t.state_of(-0.5).is_up());
    }

    #[test]
    fn rejects_empty_and_non_finite() {
        assert!(matches!(StateThresholds::from_returns(&[]), Err(AnalyticsError::NotEnoughData(_))));
        assert!(matches!(
            StateThresholds::from_returns(&[1.0, f64::NAN]),
            Err(AnalyticsError::NonFiniteInput(_))
        ));
        let t = StateThresholds::from_bounds([-2.0, -1.0, 0.0, 1.0, 2.0]);
        assert!(t.states_of(&[0.5, f64::INFINITY]).is_err());
    }
}
