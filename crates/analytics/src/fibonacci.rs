use crate::error::AnalyticsError;
use core_types::Trend;
use serde::Serialize;

pub const DEFAULT_RATIOS: [f64; 5] = [0.236, 0.382, 0.5, 0.618, 0.786];

/// A single price level labelled by its ratio of the swing range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FibonacciLevel {
    pub ratio: f64,
    pub price: f64,
}

impl FibonacciLevel {
    pub fn label(&self) -> String {
        format!("{:.3}", self.ratio)
    }
}

/// Levels drawn against one swing, ordered by ratio from 0.000 to 1.000.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FibonacciLevels {
    pub high: f64,
    pub low: f64,
    pub trend: Trend,
    pub levels: Vec<FibonacciLevel>,
}

impl FibonacciLevels {
    /// Builds the level set for a swing.
    ///
    /// In a down trend the levels are rebounds measured up from the low
    /// (`low + ratio * range`, 0.000 at the low). In an up trend they are
    /// retracements measured down from the high (`high - ratio * range`,
    /// 0.000 at the high).
    pub fn new(high: f64, low: f64, trend: Trend, ratios: &[f64]) -> Result<Self, AnalyticsError> {
        if !high.is_finite() || !low.is_finite() || high <= low {
            return Err(AnalyticsError::InvalidParameter(format!(
                "swing high {} must be above low {}",
                high, low
            )));
        }
        let range = high - low;
        let price_at = |ratio: f64| match trend {
            Trend::Down => low + ratio * range,
            Trend::Up => high - ratio * range,
        };

        let mut all_ratios = Vec::with_capacity(ratios.len() + 2);
        all_ratios.push(0.0);
        all_ratios.extend(ratios.iter().copied().filter(|r| *r > 0.0 && *r < 1.0));
        all_ratios.push(1.0);

        let levels = all_ratios
            .into_iter()
            .map(|ratio| FibonacciLevel {
                ratio,
                price: price_at(ratio),
            })
            .collect();
        Ok(Self {
            high,
            low,
            trend,
            levels,
        })
    }

    /// The nearest levels strictly below and above `price`.
    pub fn bracket(&self, price: f64) -> (Option<FibonacciLevel>, Option<FibonacciLevel>) {
        let below = self
            .levels
            .iter()
            .filter(|l| l.price < price)
            .max_by(|a, b| a.price.total_cmp(&b.price))
            .copied();
        let above = self
            .levels
            .iter()
            .filter(|l| l.price > price)
            .min_by(|a, b| a.price.total_cmp(&b.price))
            .copied();
        (below, above)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn down_trend_measures_from_low() {
        let set = FibonacciLevels::new(200.0, 100.0, Trend::Down, &DEFAULT_RATIOS).unwrap();
        assert_eq!(set.levels.len(), 7);
        assert_eq!(set.levels[0].price, 100.0);
        assert_eq!(set.levels[6].price, 200.0);
        assert!((set.levels[3].price - 150.0).abs() < 1e-12);
        assert!((set.levels[4].price - 161.8).abs() < 1e-9);
    }

    #[test]
    fn up_trend_measures_from_high() {
        let set = FibonacciLevels::new(200.0, 100.0, Trend::Up, &DEFAULT_RATIOS).unwrap();
        assert_eq!(set.levels[0].price, 200.0);
        assert_eq!(set.levels[6].price, 100.0);
        assert!((set.levels[4].price - 138.2).abs() < 1e-9);
        assert_eq!(set.levels[1].label(), "0.236");
    }

    #[test]
    fn bracket_finds_neighbours() {
        let set = FibonacciLevels::new(200.0, 100.0, Trend::Down, &DEFAULT_RATIOS).unwrap();
        let (below, above) = set.bracket(155.0);
        assert_eq!(below.unwrap().ratio, 0.5);
        assert_eq!(above.unwrap().ratio, 0.618);
        let (below, above) = set.bracket(250.0);
        assert_eq!(below.unwrap().ratio, 1.0);
        assert!(above.is_none());
    }

    #[test]
    fn rejects_inverted_swing() {
        assert!(FibonacciLevels::new(100.0, 200.0, Trend::Up, &DEFAULT_RATIOS).is_err());
    }
}
