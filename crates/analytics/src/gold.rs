use crate::error::AnalyticsError;
use crate::stats::Summary;
use chrono::NaiveDate;
use core_types::PriceSeries;
use serde::Serialize;

/// Amount of CNY the purchasing-power chart is expressed in.
pub const CNY_BASKET: f64 = 10_000.0;

/// Spot gold statistics in CNY per gram, plus how many grams a fixed CNY amount buys.
#[derive(Debug, Clone, Serialize)]
pub struct GoldReport {
    pub contract: String,
    pub dates: Vec<NaiveDate>,
    pub closes: Vec<f64>,
    /// Grams of gold bought by `CNY_BASKET` yuan on each date.
    pub grams_per_basket: Vec<f64>,
    pub summary: Summary,
    pub latest: f64,
}

impl GoldReport {
    pub fn from_series(series: &PriceSeries) -> Result<Self, AnalyticsError> {
        series.ensure_not_empty()?;
        let closes = series.closes();
        if let Some(bad) = closes.iter().find(|c| !c.is_finite() || **c <= 0.0) {
            return Err(AnalyticsError::InvalidParameter(format!(
                "{} has a non-positive close {}",
                series.symbol(),
                bad
            )));
        }
        let summary = Summary::of(&closes)
            .ok_or_else(|| AnalyticsError::NotEnoughData(series.symbol().to_string()))?;
        let latest = *closes.last().unwrap_or(&summary.mean);

        Ok(Self {
            contract: series.symbol().to_string(),
            dates: series.dates(),
            grams_per_basket: closes.iter().map(|c| CNY_BASKET / c).collect(),
            closes,
            summary,
            latest,
        })
    }

    pub fn start(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    pub fn end(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use core_types::{Frequency, PriceBar};

    fn series(closes: &[f64]) -> PriceSeries {
        let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, c)| PriceBar {
                trade_date: start + Duration::days(i as i64),
                open: *c,
                high: *c,
                low: *c,
                close: *c,
                pct_chg: 0.0,
                vol: 0.0,
            })
            .collect();
        PriceSeries::new("Au99.99", Frequency::Daily, bars)
    }

    #[test]
    fn summarises_and_converts() {
        let report = GoldReport::from_series(&series(&[500.0, 400.0, 625.0])).unwrap();
        assert_eq!(report.summary.median, 500.0);
        assert_eq!(report.latest, 625.0);
        assert_eq!(report.grams_per_basket, vec![20.0, 25.0, 16.0]);
    }

    #[test]
    fn rejects_empty_and_zero_prices() {
        assert!(GoldReport::from_series(&series(&[])).is_err());
        assert!(GoldReport::from_series(&series(&[500.0, 0.0])).is_err());
    }
}
