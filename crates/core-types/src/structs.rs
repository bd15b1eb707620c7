use crate::enums::Frequency;
use crate::error::CoreError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One bar of market data as returned by the data provider.
///
/// `pct_chg` is the period return in percent (1.5 means +1.5%).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub trade_date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub pct_chg: f64,
    pub vol: f64,
}

/// An immutable, chronologically ascending price series with unique dates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSeries {
    symbol: String,
    frequency: Frequency,
    bars: Vec<PriceBar>,
}

impl PriceSeries {
    /// Builds a series, sorting bars by date and dropping later duplicates of a date.
    pub fn new(symbol: impl Into<String>, frequency: Frequency, mut bars: Vec<PriceBar>) -> Self {
        let symbol = symbol.into();
        bars.sort_by_key(|b| b.trade_date);
        let before = bars.len();
        bars.dedup_by_key(|b| b.trade_date);
        if bars.len() != before {
            tracing::warn!(
                symbol = %symbol,
                dropped = before - bars.len(),
                "Dropped bars with duplicate trade dates."
            );
        }
        Self { symbol, frequency, bars }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn returns(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.pct_chg).collect()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.bars.iter().map(|b| b.trade_date).collect()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.bars.first().map(|b| b.trade_date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.bars.last().map(|b| b.trade_date)
    }

    pub fn last(&self) -> Option<&PriceBar> {
        self.bars.last()
    }

    /// Returns an error if the series holds no bars.
    pub fn ensure_not_empty(&self) -> Result<(), CoreError> {
        if self.bars.is_empty() {
            return Err(CoreError::EmptySeries(self.symbol.clone()));
        }
        Ok(())
    }
}
