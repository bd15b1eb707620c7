//! CNH cross rates derived from FXCM USD pairs.

use crate::error::AnalyticsError;
use crate::stats::Summary;
use chrono::NaiveDate;
use core_types::PriceSeries;
use serde::Serialize;
use std::collections::BTreeMap;

/// The pair every cross is converted through.
pub const USDCNH: &str = "USDCNH";

/// One currency expressed in CNH over the common dates.
#[derive(Debug, Clone, Serialize)]
pub struct CrossRate {
    /// Currency code, e.g. `USD` or `EUR`.
    pub currency: String,
    pub values: Vec<f64>,
    pub summary: Summary,
}

/// Every cross rate on the dates where all input pairs have a quote.
#[derive(Debug, Clone, Serialize)]
pub struct FxReport {
    pub dates: Vec<NaiveDate>,
    pub crosses: Vec<CrossRate>,
}

impl FxReport {
    pub fn start(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    pub fn end(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    pub fn cross(&self, currency: &str) -> Option<&CrossRate> {
        self.crosses.iter().find(|c| c.currency == currency)
    }
}

/// `EURUSD.FXCM` -> `EURUSD`.
fn pair_code(symbol: &str) -> &str {
    symbol.split('.').next().unwrap_or(symbol)
}

/// How a pair converts into CNH, given the USDCNH rate on the same day.
///
/// `XXXUSD` pairs multiply (`XXXCNH = XXXUSD * USDCNH`); `USDXXX` pairs divide
/// (`XXXCNH = USDCNH / USDXXX`).
fn conversion(code: &str) -> Option<(String, bool)> {
    if code == USDCNH {
        return None;
    }
    if let Some(base) = code.strip_suffix("USD") {
        return Some((base.to_string(), true));
    }
    code.strip_prefix("USD").map(|quote| (quote.to_string(), false))
}

/// Inner-joins the pairs on trade date and derives every CNH cross.
///
/// `USDCNH` itself is reported as the `USD` cross.
pub fn cross_rates(pairs: &[PriceSeries]) -> Result<FxReport, AnalyticsError> {
    let usd_idx = pairs
        .iter()
        .position(|s| pair_code(s.symbol()) == USDCNH)
        .ok_or_else(|| AnalyticsError::MissingSeries(format!("{} is required for CNH crosses", USDCNH)))?;

    let mut joined: BTreeMap<NaiveDate, Vec<Option<f64>>> = BTreeMap::new();
    for (idx, series) in pairs.iter().enumerate() {
        for bar in series.bars() {
            joined.entry(bar.trade_date).or_insert_with(|| vec![None; pairs.len()])[idx] = Some(bar.close);
        }
    }
    let rows: Vec<(NaiveDate, Vec<f64>)> = joined
        .into_iter()
        .filter_map(|(date, quotes)| quotes.into_iter().collect::<Option<Vec<f64>>>().map(|q| (date, q)))
        .collect();
    if rows.is_empty() {
        return Err(AnalyticsError::NotEnoughData("FX pairs share no common dates".to_string()));
    }

    let mut crosses = Vec::with_capacity(pairs.len());
    let usd_values: Vec<f64> = rows.iter().map(|(_, q)| q[usd_idx]).collect();
    crosses.push(("USD".to_string(), usd_values));

    for (idx, series) in pairs.iter().enumerate() {
        let code = pair_code(series.symbol());
        let Some((currency, multiply)) = conversion(code) else {
            continue;
        };
        let values = rows
            .iter()
            .map(|(_, q)| if multiply { q[idx] * q[usd_idx] } else { q[usd_idx] / q[idx] })
            .collect();
        crosses.push((currency, values));
    }

    let crosses = crosses
        .into_iter()
        .filter_map(|(currency, values)| {
            let summary = Summary::of(&values)?;
            Some(CrossRate {
                currency,
                values,
                summary,
            })
        })
        .collect();

    Ok(FxReport {
        dates: rows.into_iter().map(|(d, _)| d).collect(),
        crosses,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use core_types::{Frequency, PriceBar};

    fn pair(symbol: &str, start_offset: i64, closes: &[f64]) -> PriceSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(start_offset);
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
        PriceSeries::new(symbol, Frequency::Daily, bars)
    }

    #[test]
    fn derives_crosses_on_common_dates() {
        let pairs = vec![
            pair("USDCNH.FXCM", 0, &[7.0, 7.2, 7.1]),
            pair("EURUSD.FXCM", 1, &[1.1, 1.2, 1.3]),
            pair("USDJPY.FXCM", 0, &[140.0, 144.0, 142.0]),
        ];
        let report = cross_rates(&pairs).unwrap();

        assert_eq!(report.dates.len(), 2);
        assert_eq!(report.start(), Some(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()));
        let eur = report.cross("EUR").unwrap();
        assert!((eur.values[0] - 1.1 * 7.2).abs() < 1e-12);
        assert!((eur.values[1] - 1.2 * 7.1).abs() < 1e-12);
        let jpy = report.cross("JPY").unwrap();
        assert!((jpy.values[0] - 7.2 / 144.0).abs() < 1e-12);
        assert_eq!(report.cross("USD").unwrap().values, vec![7.2, 7.1]);
    }

    #[test]
    fn usdcnh_is_required() {
        let pairs = vec![pair("EURUSD.FXCM", 0, &[1.1])];
        assert!(matches!(cross_rates(&pairs), Err(AnalyticsError::MissingSeries(_))));
    }

    #[test]
    fn disjoint_dates_are_not_enough() {
        let pairs = vec![pair("USDCNH.FXCM", 0, &[7.0]), pair("EURUSD.FXCM", 5, &[1.1])];
        assert!(matches!(cross_rates(&pairs), Err(AnalyticsError::NotEnoughData(_))));
    }
}
