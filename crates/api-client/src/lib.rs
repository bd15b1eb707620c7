use crate::error::ApiError;
use crate::responses::{TushareRequest, TushareResponse, TushareTable, cell_f64, cell_str};
use async_trait::async_trait;
use chrono::NaiveDate;
use configuration::TushareConfig;
use core_types::{Frequency, PriceBar, PriceSeries};
use serde_json::json;
use std::fmt;
use std::time::Duration;

pub mod error;
pub mod responses;

/// The family of instrument a series belongs to. Each maps to a different
/// Tushare endpoint with its own column layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeriesKind {
    /// Equity indices such as `399006.SZ`.
    Index,
    /// FXCM currency pairs such as `USDCNH.FXCM`.
    Fx,
    /// Shanghai Gold Exchange spot contracts such as `Au99.99`.
    Gold,
}

impl SeriesKind {
    fn endpoint(&self, frequency: Frequency) -> Result<&'static str, ApiError> {
        match (self, frequency) {
            (SeriesKind::Index, Frequency::Daily) => Ok("index_daily"),
            (SeriesKind::Index, Frequency::Weekly) => Ok("index_weekly"),
            (SeriesKind::Fx, Frequency::Daily) => Ok("fx_daily"),
            (SeriesKind::Gold, Frequency::Daily) => Ok("sge_daily"),
            (kind, freq) => Err(ApiError::InvalidRequest(format!(
                "{:?} data is only available daily, not {}",
                kind, freq
            ))),
        }
    }

    fn fields(&self) -> &'static str {
        match self {
            SeriesKind::Index => "ts_code,trade_date,open,high,low,close,pct_chg,vol",
            SeriesKind::Fx => "ts_code,trade_date,bid_open,bid_high,bid_low,bid_close,tick_qty",
            SeriesKind::Gold => "ts_code,trade_date,open,high,low,close,pct_change,vol",
        }
    }
}

/// Everything needed to identify one fetch: what, how often, and which dates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeriesRequest {
    pub kind: SeriesKind,
    pub symbol: String,
    pub frequency: Frequency,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl SeriesRequest {
    pub fn new(kind: SeriesKind, symbol: impl Into<String>, frequency: Frequency, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            kind,
            symbol: symbol.into(),
            frequency,
            start,
            end,
        }
    }

    pub fn index(symbol: impl Into<String>, frequency: Frequency, start: NaiveDate, end: NaiveDate) -> Self {
        Self::new(SeriesKind::Index, symbol, frequency, start, end)
    }
}

impl fmt::Display for SeriesRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}..{}",
            self.symbol,
            self.frequency,
            self.start.format("%Y%m%d"),
            self.end.format("%Y%m%d")
        )
    }
}

/// The abstract interface for a market-data provider.
///
/// The cache and the analysis engine depend only on this trait, so tests can
/// swap in an in-memory provider.
#[async_trait]
pub trait MarketDataApi: Send + Sync {
    /// Fetches the bars of one series between two dates, inclusive.
    async fn fetch_series(&self, request: &SeriesRequest) -> Result<PriceSeries, ApiError>;
}

/// A concrete implementation of `MarketDataApi` backed by Tushare Pro.
#[derive(Clone)]
pub struct TushareClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl TushareClient {
    pub fn new(cfg: &TushareConfig) -> Result<Self, ApiError> {
        if cfg.token.trim().is_empty() {
            return Err(ApiError::MissingToken);
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: cfg.base_url.clone(),
            token: cfg.token.clone(),
        })
    }

    async fn query(&self, api_name: &str, params: serde_json::Value, fields: &str) -> Result<TushareTable, ApiError> {
        let body = TushareRequest {
            api_name,
            token: &self.token,
            params,
            fields,
        };

        let response = self.client.post(&self.base_url).json(&body).send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ApiError::ApiError(
                i64::from(status.as_u16()),
                format!("HTTP {} from {}", status, api_name),
            ));
        }

        let parsed: TushareResponse = serde_json::from_str(&text)
            .map_err(|e| ApiError::Deserialization(format!("{}. Original text: {}", e, text)))?;
        parsed.into_table()
    }
}

#[async_trait]
impl MarketDataApi for TushareClient {
    async fn fetch_series(&self, request: &SeriesRequest) -> Result<PriceSeries, ApiError> {
        if request.start > request.end {
            return Err(ApiError::InvalidRequest(format!("start after end in {}", request)));
        }
        let endpoint = request.kind.endpoint(request.frequency)?;
        let params = json!({
            "ts_code": request.symbol,
            "start_date": request.start.format("%Y%m%d").to_string(),
            "end_date": request.end.format("%Y%m%d").to_string(),
        });

        tracing::info!(endpoint, request = %request, "Fetching series from Tushare.");
        let table = self.query(endpoint, params, request.kind.fields()).await?;
        let series = parse_table(request, &table)?;
        tracing::debug!(rows = series.len(), request = %request, "Fetched series.");
        Ok(series)
    }
}

/// Converts a Tushare table into a `PriceSeries`, dropping rows without a close or a valid date.
pub fn parse_table(request: &SeriesRequest, table: &TushareTable) -> Result<PriceSeries, ApiError> {
    let (open, high, low, close) = match request.kind {
        SeriesKind::Fx => ("bid_open", "bid_high", "bid_low", "bid_close"),
        SeriesKind::Index | SeriesKind::Gold => ("open", "high", "low", "close"),
    };
    let date_col = table.column("trade_date")?;
    let close_col = table.column(close)?;
    let open_col = table.column_opt(open);
    let high_col = table.column_opt(high);
    let low_col = table.column_opt(low);
    let pct_col = table.column_opt("pct_chg").or_else(|| table.column_opt("pct_change"));
    let vol_col = table.column_opt("vol").or_else(|| table.column_opt("tick_qty"));

    let mut bars = Vec::with_capacity(table.items.len());
    let mut skipped = 0usize;
    let mut bad_dates = 0usize;
    for row in &table.items {
        let Some(trade_date) = cell_str(row, date_col).and_then(|d| NaiveDate::parse_from_str(d, "%Y%m%d").ok())
        else {
            bad_dates += 1;
            continue;
        };

        let Some(close) = cell_f64(row, close_col).filter(|c| c.is_finite()) else {
            skipped += 1;
            continue;
        };
        let read = |col: Option<usize>| col.and_then(|c| cell_f64(row, c));

        bars.push(PriceBar {
            trade_date,
            open: read(open_col).unwrap_or(close),
            high: read(high_col).unwrap_or(close),
            low: read(low_col).unwrap_or(close),
            close,
            pct_chg: read(pct_col).unwrap_or(f64::NAN),
            vol: read(vol_col).unwrap_or(0.0),
        });
    }
    if skipped > 0 {
        tracing::warn!(skipped, request = %request, "Skipped rows without a close price.");
    }
    if bad_dates > 0 {
        tracing::warn!(skipped = bad_dates, request = %request, "Dropped rows with a missing or unparsable trade_date.");
    }

    bars.sort_by_key(|b| b.trade_date);
    fill_missing_returns(&mut bars);
    Ok(PriceSeries::new(request.symbol.clone(), request.frequency, bars))
}

/// Derives the percent change from consecutive closes where the provider left it out.
/// The first bar has no predecessor and gets 0.
fn fill_missing_returns(bars: &mut [PriceBar]) {
    let mut prev_close: Option<f64> = None;
    for bar in bars.iter_mut() {
        if !bar.pct_chg.is_finite() {
            bar.pct_chg = match prev_close {
                Some(prev) if prev != 0.0 => (bar.close / prev - 1.0) * 100.0,
                _ => 0.0,
            };
        }
        prev_close = Some(bar.close);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y%m%d").unwrap()
    }

    #[test]
    fn parses_index_table_in_ascending_order() {
        let raw = r#"{
            "code": 0, "msg": "",
            "data": {
                "fields": ["ts_code","trade_date","open","high","low","close","pct_chg","vol"],
                "items": [
                    ["399006.SZ","20240103",2010.0,2030.5,2001.0,2020.0,0.5,1000.0],
                    ["399006.SZ","20240102",2000.0,2012.0,1990.0,2010.0,-0.2,900.0]
                ]
            }
        }"#;
        let table = serde_json::from_str::<TushareResponse>(raw).unwrap().into_table().unwrap();
        let req = SeriesRequest::index("399006.SZ", Frequency::Daily, date("20240101"), date("20240105"));
        let series = parse_table(&req, &table).unwrap();

        assert_eq!(series.len(), 2);
        assert_eq!(series.first_date(), Some(date("20240102")));
        assert_eq!(series.closes(), vec![2010.0, 2020.0]);
        assert_eq!(series.returns(), vec![-0.2, 0.5]);
    }

    #[test]
    fn fx_rows_use_bid_close_and_derive_returns() {
        let table = TushareTable {
            fields: ["ts_code", "trade_date", "bid_open", "bid_high", "bid_low", "bid_close", "tick_qty"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            items: vec![
                vec![json!("EURUSD.FXCM"), json!("20240102"), json!(1.1), json!(1.2), json!(1.0), json!(1.10), json!(5)],
                vec![json!("EURUSD.FXCM"), json!("20240103"), json!(1.1), json!(1.2), json!(1.0), json!(1.21), json!(5)],
                vec![json!("EURUSD.FXCM"), json!("20240104"), json!(1.1), json!(1.2), json!(1.0), json!(null), json!(5)],
            ],
        };
        let req = SeriesRequest::new(SeriesKind::Fx, "EURUSD.FXCM", Frequency::Daily, date("20240101"), date("20240105"));
        let series = parse_table(&req, &table).unwrap();

        assert_eq!(series.len(), 2);
        let returns = series.returns();
        assert_eq!(returns[0], 0.0);
        assert!((returns[1] - 10.0).abs() < 1e-9);
    }

    #[test]
    fn rows_with_bad_dates_are_dropped() {
        let table = TushareTable {
            fields: ["ts_code", "trade_date", "close", "pct_chg"].iter().map(|s| s.to_string()).collect(),
            items: vec![
                vec![json!("399006.SZ"), json!("20240102"), json!(2000.0), json!(0.1)],
                vec![json!("399006.SZ"), json!("2024-13-99"), json!(2010.0), json!(0.5)],
                vec![json!("399006.SZ"), json!(null), json!(2015.0), json!(0.2)],
                vec![json!("399006.SZ"), json!("20240104"), json!(2020.0), json!(0.3)],
            ],
        };
        let req = SeriesRequest::index("399006.SZ", Frequency::Daily, date("20240101"), date("20240105"));
        let series = parse_table(&req, &table).unwrap();

        assert_eq!(series.len(), 2);
        assert_eq!(series.dates(), vec![date("20240102"), date("20240104")]);
        assert_eq!(series.closes(), vec![2000.0, 2020.0]);
    }

    #[test]
    fn non_zero_code_is_an_api_error() {
        let raw = r#"{"code": 40203, "msg": "rate limited", "data": null}"#;
        let err = serde_json::from_str::<TushareResponse>(raw).unwrap().into_table().unwrap_err();
        assert!(matches!(err, ApiError::ApiError(40203, _)));
    }

    #[test]
    fn weekly_fx_is_rejected() {
        assert!(SeriesKind::Fx.endpoint(Frequency::Weekly).is_err());
        assert_eq!(SeriesKind::Index.endpoint(Frequency::Weekly).unwrap(), "index_weekly");
    }

    #[test]
    fn client_requires_token() {
        let cfg = TushareConfig::default();
        assert!(matches!(TushareClient::new(&cfg), Err(ApiError::MissingToken)));
    }
}
