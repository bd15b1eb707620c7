use crate::csv_store::CsvCache;
use crate::error::CacheError;
use api_client::{MarketDataApi, SeriesKind, SeriesRequest};
use chrono::{Duration, Local, NaiveDate};
use core_types::{Frequency, PriceSeries};
use std::fmt;

/// Read-through store: serves series from the CSV cache and falls back to the provider.
pub struct SeriesStore<P: MarketDataApi> {
    cache: CsvCache,
    provider: P,
}

impl<P: MarketDataApi> SeriesStore<P> {
    pub fn new(cache: CsvCache, provider: P) -> Self {
        Self { cache, provider }
    }

    pub fn cache(&self) -> &CsvCache {
        &self.cache
    }

    /// Fetches the last `years` years (365 days each) up to today.
    pub async fn fetch(
        &self,
        kind: SeriesKind,
        symbol: &str,
        years: u32,
        frequency: Frequency,
    ) -> Result<PriceSeries, CacheError> {
        let request = Self::request_for(kind, symbol, years, frequency, Local::now().date_naive());
        self.fetch_range(&request).await
    }

    pub fn request_for(
        kind: SeriesKind,
        symbol: &str,
        years: u32,
        frequency: Frequency,
        today: NaiveDate,
    ) -> SeriesRequest {
        let start = today - Duration::days(365 * i64::from(years));
        SeriesRequest::new(kind, symbol, frequency, start, today)
    }

    /// Serves `request` from disk if a cache file exists, otherwise from the provider.
    ///
    /// A corrupt cache file is logged and replaced with fresh data.
    pub async fn fetch_range(&self, request: &SeriesRequest) -> Result<PriceSeries, CacheError> {
        match self.cache.load(request) {
            Ok(Some(series)) => {
                tracing::debug!(request = %request, rows = series.len(), "Serving series from cache.");
                return Ok(series);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, request = %request, "Ignoring unreadable cache file."),
        }

        let series = self.provider.fetch_series(request).await?;
        if series.is_empty() {
            tracing::warn!(request = %request, "Provider returned no rows; nothing cached.");
            return Ok(series);
        }
        let path = self.cache.save(request, &series)?;
        tracing::info!(request = %request, rows = series.len(), path = %path.display(), "Cached series.");
        Ok(series)
    }

    pub fn clear_cache(&self, symbol: Option<&str>) -> Result<usize, CacheError> {
        self.cache.clear(symbol)
    }
}

/// A one-line summary of a series: coverage and close-price statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesInfo {
    pub symbol: String,
    pub frequency: Frequency,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub count: usize,
    pub close_min: f64,
    pub close_max: f64,
    pub close_mean: f64,
    /// Sample standard deviation; zero for a single bar.
    pub close_std: f64,
}

impl fmt::Display for SeriesInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) {} to {}: {} bars, close min {:.2} max {:.2} mean {:.2} std {:.2}",
            self.symbol,
            self.frequency,
            self.start,
            self.end,
            self.count,
            self.close_min,
            self.close_max,
            self.close_mean,
            self.close_std
        )
    }
}

/// Summarises a series. Returns `None` for an empty one.
pub fn series_info(series: &PriceSeries) -> Option<SeriesInfo> {
    let start = series.first_date()?;
    let end = series.last_date()?;
    let closes = series.closes();
    let n = closes.len() as f64;

    let mean = closes.iter().sum::<f64>() / n;
    let std = if closes.len() > 1 {
        (closes.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
    } else {
        0.0
    };

    Some(SeriesInfo {
        symbol: series.symbol().to_string(),
        frequency: series.frequency(),
        start,
        end,
        count: closes.len(),
        close_min: closes.iter().copied().fold(f64::INFINITY, f64::min),
        close_max: closes.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        close_mean: mean,
        close_std: std,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use api_client::error::ApiError;
    use async_trait::async_trait;
    use core_types::PriceBar;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves a fixed three-bar series and counts how often it is asked.
    struct CountingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MarketDataApi for CountingProvider {
        async fn fetch_series(&self, request: &SeriesRequest) -> Result<PriceSeries, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let bars = [1.0, 2.0, 4.0]
                .iter()
                .enumerate()
                .map(|(i, close)| PriceBar {
                    trade_date: request.start + Duration::days(i as i64),
                    open: *close,
                    high: *close,
                    low: *close,
                    close: *close,
                    pct_chg: 0.0,
                    vol: 1.0,
                })
                .collect();
            Ok(PriceSeries::new(request.symbol.clone(), request.frequency, bars))
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 30).unwrap()
    }

    #[tokio::test]
    async fn second_fetch_is_served_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = SeriesStore::new(
            CsvCache::new(dir.path()),
            CountingProvider {
                calls: AtomicUsize::new(0),
            },
        );
        let req = SeriesStore::<CountingProvider>::request_for(SeriesKind::Index, "399006.SZ", 5, Frequency::Daily, today());

        let first = store.fetch_range(&req).await.unwrap();
        let second = store.fetch_range(&req).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.provider.calls.load(Ordering::SeqCst), 1);
        assert!(store.cache().path_for(&req).exists());
    }

    #[tokio::test]
    async fn corrupt_cache_file_is_refetched() {
        let dir = tempfile::tempdir().unwrap();
        let store = SeriesStore::new(
            CsvCache::new(dir.path()),
            CountingProvider {
                calls: AtomicUsize::new(0),
            },
        );
        let req = SeriesStore::<CountingProvider>::request_for(SeriesKind::Index, "399006.SZ", 1, Frequency::Daily, today());
        std::fs::write(store.cache().path_for(&req), "trade_date,open\nnot-a-date,oops\n").unwrap();

        let series = store.fetch_range(&req).await.unwrap();
        assert_eq!(series.len(), 3);
        assert_eq!(store.provider.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn request_spans_365_days_per_year() {
        let req = SeriesStore::<CountingProvider>::request_for(SeriesKind::Gold, "Au99.99", 2, Frequency::Daily, today());
        assert_eq!((req.end - req.start).num_days(), 730);
    }

    #[test]
    fn info_summarises_closes() {
        let bars = [1.0, 2.0, 3.0]
            .iter()
            .enumerate()
            .map(|(i, c)| PriceBar {
                trade_date: today() + Duration::days(i as i64),
                open: *c,
                high: *c,
                low: *c,
                close: *c,
                pct_chg: 0.0,
                vol: 0.0,
            })
            .collect();
        let info = series_info(&PriceSeries::new("X", Frequency::Daily, bars)).unwrap();
        assert_eq!(info.count, 3);
        assert_eq!(info.close_min, 1.0);
        assert_eq!(info.close_max, 3.0);
        assert!((info.close_mean - 2.0).abs() < 1e-12);
        assert!((info.close_std - 1.0).abs() < 1e-12);
        assert!(series_info(&PriceSeries::new("X", Frequency::Daily, vec![])).is_none());
    }
}
