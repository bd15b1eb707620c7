use crate::error::CacheError;
use api_client::SeriesRequest;
use chrono::NaiveDate;
use core_types::{PriceBar, PriceSeries};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

const DATE_FORMAT: &str = "%Y%m%d";

/// One line of a cache file. Dates are stored the way the provider sends them.
#[derive(Debug, Serialize, Deserialize)]
struct CacheRow {
    trade_date: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    pct_chg: f64,
    vol: f64,
}

/// A directory of CSV files, one per (symbol, frequency, date range).
#[derive(Debug, Clone)]
pub struct CsvCache {
    dir: PathBuf,
}

impl CsvCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `{symbol}_{freq}_{hash8}.csv`, where `hash8` is the first eight hex digits
    /// of the SHA-256 of `"{start}_{end}_{freq}"`.
    pub fn file_name(request: &SeriesRequest) -> String {
        let key = format!(
            "{}_{}_{}",
            request.start.format(DATE_FORMAT),
            request.end.format(DATE_FORMAT),
            request.frequency.code()
        );
        let digest = hex::encode(Sha256::digest(key.as_bytes()));
        format!(
            "{}_{}_{}.csv",
            sanitize(&request.symbol),
            request.frequency.code(),
            &digest[..8]
        )
    }

    pub fn path_for(&self, request: &SeriesRequest) -> PathBuf {
        self.dir.join(Self::file_name(request))
    }

    /// Reads a cached series. `Ok(None)` means there is no usable file.
    pub fn load(&self, request: &SeriesRequest) -> Result<Option<PriceSeries>, CacheError> {
        let path = self.path_for(request);
        if !path.exists() {
            return Ok(None);
        }

        let mut reader = csv::Reader::from_path(&path)?;
        let mut bars = Vec::new();
        for row in reader.deserialize::<CacheRow>() {
            let row = row?;
            let trade_date = NaiveDate::parse_from_str(&row.trade_date, DATE_FORMAT).map_err(|e| {
                CacheError::Corrupt(path.display().to_string(), format!("bad date '{}': {}", row.trade_date, e))
            })?;
            bars.push(PriceBar {
                trade_date,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                pct_chg: row.pct_chg,
                vol: row.vol,
            });
        }

        if bars.is_empty() {
            return Ok(None);
        }
        Ok(Some(PriceSeries::new(request.symbol.clone(), request.frequency, bars)))
    }

    /// Writes a series to its cache file, replacing any previous one.
    pub fn save(&self, request: &SeriesRequest, series: &PriceSeries) -> Result<PathBuf, CacheError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(request);

        let mut writer = csv::Writer::from_path(&path)?;
        for bar in series.bars() {
            writer.serialize(CacheRow {
                trade_date: bar.trade_date.format(DATE_FORMAT).to_string(),
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
                pct_chg: bar.pct_chg,
                vol: bar.vol,
            })?;
        }
        writer.flush()?;
        Ok(path)
    }

    /// Deletes cached files, either all of them or only those of one symbol.
    /// Returns the number of files removed.
    pub fn clear(&self, symbol: Option<&str>) -> Result<usize, CacheError> {
        if !self.dir.exists() {
            return Ok(0);
        }
        let prefix = symbol.map(|s| format!("{}_", sanitize(s)));

        let mut removed = 0;
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.ends_with(".csv") {
                continue;
            }
            if prefix.as_deref().is_some_and(|p| !name.starts_with(p)) {
                continue;
            }
            std::fs::remove_file(&path)?;
            removed += 1;
        }
        tracing::info!(removed, symbol = symbol.unwrap_or("*"), "Cleared cache files.");
        Ok(removed)
    }
}

/// Keeps symbols usable as file-name components.
fn sanitize(symbol: &str) -> String {
    symbol
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::Frequency;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn request(symbol: &str, freq: Frequency) -> SeriesRequest {
        SeriesRequest::index(symbol, freq, d(2020, 1, 1), d(2024, 12, 31))
    }

    fn sample(symbol: &str) -> PriceSeries {
        let bars = (1..=3)
            .map(|i| PriceBar {
                trade_date: d(2024, 1, i),
                open: 10.0 * i as f64,
                high: 11.0 * i as f64,
                low: 9.0 * i as f64,
                close: 10.5 * i as f64,
                pct_chg: i as f64 - 2.0,
                vol: 1000.0,
            })
            .collect();
        PriceSeries::new(symbol, Frequency::Daily, bars)
    }

    #[test]
    fn file_name_is_stable_and_range_sensitive() {
        let a = CsvCache::file_name(&request("399006.SZ", Frequency::Daily));
        let b = CsvCache::file_name(&request("399006.SZ", Frequency::Daily));
        let weekly = CsvCache::file_name(&request("399006.SZ", Frequency::Weekly));
        assert_eq!(a, b);
        assert_ne!(a, weekly);
        assert!(a.starts_with("399006.SZ_D_"));
        assert_eq!(a.len(), "399006.SZ_D_".len() + 8 + ".csv".len());
    }

    #[test]
    fn save_then_load_returns_same_bars() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CsvCache::new(dir.path());
        let req = request("399006.SZ", Frequency::Daily);
        let series = sample("399006.SZ");

        assert!(cache.load(&req).unwrap().is_none());
        cache.save(&req, &series).unwrap();
        let loaded = cache.load(&req).unwrap().unwrap();
        assert_eq!(loaded, series);
    }

    #[test]
    fn clear_can_target_one_symbol() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CsvCache::new(dir.path());
        cache.save(&request("399006.SZ", Frequency::Daily), &sample("399006.SZ")).unwrap();
        cache.save(&request("000300.SH", Frequency::Daily), &sample("000300.SH")).unwrap();

        assert_eq!(cache.clear(Some("399006.SZ")).unwrap(), 1);
        assert!(cache.load(&request("000300.SH", Frequency::Daily)).unwrap().is_some());
        assert_eq!(cache.clear(None).unwrap(), 1);
    }

    #[test]
    fn clearing_missing_dir_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CsvCache::new(dir.path().join("absent"));
        assert_eq!(cache.clear(None).unwrap(), 0);
    }
}
