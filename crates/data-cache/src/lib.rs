//! # Data Cache Crate
//!
//! The system's local archive of market data. Every series the analyses use
//! passes through here.
//!
//! ## Architectural Principles
//!
//! - **Read-through cache:** `SeriesStore` serves a request from disk when a
//!   matching file exists and only calls the `MarketDataApi` on a miss.
//! - **Content-addressed files:** the file name carries a short hash of the
//!   requested range and frequency, so a different range never reads a stale file.
//! - **No locking:** reads and writes are plain file operations. Overlapping
//!   runs against the same directory must be prevented by the caller.
//!
//! ## Public API
//!
//! - `CsvCache`: file naming, save, load and clear.
//! - `SeriesStore`: the read-through store in front of a provider.
//! - `SeriesInfo`: a summary of a loaded series.
//! - `CacheError`: the specific error types that can be returned from this crate.

pub mod csv_store;
pub mod error;
pub mod store;

pub use csv_store::CsvCache;
pub use error::CacheError;
pub use store::{SeriesInfo, SeriesStore, series_info};
