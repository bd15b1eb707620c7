use api_client::error::ApiError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read or write cache CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Cache file {0} is corrupt: {1}")]
    Corrupt(String, String),

    #[error("Market data provider failed: {0}")]
    Provider(#[from] ApiError),
}
