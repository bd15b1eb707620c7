use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Failed to build the HTTP request: {0}")]
    RequestBuild(#[from] reqwest::Error),

    #[error("The API request returned an error (code {0}): {1}")]
    ApiError(i64, String),

    #[error("Failed to deserialize the API response: {0}")]
    Deserialization(String),

    #[error("Invalid data format from API: {0}")]
    InvalidData(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("No Tushare token configured (set TUSHARE_TOKEN)")]
    MissingToken,
}
