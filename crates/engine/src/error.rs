use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] configuration::error::ConfigError),

    #[error("API client error: {0}")]
    ApiClient(#[from] api_client::error::ApiError),

    #[error("Data cache error: {0}")]
    Cache(#[from] data_cache::CacheError),

    #[error("Analysis error: {0}")]
    Analytics(#[from] analytics::AnalyticsError),

    #[error("Invalid series: {0}")]
    Core(#[from] core_types::CoreError),

    #[error("Report rendering error: {0}")]
    Report(#[from] reporter::ReportError),

    #[error("Email delivery error: {0}")]
    Alerter(#[from] alerter::error::AlerterError),
}
