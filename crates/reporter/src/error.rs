use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to draw chart {0}: {1}")]
    Chart(String, String),

    #[error("Failed to prepare output directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("Nothing to draw: {0}")]
    NoData(String),
}
