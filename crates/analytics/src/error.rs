use core_types::CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("Not enough data: {0}")]
    NotEnoughData(String),

    #[error("Input contains non-finite values: {0}")]
    NonFiniteInput(String),

    #[error("Curve fit did not converge: {0}")]
    FitConvergence(String),

    #[error("Required series is missing: {0}")]
    MissingSeries(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}
