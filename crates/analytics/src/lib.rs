//! # Analytics
//!
//! The numerical core of the market report. Every analysis here is a pure
//! calculation over `PriceSeries` values: no I/O, no configuration, no plotting.
//!
//! ## Architectural Principles
//!
//! - **Layer 1 Logic:** depends only on `core-types`. Data comes in already
//!   fetched; results go out as plain serializable structs for the reporter.
//! - **Exact zeros are signal:** transition matrices are never smoothed, so an
//!   unseen transition keeps probability 0 and can drive an alert.
//! - **Failures stay local:** each analyzer returns its own `AnalyticsError`,
//!   so the caller can skip one symbol or frequency and carry on.
//!
//! ## Public API
//!
//! - `StateThresholds`: maps returns onto the six `MarketState`s.
//! - `ProbabilityAnalyzer`, `TransitionMatrix`, `PriorStates`, `estimate`: Markov transitions.
//! - `HarmonicFitter`: Levenberg-Marquardt fit of the trend plus oscillation model.
//! - `FftAnalyzer`: linear trend plus strongest residual cycles.
//! - `FibonacciLevels`, `cross_rates`, `GoldReport`: the comparative sections.

pub mod error;
pub mod fft;
pub mod fibonacci;
pub mod fx;
pub mod gold;
pub mod harmonic;
pub mod markov;
pub mod states;
pub mod stats;

pub use error::AnalyticsError;
pub use fft::{CycleComponent, FftAnalyzer, FftDecomposition};
pub use fibonacci::{DEFAULT_RATIOS, FibonacciLevel, FibonacciLevels};
pub use fx::{CrossRate, FxReport, cross_rates};
pub use gold::{CNY_BASKET, GoldReport};
pub use harmonic::{FitOptions, FitOutcome, HarmonicAnalysis, HarmonicFitter, HarmonicParams, ResidualDiagnostics};
pub use markov::{
    Estimate, MatrixOrder, PriorStates, ProbabilityAnalyzer, ProbabilityReport, StateProbabilities, TodayAnalysis,
    TomorrowPrediction, TransitionMatrix, alert_level, estimate,
};
pub use states::StateThresholds;
pub use stats::Summary;
