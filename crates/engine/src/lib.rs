//! # Engine
//!
//! Orchestrates a report run: fetch through the cached [`SeriesStore`], analyse,
//! render charts, compose the email and hand it to the [`EmailSender`].
//!
//! ## Architectural Principles
//!
//! - **Sequential**: analyses, symbols and frequencies run one at a time.
//! - **Isolated failures**: one failing symbol or analysis becomes an error
//!   notice in the report; the rest of the report is still built and sent.
//! - **Generic over the data source**: [`ReportEngine`] takes any
//!   [`MarketDataApi`], so tests drive it with synthetic data.
//!
//! ## Public API
//!
//! - [`ReportEngine`]: `build_report`, `run_daily`, `run_analysis`, `run_scheduled`.
//! - [`DailySchedule`] / [`run_scheduler`]: the once-a-day polling loop.
//! - [`notify_failure`]: the plain-text email sent when a run cannot finish.
//!
//! [`SeriesStore`]: data_cache::SeriesStore
//! [`EmailSender`]: alerter::EmailSender
//! [`MarketDataApi`]: api_client::MarketDataApi

pub mod error;
pub mod results;
pub mod runner;
pub mod scheduler;

pub use error::EngineError;
pub use results::{AnalysisResult, FibonacciResult, Report};
pub use runner::{ReportEngine, RunSummary, SeriesNeed, notify_failure};
pub use scheduler::{DailySchedule, run_scheduler};
