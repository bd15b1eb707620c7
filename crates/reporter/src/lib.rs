//! # Reporter
//!
//! Turns analysis results into what a reader sees: SVG charts on disk and HTML
//! fragments, joined into a single email document whose images are referenced
//! by content id.
//!
//! ## Public API
//!
//! - `RenderConfig`: chart size and output location, built once per run.
//! - `charts`: one drawing function per analysis.
//! - `Section`, `compose_email`, `EmailDocument`: the HTML side.
//! - `ReportError`: the specific error types that can be returned from this crate.

pub mod charts;
pub mod error;
pub mod html;
pub mod render;

pub use error::ReportError;
pub use html::{
    EmailDocument, InlineImage, Section, compose_email, error_notice, fft_section, fibonacci_section, fx_section,
    gold_section, harmonic_section, probability_section,
};
pub use render::RenderConfig;
