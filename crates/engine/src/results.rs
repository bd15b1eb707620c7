use analytics::{FftDecomposition, FibonacciLevels, FxReport, GoldReport, HarmonicAnalysis, ProbabilityReport};
use chrono::NaiveDate;
use reporter::{
    EmailDocument, Section, compose_email, error_notice, fft_section, fibonacci_section, fx_section, gold_section,
    harmonic_section, probability_section,
};
use std::path::PathBuf;
use uuid::Uuid;

/// Resistance and support level sets for one symbol.
#[derive(Debug, Clone)]
pub struct FibonacciResult {
    pub symbol: String,
    pub latest_close: Option<f64>,
    pub resistance: FibonacciLevels,
    pub support: FibonacciLevels,
    pub charts: Vec<PathBuf>,
}

/// The outcome of one unit of analysis (one symbol, one frequency).
///
/// Chart paths are `None`/empty when rendering failed; the numbers are still reported.
#[derive(Debug, Clone)]
pub enum AnalysisResult {
    Probability(ProbabilityReport),
    Harmonic {
        analysis: HarmonicAnalysis,
        chart: Option<PathBuf>,
    },
    Fft {
        decomposition: FftDecomposition,
        charts: Vec<PathBuf>,
    },
    Fibonacci(FibonacciResult),
    Fx {
        report: FxReport,
        chart: Option<PathBuf>,
    },
    Gold {
        report: GoldReport,
        chart: Option<PathBuf>,
    },
    Failed {
        title: String,
        error: String,
    },
}

impl AnalysisResult {
    pub fn failed(title: impl Into<String>, error: &dyn std::fmt::Display) -> Self {
        AnalysisResult::Failed {
            title: title.into(),
            error: error.to_string(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, AnalysisResult::Failed { .. })
    }

    pub fn section(&self) -> Section {
        match self {
            AnalysisResult::Probability(report) => probability_section(report),
            AnalysisResult::Harmonic { analysis, chart } => harmonic_section(analysis, chart.clone()),
            AnalysisResult::Fft { decomposition, charts } => fft_section(decomposition, charts.clone()),
            AnalysisResult::Fibonacci(f) => fibonacci_section(
                &f.symbol,
                f.latest_close,
                &[("Resistance", &f.resistance), ("Support", &f.support)],
                f.charts.clone(),
            ),
            AnalysisResult::Fx { report, chart } => fx_section(report, chart.clone()),
            AnalysisResult::Gold { report, chart } => gold_section(report, chart.clone()),
            AnalysisResult::Failed { title, error } => error_notice(title, error),
        }
    }
}

/// Everything one report run produced, in report order.
#[derive(Debug, Clone)]
pub struct Report {
    pub run_id: Uuid,
    pub date: NaiveDate,
    pub results: Vec<AnalysisResult>,
}

impl Report {
    pub fn failures(&self) -> usize {
        self.results.iter().filter(|r| r.is_failure()).count()
    }

    pub fn sections(&self) -> Vec<Section> {
        self.results.iter().map(AnalysisResult::section).collect()
    }

    pub fn to_email(&self, subject_prefix: &str) -> EmailDocument {
        compose_email(subject_prefix, self.date, &self.sections())
    }
}
