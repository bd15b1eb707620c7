use crate::error::ConfigError;
use chrono::NaiveTime;
use core_types::{Frequency, Trend};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// The root configuration structure for the entire application.
///
/// Every section has defaults, so an empty (or missing) `config.toml` yields a
/// runnable configuration apart from the secrets.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data: DataConfig,
    pub tushare: TushareConfig,
    pub probability: ProbabilityConfig,
    pub harmonic: HarmonicConfig,
    pub fft: FftConfig,
    pub fibonacci: FibonacciConfig,
    pub fx: FxConfig,
    pub gold: GoldConfig,
    pub report: ReportConfig,
    pub email: EmailConfig,
    pub schedule: ScheduleConfig,
    pub logging: LoggingConfig,
}

/// The analyses that can make up a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum AnalysisKind {
    Probability,
    Harmonic,
    Fft,
    Fibonacci,
    Fx,
    Gold,
}

impl AnalysisKind {
    pub fn title(&self) -> &'static str {
        match self {
            AnalysisKind::Probability => "Probability transition analysis",
            AnalysisKind::Harmonic => "Harmonic fit analysis",
            AnalysisKind::Fft => "FFT cycle analysis",
            AnalysisKind::Fibonacci => "Fibonacci levels",
            AnalysisKind::Fx => "FX rates vs CNY",
            AnalysisKind::Gold => "Gold spot price",
        }
    }
}

/// Where cached market data and rendered charts live.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub cache_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("data"),
            output_dir: PathBuf::from("analysis_results"),
        }
    }
}

/// Credentials and endpoint for the Tushare Pro market-data API.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TushareConfig {
    /// Filled from `TUSHARE_TOKEN` when empty.
    pub token: String,
    pub base_url: String,
}

impl Default for TushareConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            base_url: "http://api.tushare.pro".to_string(),
        }
    }
}

/// Parameters for the Markov transition-matrix analysis.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProbabilityConfig {
    pub symbols: Vec<String>,
    /// Years of daily history used for the state thresholds.
    pub years: u32,
    pub first_order_window: usize,
    pub second_order_window: usize,
}

impl Default for ProbabilityConfig {
    fn default() -> Self {
        Self {
            symbols: vec!["399006.SZ".to_string()],
            years: 5,
            first_order_window: 60,
            second_order_window: 360,
        }
    }
}

/// Initial guess and projection horizon for one frequency of the harmonic fit.
#[derive(Debug, Clone, Deserialize)]
pub struct HarmonicSeed {
    /// `[a, b, c, k, q, d]` of `a*x + (b*x + c)*sin(k*x + q) + d`.
    pub params: [f64; 6],
    /// How many periods past the last bar the fitted curve is projected.
    pub projection_offset: usize,
}

impl HarmonicSeed {
    /// Seed tuned against daily closes of the ChiNext index.
    pub fn daily_default() -> Self {
        Self {
            params: [0.44, -0.06, -592.09, 0.0045, 0.43, 1303.89],
            projection_offset: 500,
        }
    }

    /// Seed tuned against weekly closes of the ChiNext index.
    pub fn weekly_default() -> Self {
        Self {
            params: [2.0, 0.5, 500.0, 0.02, std::f64::consts::PI, 1000.0],
            projection_offset: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HarmonicConfig {
    pub symbols: Vec<String>,
    pub years: u32,
    pub frequencies: Vec<Frequency>,
    pub daily_seed: HarmonicSeed,
    pub weekly_seed: HarmonicSeed,
}

impl HarmonicConfig {
    pub fn seed_for(&self, frequency: Frequency) -> &HarmonicSeed {
        match frequency {
            Frequency::Daily => &self.daily_seed,
            Frequency::Weekly => &self.weekly_seed,
        }
    }
}

impl Default for HarmonicConfig {
    fn default() -> Self {
        Self {
            symbols: vec!["399006.SZ".to_string()],
            years: 15,
            frequencies: vec![Frequency::Daily, Frequency::Weekly],
            daily_seed: HarmonicSeed::daily_default(),
            weekly_seed: HarmonicSeed::weekly_default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FftConfig {
    /// Adds the FFT section to the report even when `report.analyses` omits it.
    pub enabled: bool,
    pub symbols: Vec<String>,
    pub years: u32,
    /// Number of strongest frequency bins kept in the cycle reconstruction.
    pub num_components: usize,
    pub frequencies: Vec<Frequency>,
}

impl Default for FftConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            symbols: vec!["399006.SZ".to_string()],
            years: 15,
            num_components: 6,
            frequencies: vec![Frequency::Daily, Frequency::Weekly],
        }
    }
}

/// One swing (high, low, direction) that a Fibonacci level set is drawn against.
#[derive(Debug, Clone, Deserialize)]
pub struct SwingConfig {
    pub high: f64,
    pub low: f64,
    pub trend: Trend,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FibonacciConfig {
    pub symbol: String,
    pub years: u32,
    pub ratios: Vec<f64>,
    pub resistance: SwingConfig,
    pub support: SwingConfig,
}

impl Default for FibonacciConfig {
    fn default() -> Self {
        Self {
            symbol: "399006.SZ".to_string(),
            years: 15,
            ratios: vec![0.236, 0.382, 0.5, 0.618, 0.786],
            resistance: SwingConfig {
                high: 3576.46,
                low: 1482.93,
                trend: Trend::Down,
            },
            support: SwingConfig {
                high: 2524.69,
                low: 1482.93,
                trend: Trend::Up,
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FxConfig {
    pub years: u32,
    /// FXCM pair codes. `USDCNH.FXCM` is required; the others are quoted against USD.
    pub pairs: Vec<String>,
}

impl Default for FxConfig {
    fn default() -> Self {
        Self {
            years: 5,
            pairs: ["USDCNH", "EURUSD", "GBPUSD", "AUDUSD", "NZDUSD", "USDJPY"]
                .iter()
                .map(|p| format!("{}.FXCM", p))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GoldConfig {
    pub years: u32,
    /// Shanghai Gold Exchange contract code.
    pub contract: String,
}

impl Default for GoldConfig {
    fn default() -> Self {
        Self {
            years: 5,
            contract: "Au99.99".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Analyses included in the daily report, in order.
    pub analyses: Vec<AnalysisKind>,
    pub subject_prefix: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            analyses: vec![
                AnalysisKind::Probability,
                AnalysisKind::Harmonic,
                AnalysisKind::Fibonacci,
                AnalysisKind::Fx,
                AnalysisKind::Gold,
            ],
            subject_prefix: "Market analysis report".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    /// Filled from `EMAIL_SENDER` when empty.
    pub sender: String,
    /// Filled from `EMAIL_PASSWORD` (or `NETEASE_EMAIL_PASSWORD`) when empty.
    pub password: String,
    /// Filled from `SMTP_SERVER` when empty.
    pub smtp_server: String,
    pub smtp_port: u16,
    pub recipients: Vec<String>,
    /// Optional JSON file of the form `{"recipients": ["a@b.c"]}`.
    pub recipients_file: Option<PathBuf>,
}

impl EmailConfig {
    /// True when every field needed to open an SMTP session is present.
    pub fn is_configured(&self) -> bool {
        !self.sender.is_empty() && !self.password.is_empty() && !self.smtp_server.is_empty() && self.smtp_port != 0
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            sender: String::new(),
            password: String::new(),
            smtp_server: String::new(),
            smtp_port: 465,
            recipients: Vec::new(),
            recipients_file: Some(PathBuf::from("email_recipients.json")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Local wall-clock time of the daily run, `HH:MM`.
    pub daily_at: String,
    /// How often the scheduler wakes up to check the clock.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
}

impl ScheduleConfig {
    pub fn run_time(&self) -> Result<NaiveTime, ConfigError> {
        NaiveTime::parse_from_str(&self.daily_at, "%H:%M").map_err(|e| {
            ConfigError::ValidationError(format!("schedule.daily_at '{}' is not HH:MM: {}", self.daily_at, e))
        })
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            daily_at: "15:05".to_string(),
            poll_interval: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is not set.
    pub level: String,
    pub directory: PathBuf,
    pub file_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: PathBuf::from("."),
            file_name: "analysis.log".to_string(),
        }
    }
}

impl Config {
    /// The analyses to run, in report order.
    pub fn report_analyses(&self) -> Vec<AnalysisKind> {
        let mut analyses = self.report.analyses.clone();
        if self.fft.enabled && !analyses.contains(&AnalysisKind::Fft) {
            analyses.push(AnalysisKind::Fft);
        }
        analyses
    }

    /// Checks cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.probability;
        if p.first_order_window < 2 || p.second_order_window < 3 {
            return Err(ConfigError::ValidationError(
                "probability windows must be at least 2 (first order) and 3 (second order)".to_string(),
            ));
        }

        for kind in &self.report_analyses() {
            let empty = match kind {
                AnalysisKind::Probability => self.probability.symbols.is_empty(),
                AnalysisKind::Harmonic => self.harmonic.symbols.is_empty() || self.harmonic.frequencies.is_empty(),
                AnalysisKind::Fft => self.fft.symbols.is_empty() || self.fft.frequencies.is_empty(),
                AnalysisKind::Fibonacci => self.fibonacci.symbol.is_empty(),
                AnalysisKind::Fx => !self.fx.pairs.iter().any(|p| p.starts_with("USDCNH")),
                AnalysisKind::Gold => self.gold.contract.is_empty(),
            };
            if empty {
                return Err(ConfigError::ValidationError(format!(
                    "{:?} is enabled but has no symbols or frequencies configured",
                    kind
                )));
            }
        }

        if self.fft.num_components == 0 {
            return Err(ConfigError::ValidationError("fft.num_components must be positive".to_string()));
        }

        let ratios = &self.fibonacci.ratios;
        if ratios.iter().any(|r| !(0.0..=1.0).contains(r)) || ratios.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ConfigError::ValidationError(
                "fibonacci.ratios must be strictly increasing and within [0, 1]".to_string(),
            ));
        }
        for swing in [&self.fibonacci.resistance, &self.fibonacci.support] {
            if swing.high <= swing.low {
                return Err(ConfigError::ValidationError(format!(
                    "fibonacci swing high {} must exceed low {}",
                    swing.high, swing.low
                )));
            }
        }

        self.schedule.run_time()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn default_seeds_match_frequency() {
        let cfg = HarmonicConfig::default();
        assert_eq!(cfg.seed_for(Frequency::Daily).projection_offset, 500);
        assert_eq!(cfg.seed_for(Frequency::Weekly).projection_offset, 100);
        assert!((cfg.seed_for(Frequency::Weekly).params[4] - std::f64::consts::PI).abs() < 1e-12);
    }

    #[test]
    fn fft_flag_appends_section() {
        let mut cfg = Config::default();
        assert!(!cfg.report_analyses().contains(&AnalysisKind::Fft));
        cfg.fft.enabled = true;
        assert_eq!(cfg.report_analyses().last(), Some(&AnalysisKind::Fft));
    }

    #[test]
    fn rejects_tiny_windows() {
        let mut cfg = Config::default();
        cfg.probability.second_order_window = 2;
        assert!(matches!(cfg.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn rejects_unsorted_ratios() {
        let mut cfg = Config::default();
        cfg.fibonacci.ratios = vec![0.618, 0.382];
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_malformed_schedule_time() {
        let mut cfg = Config::default();
        cfg.schedule.daily_at = "3pm".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn email_needs_all_fields() {
        let mut email = EmailConfig::default();
        assert!(!email.is_configured());
        email.sender = "me@example.com".to_string();
        email.password = "secret".to_string();
        email.smtp_server = "smtp.example.com".to_string();
        assert!(email.is_configured());
    }
}
