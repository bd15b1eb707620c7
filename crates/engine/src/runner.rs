use crate::error::EngineError;
use crate::results::{AnalysisResult, FibonacciResult, Report};
use alerter::{DeliverySummary, EmailSender};
use analytics::{FftAnalyzer, FibonacciLevels, GoldReport, HarmonicFitter, ProbabilityAnalyzer, cross_rates};
use api_client::{MarketDataApi, SeriesKind};
use chrono::Local;
use configuration::{AnalysisKind, Config};
use core_types::{Frequency, PriceSeries};
use data_cache::SeriesStore;
use reporter::{RenderConfig, ReportError, charts};
use uuid::Uuid;

/// What a daily run produced and where it went.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub subject: String,
    pub sections: usize,
    pub failures: usize,
    pub charts: usize,
    /// `None` when no sender was configured or sending was skipped.
    pub delivery: Option<DeliverySummary>,
}

/// One series a report run will ask the store for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesNeed {
    pub kind: SeriesKind,
    pub symbol: String,
    pub years: u32,
    pub frequency: Frequency,
}

/// Runs the configured analyses one after another and turns them into a report.
///
/// Any single symbol, frequency or analysis that fails becomes an error notice
/// in the report instead of aborting the run.
pub struct ReportEngine<P: MarketDataApi> {
    config: Config,
    store: SeriesStore<P>,
}

impl<P: MarketDataApi> ReportEngine<P> {
    pub fn new(config: Config, store: SeriesStore<P>) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &SeriesStore<P> {
        &self.store
    }

    /// A render configuration stamped with today's date.
    pub fn render_config(&self) -> RenderConfig {
        RenderConfig::new(&self.config.data.output_dir)
    }

    /// Every distinct series the configured report reads, in report order.
    pub fn required_series(&self) -> Vec<SeriesNeed> {
        let cfg = &self.config;
        let mut needs = Vec::new();
        let mut push = |kind, symbol: &str, years, frequency| {
            let need = SeriesNeed {
                kind,
                symbol: symbol.to_string(),
                years,
                frequency,
            };
            if !needs.contains(&need) {
                needs.push(need);
            }
        };

        for analysis in cfg.report_analyses() {
            match analysis {
                AnalysisKind::Probability => {
                    for s in &cfg.probability.symbols {
                        push(SeriesKind::Index, s, cfg.probability.years, Frequency::Daily);
                    }
                }
                AnalysisKind::Harmonic => {
                    for s in &cfg.harmonic.symbols {
                        for &f in &cfg.harmonic.frequencies {
                            push(SeriesKind::Index, s, cfg.harmonic.years, f);
                        }
                    }
                }
                AnalysisKind::Fft => {
                    for s in &cfg.fft.symbols {
                        for &f in &cfg.fft.frequencies {
                            push(SeriesKind::Index, s, cfg.fft.years, f);
                        }
                    }
                }
                AnalysisKind::Fibonacci => push(SeriesKind::Index, &cfg.fibonacci.symbol, cfg.fibonacci.years, Frequency::Daily),
                AnalysisKind::Fx => {
                    for p in &cfg.fx.pairs {
                        push(SeriesKind::Fx, p, cfg.fx.years, Frequency::Daily);
                    }
                }
                AnalysisKind::Gold => push(SeriesKind::Gold, &cfg.gold.contract, cfg.gold.years, Frequency::Daily),
            }
        }
        needs
    }

    /// Runs every analysis in `report_analyses()` order.
    pub async fn build_report(&self, render: &RenderConfig) -> Report {
        let run_id = Uuid::new_v4();
        let analyses = self.config.report_analyses();
        tracing::info!(%run_id, ?analyses, "Starting report run.");

        let mut results = Vec::new();
        for kind in analyses {
            tracing::info!(%run_id, analysis = ?kind, "Analysis started.");
            match self.run_analysis(kind, None, render).await {
                Ok(mut items) => {
                    let failed = items.iter().filter(|r| r.is_failure()).count();
                    tracing::info!(%run_id, analysis = ?kind, items = items.len(), failed, "Analysis finished.");
                    results.append(&mut items);
                }
                Err(e) => {
                    tracing::error!(%run_id, analysis = ?kind, error = %e, "Analysis failed.");
                    results.push(AnalysisResult::failed(kind.title(), &e));
                }
            }
        }

        let report = Report {
            run_id,
            date: Local::now().date_naive(),
            results,
        };
        tracing::info!(%run_id, sections = report.results.len(), failures = report.failures(), "Report run complete.");
        report
    }

    /// Builds the report and, if a sender is given, emails it.
    pub async fn run_daily(&self, render: &RenderConfig, sender: Option<&EmailSender>) -> Result<RunSummary, EngineError> {
        let report = self.build_report(render).await;
        let document = report.to_email(&self.config.report.subject_prefix);

        let delivery = match sender {
            Some(sender) => Some(sender.send_report(&document).await?),
            None => {
                tracing::warn!(run_id = %report.run_id, "No email sender; report was built but not sent.");
                None
            }
        };

        Ok(RunSummary {
            run_id: report.run_id,
            subject: document.subject,
            sections: report.results.len(),
            failures: report.failures(),
            charts: document.images.len(),
            delivery,
        })
    }

    /// One scheduled run: a failure is logged and, when possible, emailed as plain text.
    pub async fn run_and_notify(&self, sender: Option<&EmailSender>) {
        let render = self.render_config();
        match self.run_daily(&render, sender).await {
            Ok(summary) => tracing::info!(
                run_id = %summary.run_id,
                sections = summary.sections,
                failures = summary.failures,
                "Daily report finished."
            ),
            Err(e) => {
                tracing::error!(error = %e, "Daily report failed.");
                if let Some(sender) = sender {
                    if let Err(notify_err) = notify_failure(sender, &self.config.report.subject_prefix, &e).await {
                        tracing::error!(error = %notify_err, "Failed to send the failure notification.");
                    }
                }
            }
        }
    }

    /// Runs one analysis. `symbol` replaces the configured symbol list for it.
    ///
    /// Per-symbol failures are returned as `AnalysisResult::Failed`; an `Err`
    /// means the analysis as a whole could not run.
    pub async fn run_analysis(
        &self,
        kind: AnalysisKind,
        symbol: Option<&str>,
        render: &RenderConfig,
    ) -> Result<Vec<AnalysisResult>, EngineError> {
        match kind {
            AnalysisKind::Probability => {
                let symbols = pick_symbols(&self.config.probability.symbols, symbol);
                let mut out = Vec::with_capacity(symbols.len());
                for s in &symbols {
                    out.push(isolate(kind, s, self.probability(s).await));
                }
                Ok(out)
            }
            AnalysisKind::Harmonic => {
                let symbols = pick_symbols(&self.config.harmonic.symbols, symbol);
                let mut out = Vec::new();
                for s in &symbols {
                    for &freq in &self.config.harmonic.frequencies {
                        let label = format!("{} {}", s, freq);
                        out.push(isolate(kind, &label, self.harmonic(s, freq, render).await));
                    }
                }
                Ok(out)
            }
            AnalysisKind::Fft => {
                let symbols = pick_symbols(&self.config.fft.symbols, symbol);
                let mut out = Vec::new();
                for s in &symbols {
                    for &freq in &self.config.fft.frequencies {
                        let label = format!("{} {}", s, freq);
                        out.push(isolate(kind, &label, self.fft(s, freq, render).await));
                    }
                }
                Ok(out)
            }
            AnalysisKind::Fibonacci => {
                let s = symbol.unwrap_or(&self.config.fibonacci.symbol);
                Ok(vec![self.fibonacci(s, render).await?])
            }
            AnalysisKind::Fx => {
                if let Some(s) = symbol {
                    tracing::warn!(symbol = s, "FX analysis always uses the configured pairs; ignoring symbol.");
                }
                Ok(vec![self.fx(render).await?])
            }
            AnalysisKind::Gold => {
                let contract = symbol.unwrap_or(&self.config.gold.contract);
                Ok(vec![self.gold(contract, render).await?])
            }
        }
    }

    async fn probability(&self, symbol: &str) -> Result<AnalysisResult, EngineError> {
        let cfg = &self.config.probability;
        let series = self.index_series(symbol, cfg.years, Frequency::Daily).await?;
        let analyzer = ProbabilityAnalyzer::new(cfg.first_order_window, cfg.second_order_window);
        Ok(AnalysisResult::Probability(analyzer.analyze(&series)?))
    }

    async fn harmonic(&self, symbol: &str, frequency: Frequency, render: &RenderConfig) -> Result<AnalysisResult, EngineError> {
        let cfg = &self.config.harmonic;
        let series = self.index_series(symbol, cfg.years, frequency).await?;
        let seed = cfg.seed_for(frequency);
        let analysis = HarmonicFitter::new(seed.params, seed.projection_offset).analyze(&series)?;
        let chart = chart_or_warn(symbol, charts::harmonic_chart(render, &analysis));
        Ok(AnalysisResult::Harmonic { analysis, chart })
    }

    async fn fft(&self, symbol: &str, frequency: Frequency, render: &RenderConfig) -> Result<AnalysisResult, EngineError> {
        let cfg = &self.config.fft;
        let series = self.index_series(symbol, cfg.years, frequency).await?;
        let decomposition = FftAnalyzer::new(cfg.num_components).analyze(&series)?;
        let charts = chart_or_warn(symbol, charts::fft_charts(render, &decomposition)).unwrap_or_default();
        Ok(AnalysisResult::Fft { decomposition, charts })
    }

    async fn fibonacci(&self, symbol: &str, render: &RenderConfig) -> Result<AnalysisResult, EngineError> {
        let cfg = &self.config.fibonacci;
        let series = self.index_series(symbol, cfg.years, Frequency::Daily).await?;
        series.ensure_not_empty()?;

        let resistance = FibonacciLevels::new(cfg.resistance.high, cfg.resistance.low, cfg.resistance.trend, &cfg.ratios)?;
        let support = FibonacciLevels::new(cfg.support.high, cfg.support.low, cfg.support.trend, &cfg.ratios)?;

        let dates = series.dates();
        let closes = series.closes();
        let charts = [("resistance", &resistance), ("support", &support)]
            .into_iter()
            .filter_map(|(name, levels)| {
                chart_or_warn(symbol, charts::fibonacci_chart(render, symbol, name, &dates, &closes, levels))
            })
            .collect();

        Ok(AnalysisResult::Fibonacci(FibonacciResult {
            symbol: symbol.to_string(),
            latest_close: series.last().map(|b| b.close),
            resistance,
            support,
            charts,
        }))
    }

    async fn fx(&self, render: &RenderConfig) -> Result<AnalysisResult, EngineError> {
        let cfg = &self.config.fx;
        let mut pairs = Vec::with_capacity(cfg.pairs.len());
        for pair in &cfg.pairs {
            match self.store.fetch(SeriesKind::Fx, pair, cfg.years, Frequency::Daily).await {
                Ok(series) if !series.is_empty() => pairs.push(series),
                Ok(_) => tracing::warn!(pair = %pair, "No FX data returned; pair skipped."),
                Err(e) => tracing::warn!(pair = %pair, error = %e, "Failed to fetch FX pair; pair skipped."),
            }
        }
        let report = cross_rates(&pairs)?;
        let chart = chart_or_warn("FX", charts::fx_chart(render, &report));
        Ok(AnalysisResult::Fx { report, chart })
    }

    async fn gold(&self, contract: &str, render: &RenderConfig) -> Result<AnalysisResult, EngineError> {
        let series = self
            .store
            .fetch(SeriesKind::Gold, contract, self.config.gold.years, Frequency::Daily)
            .await?;
        let report = GoldReport::from_series(&series)?;
        let chart = chart_or_warn(contract, charts::gold_chart(render, &report));
        Ok(AnalysisResult::Gold { report, chart })
    }

    async fn index_series(&self, symbol: &str, years: u32, frequency: Frequency) -> Result<PriceSeries, EngineError> {
        Ok(self.store.fetch(SeriesKind::Index, symbol, years, frequency).await?)
    }
}

/// Sends a plain-text notice that a run could not produce a report.
pub async fn notify_failure(
    sender: &EmailSender,
    subject_prefix: &str,
    error: &dyn std::fmt::Display,
) -> Result<DeliverySummary, EngineError> {
    let now = Local::now();
    let subject = format!("{} failed - {}", subject_prefix, now.format("%Y-%m-%d"));
    let body = format!(
        "The market analysis run at {} did not complete.\n\nError: {}\n",
        now.format("%Y-%m-%d %H:%M:%S"),
        error
    );
    Ok(sender.send_plain(&subject, &body).await?)
}

fn pick_symbols(configured: &[String], symbol: Option<&str>) -> Vec<String> {
    match symbol {
        Some(s) => vec![s.to_string()],
        None => configured.to_vec(),
    }
}

fn isolate(kind: AnalysisKind, label: &str, result: Result<AnalysisResult, EngineError>) -> AnalysisResult {
    result.unwrap_or_else(|e| {
        tracing::error!(analysis = ?kind, item = label, error = %e, "Analysis item failed; continuing.");
        AnalysisResult::failed(format!("{} ({})", kind.title(), label), &e)
    })
}

fn chart_or_warn<T>(subject: &str, result: Result<T, ReportError>) -> Option<T> {
    result
        .inspect_err(|e| tracing::warn!(subject, error = %e, "Chart rendering failed; section sent without it."))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use api_client::SeriesRequest;
    use api_client::error::ApiError;
    use async_trait::async_trait;
    use chrono::{Datelike, Duration, Weekday};
    use core_types::PriceBar;
    use data_cache::CsvCache;

    /// Generates a smooth, weekday-only series for any request. One symbol can be made to fail.
    struct SyntheticProvider {
        failing: Option<&'static str>,
    }

    #[async_trait]
    impl MarketDataApi for SyntheticProvider {
        async fn fetch_series(&self, request: &SeriesRequest) -> Result<PriceSeries, ApiError> {
            if self.failing == Some(request.symbol.as_str()) {
                return Err(ApiError::ApiError(-2001, "no permission".to_string()));
            }
            let base = match request.symbol.as_str() {
                s if s.starts_with("USDCNH") => 7.2,
                s if s.starts_with("USDJPY") => 150.0,
                s if s.ends_with(".FXCM") => 1.2,
                "Au99.99" => 550.0,
                _ => 2000.0,
            };
            let step = match request.frequency {
                Frequency::Daily => 1,
                Frequency::Weekly => 7,
            };

            let mut bars = Vec::new();
            let mut date = request.start;
            let mut prev: Option<f64> = None;
            while date <= request.end {
                if !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
                    let i = bars.len() as f64;
                    let close = base * (1.0 + 0.05 * (i / 9.0).sin() + 0.0002 * i);
                    bars.push(PriceBar {
                        trade_date: date,
                        open: close,
                        high: close,
                        low: close,
                        close,
                        pct_chg: prev.map(|p| (close / p - 1.0) * 100.0).unwrap_or(0.0),
                        vol: 0.0,
                    });
                    prev = Some(close);
                }
                date += Duration::days(step);
            }
            Ok(PriceSeries::new(request.symbol.clone(), request.frequency, bars))
        }
    }

    fn engine(dir: &std::path::Path, failing: Option<&'static str>, analyses: Vec<AnalysisKind>) -> ReportEngine<SyntheticProvider> {
        let mut config = Config::default();
        config.data.cache_dir = dir.join("cache");
        config.data.output_dir = dir.join("out");
        config.probability.symbols = vec!["GOOD.SZ".to_string(), "BAD.SZ".to_string()];
        config.probability.years = 2;
        config.fibonacci.years = 1;
        config.fx.years = 1;
        config.gold.years = 1;
        config.report.analyses = analyses;
        let store = SeriesStore::new(CsvCache::new(&config.data.cache_dir), SyntheticProvider { failing });
        ReportEngine::new(config, store)
    }

    #[tokio::test]
    async fn failed_symbol_becomes_a_notice_and_the_run_continues() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), Some("BAD.SZ"), vec![AnalysisKind::Probability, AnalysisKind::Gold]);
        let render = engine.render_config();

        let report = engine.build_report(&render).await;

        assert_eq!(report.results.len(), 3);
        assert!(matches!(report.results[0], AnalysisResult::Probability(_)));
        match &report.results[1] {
            AnalysisResult::Failed { title, error } => {
                assert!(title.contains("BAD.SZ"));
                assert!(error.contains("no permission"));
            }
            other => panic!("expected a failure, got {:?}", other),
        }
        assert!(matches!(report.results[2], AnalysisResult::Gold { .. }));
        assert_eq!(report.failures(), 1);
    }

    #[tokio::test]
    async fn missing_usdcnh_fails_only_the_fx_analysis() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), Some("USDCNH.FXCM"), vec![AnalysisKind::Fx, AnalysisKind::Gold]);
        let render = engine.render_config();

        let report = engine.build_report(&render).await;

        assert_eq!(report.results.len(), 2);
        assert!(report.results[0].is_failure());
        assert!(matches!(report.results[1], AnalysisResult::Gold { .. }));
    }

    #[tokio::test]
    async fn run_without_sender_still_composes_the_email() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), None, vec![AnalysisKind::Fibonacci, AnalysisKind::Fx]);
        let render = engine.render_config();

        let summary = engine.run_daily(&render, None).await.unwrap();

        assert!(summary.subject.contains("Market analysis report"));
        assert_eq!(summary.sections, 2);
        assert_eq!(summary.failures, 0);
        // Two Fibonacci charts and one FX chart.
        assert_eq!(summary.charts, 3);
        assert!(summary.delivery.is_none());
    }

    #[tokio::test]
    async fn symbol_override_replaces_the_configured_list() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), Some("BAD.SZ"), vec![]);
        let render = engine.render_config();

        let results = engine
            .run_analysis(AnalysisKind::Probability, Some("OTHER.SH"), &render)
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        match &results[0] {
            AnalysisResult::Probability(report) => assert_eq!(report.symbol, "OTHER.SH"),
            other => panic!("expected a probability report, got {:?}", other),
        }
    }

    #[test]
    fn required_series_are_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(dir.path(), None, vec![AnalysisKind::Probability, AnalysisKind::Gold]);
        engine.config.probability.symbols = vec!["A.SZ".to_string(), "A.SZ".to_string()];

        let needs = engine.required_series();

        assert_eq!(needs.len(), 2);
        assert_eq!(needs[0].symbol, "A.SZ");
        assert_eq!(needs[1].kind, SeriesKind::Gold);
    }

    #[tokio::test]
    async fn second_run_is_served_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), None, vec![AnalysisKind::Gold]);
        let render = engine.render_config();

        engine.build_report(&render).await;
        let cached = std::fs::read_dir(engine.config().data.cache_dir.clone()).unwrap().count();
        engine.build_report(&render).await;

        assert_eq!(cached, 1);
        assert_eq!(std::fs::read_dir(&engine.config().data.cache_dir).unwrap().count(), 1);
    }
}
