use alerter::EmailSender;
use analytics::{FibonacciLevels, StateProbabilities, Summary};
use api_client::TushareClient;
use clap::{Parser, Subcommand};
use comfy_table::{Table, presets::UTF8_FULL};
use configuration::{AnalysisKind, Config, init_tracing, load_config_from};
use core_types::MarketState;
use data_cache::{CsvCache, SeriesStore, series_info};
use engine::{AnalysisResult, ReportEngine, RunSummary, notify_failure};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;

/// The main entry point for the market report application.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let cli = Cli::parse();

    let config = load_config_from(&cli.config)?;
    // Keep the guard alive so the file writer flushes on exit.
    let _log_guard = init_tracing(&config.logging)?;

    // Execute the appropriate command
    match cli.command {
        Commands::Run { no_email } => handle_run(config, no_email).await,
        Commands::Schedule { no_email } => handle_schedule(config, no_email).await,
        Commands::Analyze { kind, symbol } => handle_analyze(config, kind, symbol).await,
        Commands::Prefetch => handle_prefetch(config).await,
        Commands::Cache {
            action: CacheCommand::Clear { symbol },
        } => handle_cache_clear(&config, symbol.as_deref()),
        Commands::Email {
            action: EmailCommand::Test,
        } => handle_email_test(&config).await,
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Daily market analysis: Markov state probabilities, harmonic fits and more, delivered by email.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build today's report once and email it.
    Run {
        /// Build the report and charts but do not send anything.
        #[arg(long)]
        no_email: bool,
    },
    /// Stay running and build the report every day at the configured time.
    Schedule {
        #[arg(long)]
        no_email: bool,
    },
    /// Run a single analysis and print its results.
    Analyze {
        #[arg(value_enum)]
        kind: AnalysisKind,

        /// Analyse this symbol instead of the configured list.
        #[arg(long)]
        symbol: Option<String>,
    },
    /// Download every series the report needs into the cache.
    Prefetch,
    /// Manage the on-disk data cache.
    Cache {
        #[command(subcommand)]
        action: CacheCommand,
    },
    /// Email utilities.
    Email {
        #[command(subcommand)]
        action: EmailCommand,
    },
}

#[derive(Subcommand)]
enum CacheCommand {
    /// Delete cached CSV files, for one symbol or all of them.
    Clear {
        #[arg(long)]
        symbol: Option<String>,
    },
}

#[derive(Subcommand)]
enum EmailCommand {
    /// Connect and authenticate to the SMTP server without sending.
    Test,
}

// ==============================================================================
// Command Logic
// ==============================================================================

fn build_engine(config: Config) -> anyhow::Result<ReportEngine<TushareClient>> {
    let client = TushareClient::new(&config.tushare)?;
    let store = SeriesStore::new(CsvCache::new(&config.data.cache_dir), client);
    Ok(ReportEngine::new(config, store))
}

fn sender_for(config: &Config, no_email: bool) -> Option<EmailSender> {
    if no_email {
        tracing::info!("Email disabled for this run.");
        return None;
    }
    EmailSender::new(&config.email)
}

/// Builds and sends the report. If the run fails before a report exists, an
/// error notification is emailed instead.
async fn handle_run(config: Config, no_email: bool) -> anyhow::Result<()> {
    let sender = sender_for(&config, no_email);
    let subject_prefix = config.report.subject_prefix.clone();

    let result = async {
        let engine = build_engine(config)?;
        let render = engine.render_config();
        Ok::<RunSummary, anyhow::Error>(engine.run_daily(&render, sender.as_ref()).await?)
    }
    .await;

    match result {
        Ok(summary) => {
            print_run_summary(&summary);
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "Report run failed.");
            if let Some(sender) = &sender {
                if let Err(notify_err) = notify_failure(sender, &subject_prefix, &e).await {
                    tracing::error!(error = %notify_err, "Failed to send the failure notification.");
                }
            }
            Err(e)
        }
    }
}

async fn handle_schedule(config: Config, no_email: bool) -> anyhow::Result<()> {
    let sender = sender_for(&config, no_email);
    let engine = build_engine(config)?;
    engine.run_scheduled(sender.as_ref()).await?;
    Ok(())
}

async fn handle_analyze(config: Config, kind: AnalysisKind, symbol: Option<String>) -> anyhow::Result<()> {
    let engine = build_engine(config)?;
    let render = engine.render_config();
    let results = engine.run_analysis(kind, symbol.as_deref(), &render).await?;
    for result in &results {
        print_result(result);
    }
    Ok(())
}

async fn handle_prefetch(config: Config) -> anyhow::Result<()> {
    let engine = build_engine(config)?;
    let needs = engine.required_series();

    let progress_bar = ProgressBar::new(needs.len() as u64);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let mut table = new_table(vec!["Symbol", "Frequency", "From", "To", "Bars", "Close min", "Close max", "Close mean"]);
    let mut failed = 0;
    for need in &needs {
        progress_bar.set_message(format!("{} {}", need.symbol, need.frequency));
        match engine.store().fetch(need.kind, &need.symbol, need.years, need.frequency).await {
            Ok(series) => match series_info(&series) {
                Some(info) => {
                    table.add_row(vec![
                        info.symbol.clone(),
                        info.frequency.to_string(),
                        info.start.to_string(),
                        info.end.to_string(),
                        info.count.to_string(),
                        format!("{:.2}", info.close_min),
                        format!("{:.2}", info.close_max),
                        format!("{:.2}", info.close_mean),
                    ]);
                }
                None => tracing::warn!(symbol = %need.symbol, "No data returned."),
            },
            Err(e) => {
                failed += 1;
                tracing::error!(symbol = %need.symbol, error = %e, "Prefetch failed.");
            }
        }
        progress_bar.inc(1);
    }
    progress_bar.finish_with_message("Prefetch complete!");

    println!("{table}");
    if failed > 0 {
        anyhow::bail!("{} of {} series could not be fetched", failed, needs.len());
    }
    Ok(())
}

fn handle_cache_clear(config: &Config, symbol: Option<&str>) -> anyhow::Result<()> {
    let removed = CsvCache::new(&config.data.cache_dir).clear(symbol)?;
    match symbol {
        Some(s) => println!("Removed {} cached file(s) for {}.", removed, s),
        None => println!("Removed {} cached file(s).", removed),
    }
    Ok(())
}

async fn handle_email_test(config: &Config) -> anyhow::Result<()> {
    let sender = EmailSender::new(&config.email).ok_or(alerter::error::AlerterError::NotConfigured)?;
    if sender.test_connection().await? {
        println!(
            "SMTP connection to {}:{} succeeded ({} recipient(s) configured).",
            config.email.smtp_server,
            config.email.smtp_port,
            sender.recipients().len()
        );
        Ok(())
    } else {
        anyhow::bail!("SMTP server {} rejected the connection test", config.email.smtp_server)
    }
}

// ==============================================================================
// Terminal Output
// ==============================================================================

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(header);
    table
}

fn print_run_summary(summary: &RunSummary) {
    println!("Run {}: {}", summary.run_id, summary.subject);
    println!(
        "{} section(s), {} failed, {} chart(s).",
        summary.sections, summary.failures, summary.charts
    );
    match &summary.delivery {
        Some(d) => println!("Delivered to {} recipient(s), {} failed.", d.delivered, d.failed),
        None => println!("Email not sent."),
    }
}

fn print_result(result: &AnalysisResult) {
    match result {
        AnalysisResult::Probability(report) => {
            let bounds = report.thresholds.bounds();
            println!(
                "\n{} as of {}: change {}",
                report.symbol,
                report.last_date.map(|d| d.to_string()).unwrap_or_else(|| "n/a".to_string()),
                report.last_return.map(|r| format!("{:+.2}%", r)).unwrap_or_else(|| "n/a".to_string()),
            );
            println!(
                "Thresholds: {}",
                bounds.iter().map(|b| format!("{:.2}", b)).collect::<Vec<_>>().join(" / ")
            );
            if let Some(today) = &report.today {
                println!(
                    "Today: {} (p1 {:.2}%, p2 {:.2}%), alert: {}",
                    today.realised,
                    today.first_probability * 100.0,
                    today.second_probability * 100.0,
                    today.alert
                );
            }
            let tomorrow = &report.tomorrow;
            println!("Tomorrow from {}:", tomorrow.current);
            println!("{}", probability_table(&tomorrow.first_order, &tomorrow.second_order));
        }
        AnalysisResult::Harmonic { analysis, chart } => {
            let p = &analysis.params;
            let d = &analysis.diagnostics;
            println!("\n{} {} harmonic fit", analysis.symbol, analysis.frequency);
            let mut table = new_table(vec!["a", "b", "c", "k", "q", "d"]);
            table.add_row(
                [p.a, p.b, p.c, p.k, p.q, p.d]
                    .iter()
                    .map(|v| format!("{:.4}", v))
                    .collect::<Vec<_>>(),
            );
            println!("{table}");
            if let Some(period) = p.period() {
                println!("Period: {:.1} bars", period);
            }
            println!(
                "Residual now {:.2} (mean {:.2}, std {:.2}, z {:+.2}, percentile {:.1})",
                d.current, d.mean, d.std, d.z_score, d.percentile
            );
            print_charts(chart.iter());
        }
        AnalysisResult::Fft { decomposition, charts } => {
            println!(
                "\n{} {} FFT: trend slope {:.4} per bar",
                decomposition.symbol, decomposition.frequency, decomposition.slope
            );
            let mut table = new_table(vec!["Bin", "Period (bars)", "Amplitude"]);
            for c in &decomposition.components {
                table.add_row(vec![c.bin.to_string(), format!("{:.1}", c.period), format!("{:.2}", c.amplitude)]);
            }
            println!("{table}");
            print_charts(charts.iter());
        }
        AnalysisResult::Fibonacci(f) => {
            println!("\n{} Fibonacci levels", f.symbol);
            if let Some(close) = f.latest_close {
                println!("Latest close: {:.2}", close);
            }
            for (name, levels) in [("Resistance", &f.resistance), ("Support", &f.support)] {
                println!("{} ({} trend, {:.2} to {:.2})", name, levels.trend, levels.low, levels.high);
                println!("{}", levels_table(levels));
            }
            print_charts(f.charts.iter());
        }
        AnalysisResult::Fx { report, chart } => {
            println!("\nFX rates vs CNH over {} common dates", report.dates.len());
            let mut table = summary_table("Currency");
            for cross in &report.crosses {
                add_summary_row(&mut table, &cross.currency, &cross.summary);
            }
            println!("{table}");
            print_charts(chart.iter());
        }
        AnalysisResult::Gold { report, chart } => {
            println!("\n{} spot, latest {:.2}", report.contract, report.latest);
            let mut table = summary_table("Contract");
            add_summary_row(&mut table, &report.contract, &report.summary);
            println!("{table}");
            print_charts(chart.iter());
        }
        AnalysisResult::Failed { title, error } => {
            println!("\n{} failed: {}", title, error);
        }
    }
}

fn probability_table(first: &StateProbabilities, second: &StateProbabilities) -> Table {
    let mut table = new_table(vec!["Next state", "First order", "Second order"]);
    for state in MarketState::ALL {
        table.add_row(vec![
            state.to_string(),
            format!("{:.2}%", first[state.index()] * 100.0),
            format!("{:.2}%", second[state.index()] * 100.0),
        ]);
    }
    table
}

fn levels_table(levels: &FibonacciLevels) -> Table {
    let mut table = new_table(vec!["Ratio", "Price"]);
    for level in &levels.levels {
        table.add_row(vec![level.label(), format!("{:.2}", level.price)]);
    }
    table
}

fn summary_table(first_column: &str) -> Table {
    new_table(vec![first_column, "Mean", "Median", "Min", "Max", "Std"])
}

fn add_summary_row(table: &mut Table, name: &str, s: &Summary) {
    table.add_row(vec![
        name.to_string(),
        format!("{:.4}", s.mean),
        format!("{:.4}", s.median),
        format!("{:.4}", s.min),
        format!("{:.4}", s.max),
        format!("{:.4}", s.std),
    ]);
}

fn print_charts<'a>(charts: impl Iterator<Item = &'a PathBuf>) {
    for path in charts {
        println!("Chart: {}", path.display());
    }
}
