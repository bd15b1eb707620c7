//! HTML fragments for each report section and the email document that joins them.

use analytics::{
    FftDecomposition, FibonacciLevels, FxReport, GoldReport, HarmonicAnalysis, ProbabilityReport, StateProbabilities,
    TomorrowPrediction,
};
use core_types::{AlertLevel, MarketState};
use std::path::PathBuf;

const TABLE_OPEN: &str = r#"<table style="border-collapse: collapse; margin: 8px 0; font-size: 14px;" border="1" cellpadding="6">"#;

/// One titled block of the report and the charts that go under it.
#[derive(Debug, Clone)]
pub struct Section {
    pub title: String,
    pub html: String,
    pub charts: Vec<PathBuf>,
    /// Strongest alert raised inside this section, if any.
    pub alert: AlertLevel,
}

impl Section {
    pub fn new(title: impl Into<String>, html: String, charts: Vec<PathBuf>) -> Self {
        Self {
            title: title.into(),
            html,
            charts,
            alert: AlertLevel::None,
        }
    }

    pub fn with_alert(mut self, alert: AlertLevel) -> Self {
        self.alert = alert;
        self
    }
}

/// A chart referenced from the HTML body as `cid:{cid}`.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineImage {
    pub cid: String,
    pub path: PathBuf,
    pub content_type: &'static str,
}

/// A ready-to-send message.
#[derive(Debug, Clone)]
pub struct EmailDocument {
    pub subject: String,
    pub html: String,
    pub images: Vec<InlineImage>,
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn percent(p: f64) -> String {
    format!("{:.2}%", p * 100.0)
}

fn alert_banner(alert: AlertLevel) -> &'static str {
    match alert {
        AlertLevel::Strong => {
            r#"<p style="background:#f8d7da;color:#721c24;padding:10px;"><strong>Strong alert:</strong> today's move had zero probability under both the first- and second-order matrices. The market may have changed regime.</p>"#
        }
        AlertLevel::Normal => {
            r#"<p style="background:#fff3cd;color:#856404;padding:10px;"><strong>Alert:</strong> today's move had zero probability under one of the transition matrices.</p>"#
        }
        AlertLevel::None => "",
    }
}

fn probability_table(html: &mut String, heading: &str, probabilities: &StateProbabilities, highlight: Option<MarketState>) {
    html.push_str(&format!("<h4>{}</h4>{}<tr><th>State</th><th>Probability</th></tr>", escape(heading), TABLE_OPEN));
    for state in MarketState::ALL {
        let style = if Some(state) == highlight { r#" style="font-weight:bold;""# } else { "" };
        html.push_str(&format!(
            "<tr{}><td>{}</td><td>{}</td></tr>",
            style,
            state.label(),
            percent(probabilities[state.index()])
        ));
    }
    html.push_str("</table>");
}

pub fn probability_section(report: &ProbabilityReport) -> Section {
    let mut html = String::new();
    let last_date = report.last_date.map(|d| d.to_string()).unwrap_or_else(|| "n/a".to_string());
    let last_return = report.last_return.map(|r| format!("{:+.2}%", r)).unwrap_or_else(|| "n/a".to_string());
    let bounds = report.thresholds.bounds();
    html.push_str(&format!(
        "<p>{} as of {}: change {}. State thresholds (10/25/50/75/90th pct): {}.</p>",
        escape(&report.symbol),
        last_date,
        last_return,
        bounds.iter().map(|b| format!("{:.2}", b)).collect::<Vec<_>>().join(" / ")
    ));

    let mut alert = AlertLevel::None;
    html.push_str("<h3>1. Today's move</h3>");
    match &report.today {
        Some(today) => {
            alert = today.alert;
            html.push_str(&format!(
                "<p>Realised state: <strong>{}</strong>. First-order probability {}, second-order probability {}.</p>",
                today.realised,
                percent(today.first_probability),
                percent(today.second_probability)
            ));
            probability_table(&mut html, "First-order prediction for today", &today.first_order, Some(today.realised));
            probability_table(&mut html, "Second-order prediction for today", &today.second_order, Some(today.realised));
            html.push_str(alert_banner(today.alert));
        }
        None => html.push_str("<p>No observations yet.</p>"),
    }

    let tomorrow = &report.tomorrow;
    html.push_str("<h3>2. Tomorrow's outlook</h3>");
    html.push_str(&format!(
        "<p>Current state: <strong>{}</strong>. Probability of an up move: {} (first order), {} (second order).</p>",
        tomorrow.current,
        percent(tomorrow.up_probability_first()),
        percent(tomorrow.up_probability_second())
    ));
    let likely = |p: &StateProbabilities| TomorrowPrediction::most_likely(p);
    probability_table(&mut html, "First-order prediction for tomorrow", &tomorrow.first_order, likely(&tomorrow.first_order));
    probability_table(&mut html, "Second-order prediction for tomorrow", &tomorrow.second_order, likely(&tomorrow.second_order));

    Section::new(format!("Probability transitions: {}", report.symbol), html, Vec::new()).with_alert(alert)
}

pub fn harmonic_section(analysis: &HarmonicAnalysis, chart: Option<PathBuf>) -> Section {
    let p = &analysis.params;
    let d = &analysis.diagnostics;
    let mut html = String::new();
    html.push_str(&format!(
        "<p>Model <code>a*x + (b*x + c)*sin(k*x + q) + d</code> fitted in {} evaluations.</p>{}\
         <tr><th>a</th><th>b</th><th>c</th><th>k</th><th>q</th><th>d</th><th>period (bars)</th></tr>\
         <tr><td>{:.4}</td><td>{:.4}</td><td>{:.2}</td><td>{:.6}</td><td>{:.4}</td><td>{:.2}</td><td>{}</td></tr></table>",
        analysis.outcome.evaluations,
        TABLE_OPEN,
        p.a,
        p.b,
        p.c,
        p.k,
        p.q,
        p.d,
        p.period().map(|v| format!("{:.1}", v)).unwrap_or_else(|| "n/a".to_string())
    ));
    html.push_str(&format!(
        "{}<tr><th>Current residual</th><th>Mean</th><th>Std</th><th>Z-score</th><th>Percentile</th></tr>\
         <tr><td>{:.2}</td><td>{:.2}</td><td>{:.2}</td><td>{:+.2}</td><td>{:.1}</td></tr></table>",
        TABLE_OPEN, d.current, d.mean, d.std, d.z_score, d.percentile
    ));
    if let Some((date, value)) = analysis.projected_end() {
        html.push_str(&format!("<p>Projected value at {}: {:.2}.</p>", date, value));
    }
    Section::new(
        format!("Harmonic fit: {} {}", analysis.symbol, analysis.frequency),
        html,
        chart.into_iter().collect(),
    )
}

pub fn fft_section(fft: &FftDecomposition, charts: Vec<PathBuf>) -> Section {
    let mut html = String::new();
    html.push_str(&format!(
        "<p>Linear trend slope {:.4} per day. Strongest residual cycles:</p>{}<tr><th>Period (bars)</th><th>Amplitude</th></tr>",
        fft.slope, TABLE_OPEN
    ));
    for c in &fft.components {
        html.push_str(&format!("<tr><td>{:.1}</td><td>{:.2}</td></tr>", c.period, c.amplitude));
    }
    html.push_str("</table>");
    Section::new(format!("FFT cycles: {} {}", fft.symbol, fft.frequency), html, charts)
}

pub fn fibonacci_section(symbol: &str, latest_close: Option<f64>, sets: &[(&str, &FibonacciLevels)], charts: Vec<PathBuf>) -> Section {
    let mut html = String::new();
    if let Some(close) = latest_close {
        html.push_str(&format!("<p>Latest close: {:.2}.</p>", close));
    }
    for (name, set) in sets {
        html.push_str(&format!(
            "<h4>{} (high {:.2}, low {:.2}, {} trend)</h4>{}<tr><th>Ratio</th><th>Level</th></tr>",
            escape(name),
            set.high,
            set.low,
            set.trend,
            TABLE_OPEN
        ));
        for level in &set.levels {
            html.push_str(&format!("<tr><td>{}</td><td>{:.2}</td></tr>", level.label(), level.price));
        }
        html.push_str("</table>");
        if let Some(close) = latest_close {
            let (below, above) = set.bracket(close);
            let fmt = |l: Option<analytics::FibonacciLevel>| {
                l.map(|l| format!("{} ({:.2})", l.label(), l.price)).unwrap_or_else(|| "none".to_string())
            };
            html.push_str(&format!("<p>Close sits between {} and {}.</p>", fmt(below), fmt(above)));
        }
    }
    Section::new(format!("Fibonacci levels: {}", symbol), html, charts)
}

pub fn fx_section(fx: &FxReport, chart: Option<PathBuf>) -> Section {
    let mut html = String::new();
    if let (Some(start), Some(end)) = (fx.start(), fx.end()) {
        html.push_str(&format!("<p>{} to {} ({} common trading days).</p>", start, end, fx.dates.len()));
    }
    html.push_str(&format!(
        "{}<tr><th>Currency</th><th>Latest</th><th>Mean</th><th>Median</th><th>Min</th><th>Max</th><th>Std</th></tr>",
        TABLE_OPEN
    ));
    for c in &fx.crosses {
        let s = &c.summary;
        let latest = c.values.last().copied().unwrap_or(f64::NAN);
        html.push_str(&format!(
            "<tr><td>{}CNH</td><td>{:.4}</td><td>{:.4}</td><td>{:.4}</td><td>{:.4}</td><td>{:.4}</td><td>{:.4}</td></tr>",
            escape(&c.currency),
            latest,
            s.mean,
            s.median,
            s.min,
            s.max,
            s.std
        ));
    }
    html.push_str("</table>");
    Section::new("FX rates against CNH", html, chart.into_iter().collect())
}

pub fn gold_section(gold: &GoldReport, chart: Option<PathBuf>) -> Section {
    let s = &gold.summary;
    let mut html = String::new();
    if let (Some(start), Some(end)) = (gold.start(), gold.end()) {
        html.push_str(&format!("<p>{} spot, {} to {}, CNY per gram.</p>", escape(&gold.contract), start, end));
    }
    html.push_str(&format!(
        "{}<tr><th>Latest</th><th>Mean</th><th>Median</th><th>Min</th><th>Max</th><th>Std</th></tr>\
         <tr><td>{:.2}</td><td>{:.2}</td><td>{:.2}</td><td>{:.2}</td><td>{:.2}</td><td>{:.2}</td></tr></table>",
        TABLE_OPEN, gold.latest, s.mean, s.median, s.min, s.max, s.std
    ));
    Section::new(format!("Gold: {}", gold.contract), html, chart.into_iter().collect())
}

/// Placeholder for an analysis that failed, so the rest of the report still goes out.
pub fn error_notice(title: &str, error: &str) -> Section {
    let html = format!(
        r#"<p style="background:#f8f9fa;color:#6c757d;padding:10px;">This analysis could not be completed: {}</p>"#,
        escape(error)
    );
    Section::new(title, html, Vec::new())
}

/// Joins the sections into one HTML document, numbering charts as `cid:image_{i}`.
pub fn compose_email(subject_prefix: &str, date: chrono::NaiveDate, sections: &[Section]) -> EmailDocument {
    let strongest = sections.iter().map(|s| s.alert).fold(AlertLevel::None, |acc, a| match (acc, a) {
        (AlertLevel::Strong, _) | (_, AlertLevel::Strong) => AlertLevel::Strong,
        (AlertLevel::Normal, _) | (_, AlertLevel::Normal) => AlertLevel::Normal,
        _ => AlertLevel::None,
    });
    let tag = match strongest {
        AlertLevel::Strong => "[STRONG ALERT] ",
        AlertLevel::Normal => "[ALERT] ",
        AlertLevel::None => "",
    };
    let subject = format!("{}{} {}", tag, subject_prefix, date);

    let mut html = String::new();
    html.push_str(&format!(
        r#"<html><body style="font-family: Arial, sans-serif; color: #222;"><h1 style="font-size: 22px;">{} {}</h1>"#,
        escape(subject_prefix),
        date
    ));

    let mut images = Vec::new();
    for section in sections {
        html.push_str(&format!(r#"<h2 style="font-size: 18px; margin-top: 28px;">{}</h2>"#, escape(&section.title)));
        html.push_str(&section.html);
        for chart in &section.charts {
            let cid = format!("image_{}", images.len());
            html.push_str(&format!(
                r#"<div><img src="cid:{}" alt="{}" style="max-width: 100%;"></div>"#,
                cid,
                escape(&section.title)
            ));
            images.push(InlineImage {
                cid,
                path: chart.clone(),
                content_type: "image/svg+xml",
            });
        }
    }
    html.push_str("</body></html>");

    EmailDocument { subject, html, images }
}
