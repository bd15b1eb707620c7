//! SVG chart rendering for every report section.

use crate::error::ReportError;
use crate::render::RenderConfig;
use analytics::{FftDecomposition, FibonacciLevels, FxReport, GoldReport, HarmonicAnalysis};
use chrono::NaiveDate;
use plotters::coord::Shift;
use plotters::prelude::*;
use std::path::{Path, PathBuf};

const PALETTE: [RGBColor; 6] = [
    RGBColor(31, 119, 180),
    RGBColor(214, 39, 40),
    RGBColor(44, 160, 44),
    RGBColor(148, 103, 189),
    RGBColor(255, 127, 14),
    RGBColor(140, 86, 75),
];
const LEVEL_COLOR: RGBColor = RGBColor(120, 120, 120);

struct Line<'a> {
    label: String,
    values: &'a [f64],
    color: RGBColor,
}

/// One set of axes: lines against a shared date index plus optional horizontal levels.
struct Panel<'a> {
    title: String,
    y_desc: &'a str,
    dates: &'a [NaiveDate],
    lines: Vec<Line<'a>>,
    levels: Vec<(f64, String)>,
}

fn chart_err(path: &Path) -> impl Fn(String) -> ReportError + '_ {
    move |e| ReportError::Chart(path.display().to_string(), e)
}

fn y_bounds(panel: &Panel<'_>) -> Option<(f64, f64)> {
    let values = panel
        .lines
        .iter()
        .flat_map(|l| l.values.iter().copied())
        .chain(panel.levels.iter().map(|(v, _)| *v))
        .filter(|v| v.is_finite());
    let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() {
        return None;
    }
    let pad = if hi > lo { (hi - lo) * 0.05 } else { lo.abs().max(1.0) * 0.05 };
    Some((lo - pad, hi + pad))
}

fn date_label(dates: &[NaiveDate], x: f64) -> String {
    let idx = x.round().max(0.0) as usize;
    dates.get(idx).map(|d| d.format("%Y-%m").to_string()).unwrap_or_default()
}

fn draw_panel(area: &DrawingArea<SVGBackend<'_>, Shift>, panel: &Panel<'_>, path: &Path) -> Result<(), ReportError> {
    let err = chart_err(path);
    let (y_min, y_max) = y_bounds(panel).ok_or_else(|| ReportError::NoData(panel.title.clone()))?;
    let len = panel.lines.iter().map(|l| l.values.len()).max().unwrap_or(0);
    let x_max = len.saturating_sub(1).max(1) as f64;

    let mut chart = ChartBuilder::on(area)
        .caption(&panel.title, ("sans-serif", 22))
        .margin(12)
        .x_label_area_size(40)
        .y_label_area_size(70)
        .build_cartesian_2d(0f64..x_max, y_min..y_max)
        .map_err(|e| err(e.to_string()))?;

    let dates = panel.dates;
    chart
        .configure_mesh()
        .x_labels(12)
        .x_label_formatter(&|x| date_label(dates, *x))
        .y_desc(panel.y_desc)
        .draw()
        .map_err(|e| err(e.to_string()))?;

    for line in &panel.lines {
        let color = line.color;
        let points = line
            .values
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_finite())
            .map(|(i, v)| (i as f64, *v));
        chart
            .draw_series(LineSeries::new(points, color.stroke_width(2)))
            .map_err(|e| err(e.to_string()))?
            .label(line.label.clone())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
    }

    for (value, label) in &panel.levels {
        chart
            .draw_series(LineSeries::new(vec![(0.0, *value), (x_max, *value)], LEVEL_COLOR.stroke_width(1)))
            .map_err(|e| err(e.to_string()))?;
        chart
            .draw_series(std::iter::once(Text::new(
                label.clone(),
                (0.0, *value),
                ("sans-serif", 13).into_font().color(&LEVEL_COLOR),
            )))
            .map_err(|e| err(e.to_string()))?;
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperLeft)
        .background_style(WHITE.mix(0.85))
        .border_style(BLACK)
        .draw()
        .map_err(|e| err(e.to_string()))?;
    Ok(())
}

/// Draws `panels` stacked vertically into one SVG file.
fn render(cfg: &RenderConfig, path: PathBuf, panels: &[Panel<'_>]) -> Result<PathBuf, ReportError> {
    {
        let height = cfg.height * panels.len().max(1) as u32 * 3 / 4 + cfg.height / 4;
        let root = SVGBackend::new(&path, (cfg.width, height)).into_drawing_area();
        root.fill(&WHITE).map_err(|e| chart_err(&path)(e.to_string()))?;
        let areas = root.split_evenly((panels.len().max(1), 1));
        for (area, panel) in areas.iter().zip(panels) {
            draw_panel(area, panel, &path)?;
        }
        root.present().map_err(|e| chart_err(&path)(e.to_string()))?;
    }
    tracing::debug!(path = %path.display(), "Chart written.");
    Ok(path)
}

/// Fitted curve with its projection over the closes, and the residuals below.
pub fn harmonic_chart(cfg: &RenderConfig, analysis: &HarmonicAnalysis) -> Result<PathBuf, ReportError> {
    let path = cfg.chart_path(
        &format!("{}_{}", analysis.symbol, analysis.frequency.code()),
        "harmonic",
    )?;
    let diag = &analysis.diagnostics;
    let fit = Panel {
        title: format!("{} {} harmonic fit", analysis.symbol, analysis.frequency),
        y_desc: "Close",
        dates: &analysis.projection_dates,
        lines: vec![
            Line {
                label: "Close".to_string(),
                values: &analysis.closes,
                color: PALETTE[0],
            },
            Line {
                label: "Fit and projection".to_string(),
                values: &analysis.projection,
                color: PALETTE[1],
            },
        ],
        levels: Vec::new(),
    };
    let residuals = Panel {
        title: format!("Close minus fit (mean {:.2}, std {:.2})", diag.mean, diag.std),
        y_desc: "Residual",
        dates: &analysis.dates,
        lines: vec![Line {
            label: "Residual".to_string(),
            values: &analysis.residuals,
            color: PALETTE[3],
        }],
        levels: vec![(diag.mean, "mean".to_string())],
    };
    render(cfg, path, &[fit, residuals])
}

/// Residuals, reconstructed cycles, and the combined trend, as three files.
pub fn fft_charts(cfg: &RenderConfig, fft: &FftDecomposition) -> Result<Vec<PathBuf>, ReportError> {
    let subject = format!("{}_{}", fft.symbol, fft.frequency.code());
    let residual_panel = Panel {
        title: format!("{} {} residuals from linear trend", fft.symbol, fft.frequency),
        y_desc: "Close minus trend",
        dates: &fft.dates,
        lines: vec![Line {
            label: "Residual".to_string(),
            values: &fft.residuals,
            color: PALETTE[3],
        }],
        levels: vec![(0.0, String::new())],
    };
    let cycles_panel = Panel {
        title: format!("{} {} strongest cycles", fft.symbol, fft.frequency),
        y_desc: "Cycle",
        dates: &fft.dates,
        lines: vec![
            Line {
                label: "Residual".to_string(),
                values: &fft.residuals,
                color: PALETTE[5],
            },
            Line {
                label: format!("{} cycle components", fft.components.len()),
                values: &fft.cycles,
                color: PALETTE[1],
            },
        ],
        levels: Vec::new(),
    };
    let combined_panel = Panel {
        title: format!("{} {} trend plus cycles", fft.symbol, fft.frequency),
        y_desc: "Close",
        dates: &fft.dates,
        lines: vec![
            Line {
                label: "Close".to_string(),
                values: &fft.closes,
                color: PALETTE[0],
            },
            Line {
                label: "Combined".to_string(),
                values: &fft.combined,
                color: PALETTE[1],
            },
            Line {
                label: "Linear trend".to_string(),
                values: &fft.trend,
                color: PALETTE[2],
            },
        ],
        levels: Vec::new(),
    };

    Ok(vec![
        render(cfg, cfg.chart_path(&subject, "fft_residuals")?, &[residual_panel])?,
        render(cfg, cfg.chart_path(&subject, "fft_cycles")?, &[cycles_panel])?,
        render(cfg, cfg.chart_path(&subject, "fft_combined")?, &[combined_panel])?,
    ])
}

/// Daily closes with one horizontal line per level.
pub fn fibonacci_chart(
    cfg: &RenderConfig,
    symbol: &str,
    name: &str,
    dates: &[NaiveDate],
    closes: &[f64],
    levels: &FibonacciLevels,
) -> Result<PathBuf, ReportError> {
    let path = cfg.chart_path(symbol, &format!("fibonacci_{}", name))?;
    let panel = Panel {
        title: format!("{} {} levels ({} trend)", symbol, name, levels.trend),
        y_desc: "Close",
        dates,
        lines: vec![Line {
            label: "Close".to_string(),
            values: closes,
            color: PALETTE[0],
        }],
        levels: levels
            .levels
            .iter()
            .map(|l| (l.price, format!("{} ({:.2})", l.label(), l.price)))
            .collect(),
    };
    render(cfg, path, &[panel])
}

/// Every CNH cross on one set of axes, JPY scaled by 100 to share the range.
pub fn fx_chart(cfg: &RenderConfig, fx: &FxReport) -> Result<PathBuf, ReportError> {
    let path = cfg.chart_path("FX", "cnh_crosses")?;
    let scaled: Vec<(String, Vec<f64>)> = fx
        .crosses
        .iter()
        .map(|c| {
            if c.currency == "JPY" {
                ("JPY x100".to_string(), c.values.iter().map(|v| v * 100.0).collect())
            } else {
                (c.currency.clone(), c.values.clone())
            }
        })
        .collect();
    let panel = Panel {
        title: "Exchange rates against CNH".to_string(),
        y_desc: "CNH",
        dates: &fx.dates,
        lines: scaled
            .iter()
            .enumerate()
            .map(|(i, (label, values))| Line {
                label: label.clone(),
                values,
                color: PALETTE[i % PALETTE.len()],
            })
            .collect(),
        levels: Vec::new(),
    };
    render(cfg, path, &[panel])
}

/// Grams of gold that a fixed amount of CNY buys.
pub fn gold_chart(cfg: &RenderConfig, gold: &GoldReport) -> Result<PathBuf, ReportError> {
    let path = cfg.chart_path(&gold.contract, "gold")?;
    let panel = Panel {
        title: format!("{} grams per {} CNY", gold.contract, analytics::CNY_BASKET),
        y_desc: "Grams",
        dates: &gold.dates,
        lines: vec![Line {
            label: gold.contract.clone(),
            values: &gold.grams_per_basket,
            color: PALETTE[4],
        }],
        levels: Vec::new(),
    };
    render(cfg, path, &[panel])
}
