use crate::error::AnalyticsError;
use chrono::{Datelike, NaiveDate};
use core_types::{Frequency, PriceSeries};
use rustfft::{FftPlanner, num_complex::Complex};
use serde::Serialize;

/// One retained frequency bin of the residual spectrum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CycleComponent {
    pub bin: usize,
    /// Cycle length in bars, `n / bin`.
    pub period: f64,
    /// Peak amplitude of the reconstructed sinusoid, `2|X| / n`.
    pub amplitude: f64,
}

/// A linear trend plus the strongest residual cycles.
#[derive(Debug, Clone, Serialize)]
pub struct FftDecomposition {
    pub symbol: String,
    pub frequency: Frequency,
    pub dates: Vec<NaiveDate>,
    pub closes: Vec<f64>,
    pub slope: f64,
    pub intercept: f64,
    pub trend: Vec<f64>,
    /// Close minus trend.
    pub residuals: Vec<f64>,
    /// Zero-mean reconstruction from the retained bins.
    pub cycles: Vec<f64>,
    /// `trend + cycles`.
    pub combined: Vec<f64>,
    pub components: Vec<CycleComponent>,
}

/// Ordinary least-squares line through `(xs, ys)`. Returns `(slope, intercept)`.
pub fn linear_fit(xs: &[f64], ys: &[f64]) -> Option<(f64, f64)> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let n = xs.len() as f64;
    let mx = xs.iter().sum::<f64>() / n;
    let my = ys.iter().sum::<f64>() / n;
    let sxx: f64 = xs.iter().map(|x| (x - mx).powi(2)).sum();
    if sxx == 0.0 {
        return None;
    }
    let sxy: f64 = xs.iter().zip(ys).map(|(x, y)| (x - mx) * (y - my)).sum();
    let slope = sxy / sxx;
    Some((slope, my - slope * mx))
}

/// Picks the `count` largest bins over the whole spectrum, then keeps the
/// non-DC ones in the positive half (`1..=n/2`).
fn select_bins(amplitudes: &[f64], count: usize) -> Vec<usize> {
    let n = amplitudes.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|a, b| amplitudes[*a].total_cmp(&amplitudes[*b]).then(a.cmp(b)));

    let mut bins: Vec<usize> = order
        .into_iter()
        .rev()
        .take(count)
        .filter(|i| *i != 0 && *i <= n / 2)
        .collect();
    bins.sort_unstable();
    bins
}

#[derive(Debug, Clone, Copy)]
pub struct FftAnalyzer {
    num_components: usize,
}

impl FftAnalyzer {
    pub fn new(num_components: usize) -> Self {
        Self { num_components }
    }

    pub fn analyze(&self, series: &PriceSeries) -> Result<FftDecomposition, AnalyticsError> {
        if self.num_components == 0 {
            return Err(AnalyticsError::InvalidParameter("num_components must be positive".to_string()));
        }
        let n = series.len();
        if n < 4 {
            return Err(AnalyticsError::NotEnoughData(format!("{} bars is too few for a spectrum", n)));
        }

        let dates = series.dates();
        let closes = series.closes();
        if closes.iter().any(|c| !c.is_finite()) {
            return Err(AnalyticsError::NonFiniteInput(format!("{} closes", series.symbol())));
        }

        let ordinals: Vec<f64> = dates.iter().map(|d| f64::from(d.num_days_from_ce())).collect();
        let (slope, intercept) = linear_fit(&ordinals, &closes)
            .ok_or_else(|| AnalyticsError::NotEnoughData("dates do not span a range".to_string()))?;
        let trend: Vec<f64> = ordinals.iter().map(|x| slope * x + intercept).collect();
        let residuals: Vec<f64> = closes.iter().zip(&trend).map(|(c, t)| c - t).collect();

        let mut planner = FftPlanner::<f64>::new();
        let mut spectrum: Vec<Complex<f64>> = residuals.iter().map(|r| Complex::new(*r, 0.0)).collect();
        planner.plan_fft_forward(n).process(&mut spectrum);

        let amplitudes: Vec<f64> = spectrum.iter().map(|c| c.norm()).collect();
        let bins = select_bins(&amplitudes, self.num_components);

        let mut filtered = vec![Complex::new(0.0, 0.0); n];
        for &i in &bins {
            filtered[i] = spectrum[i];
            filtered[(n - i) % n] = spectrum[(n - i) % n];
        }
        planner.plan_fft_inverse(n).process(&mut filtered);

        // rustfft leaves the inverse unnormalised.
        let mut cycles: Vec<f64> = filtered.iter().map(|c| c.re / n as f64).collect();
        let cycle_mean = cycles.iter().sum::<f64>() / n as f64;
        cycles.iter_mut().for_each(|c| *c -= cycle_mean);

        let combined = trend.iter().zip(&cycles).map(|(t, c)| t + c).collect();
        let components = bins
            .iter()
            .map(|&bin| CycleComponent {
                bin,
                period: n as f64 / bin as f64,
                amplitude: 2.0 * amplitudes[bin] / n as f64,
            })
            .collect::<Vec<_>>();

        tracing::info!(
            symbol = series.symbol(),
            frequency = %series.frequency(),
            periods = ?components.iter().map(|c| c.period).collect::<Vec<_>>(),
            "FFT decomposition complete."
        );

        Ok(FftDecomposition {
            symbol: series.symbol().to_string(),
            frequency: series.frequency(),
            dates,
            closes,
            slope,
            intercept,
            trend,
            residuals,
            cycles,
            combined,
            components,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use core_types::PriceBar;

    fn series(closes: &[f64]) -> PriceSeries {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, c)| PriceBar {
                trade_date: start + Duration::days(i as i64),
                open: *c,
                high: *c,
                low: *c,
                close: *c,
                pct_chg: 0.0,
                vol: 0.0,
            })
            .collect();
        PriceSeries::new("SYN", Frequency::Daily, bars)
    }

    #[test]
    fn linear_fit_recovers_line() {
        let xs = [1.0, 2.0, 3.0, 4.0];
        let ys = [3.0, 5.0, 7.0, 9.0];
        let (slope, intercept) = linear_fit(&xs, &ys).unwrap();
        assert!((slope - 2.0).abs() < 1e-12);
        assert!((intercept - 1.0).abs() < 1e-12);
        assert!(linear_fit(&[1.0, 1.0], &[1.0, 2.0]).is_none());
    }

    #[test]
    fn finds_the_dominant_cycle() {
        let n = 256;
        let period = 32.0;
        let closes: Vec<f64> = (0..n)
            .map(|i| 100.0 + 0.5 * i as f64 + 10.0 * (std::f64::consts::TAU * i as f64 / period).sin())
            .collect();
        let result = FftAnalyzer::new(2).analyze(&series(&closes)).unwrap();

        assert_eq!(result.components.len(), 1);
        assert!((result.components[0].period - period).abs() < 1e-9);
        assert_eq!(result.combined.len(), n);
        let cycle_mean: f64 = result.cycles.iter().sum::<f64>() / n as f64;
        assert!(cycle_mean.abs() < 1e-9);
    }

    #[test]
    fn bin_selection_drops_dc_and_mirror() {
        let amplitudes = [100.0, 5.0, 1.0, 0.5, 1.0, 5.0];
        assert_eq!(select_bins(&amplitudes, 3), vec![1]);
        assert_eq!(select_bins(&amplitudes, 5), vec![1, 2]);
    }

    #[test]
    fn rejects_short_series() {
        assert!(FftAnalyzer::new(3).analyze(&series(&[1.0, 2.0])).is_err());
        assert!(FftAnalyzer::new(0).analyze(&series(&[1.0; 10])).is_err());
    }
}
