//! Trend plus modulated-oscillation curve fit.
//!
//! The model is `f(x) = a*x + (b*x + c) * sin(k*x + q) + d` over the integer
//! trading-period index `x = 0, 1, ...`. Parameters are fitted by
//! Levenberg-Marquardt on the analytic Jacobian with Marquardt's diagonal
//! scaling, starting from a frequency-specific seed.

use crate::error::AnalyticsError;
use crate::stats::{mean, percentile_rank, std_dev};
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use core_types::{Frequency, PriceSeries};
use nalgebra::{Matrix6, Vector6};
use serde::Serialize;

/// Number of free parameters in the model.
pub const PARAM_COUNT: usize = 6;

const MIN_LAMBDA: f64 = 1e-15;
const MAX_LAMBDA: f64 = 1e16;

/// Fitted `(a, b, c, k, q, d)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HarmonicParams {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub k: f64,
    pub q: f64,
    pub d: f64,
}

impl HarmonicParams {
    pub fn from_array(p: [f64; PARAM_COUNT]) -> Self {
        Self {
            a: p[0],
            b: p[1],
            c: p[2],
            k: p[3],
            q: p[4],
            d: p[5],
        }
    }

    pub fn to_array(&self) -> [f64; PARAM_COUNT] {
        [self.a, self.b, self.c, self.k, self.q, self.d]
    }

    pub fn value(&self, x: f64) -> f64 {
        self.a * x + (self.b * x + self.c) * (self.k * x + self.q).sin() + self.d
    }

    /// Period of the oscillation in bars, if `k` is non-zero.
    pub fn period(&self) -> Option<f64> {
        (self.k != 0.0).then(|| std::f64::consts::TAU / self.k.abs())
    }
}

/// Stopping rules for the optimiser. Defaults follow the usual MINPACK settings.
#[derive(Debug, Clone, Copy)]
pub struct FitOptions {
    pub max_evaluations: usize,
    pub ftol: f64,
    pub xtol: f64,
    pub gtol: f64,
    pub initial_lambda: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_evaluations: 200 * (PARAM_COUNT + 1),
            ftol: 1.49e-8,
            xtol: 1.49e-8,
            gtol: 1e-10,
            initial_lambda: 1e-3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FitOutcome {
    pub params: HarmonicParams,
    /// Half the sum of squared residuals at the solution.
    pub cost: f64,
    pub evaluations: usize,
    pub iterations: usize,
}

fn model(p: &Vector6<f64>, x: f64) -> f64 {
    p[0] * x + (p[1] * x + p[2]) * (p[3] * x + p[4]).sin() + p[5]
}

/// Partial derivatives of the model with respect to each parameter at `x`.
fn gradient(p: &Vector6<f64>, x: f64) -> Vector6<f64> {
    let theta = p[3] * x + p[4];
    let (sin, cos) = theta.sin_cos();
    let amplitude = p[1] * x + p[2];
    Vector6::new(x, x * sin, sin, amplitude * cos * x, amplitude * cos, 1.0)
}

/// `model - observed` for every point.
fn residuals(p: &Vector6<f64>, ys: &[f64]) -> Vec<f64> {
    ys.iter().enumerate().map(|(i, y)| model(p, i as f64) - y).collect()
}

fn half_sum_sq(r: &[f64]) -> f64 {
    0.5 * r.iter().map(|v| v * v).sum::<f64>()
}

/// `(JᵀJ, Jᵀr)` at `p`.
fn normal_equations(p: &Vector6<f64>, r: &[f64]) -> (Matrix6<f64>, Vector6<f64>) {
    let mut jtj = Matrix6::zeros();
    let mut jtr = Vector6::zeros();
    for (i, ri) in r.iter().enumerate() {
        let row = gradient(p, i as f64);
        jtj += row * row.transpose();
        jtr += row * *ri;
    }
    (jtj, jtr)
}

fn solve(a: Matrix6<f64>, b: &Vector6<f64>) -> Option<Vector6<f64>> {
    match a.cholesky() {
        Some(chol) => Some(chol.solve(b)),
        None => a.lu().solve(b),
    }
    .filter(|step| step.iter().all(|v| v.is_finite()))
}

fn check_input(ys: &[f64]) -> Result<(), AnalyticsError> {
    if ys.len() < PARAM_COUNT + 1 {
        return Err(AnalyticsError::FitConvergence(format!(
            "{} points is fewer than the {} required",
            ys.len(),
            PARAM_COUNT + 1
        )));
    }
    if let Some(pos) = ys.iter().position(|y| !y.is_finite()) {
        return Err(AnalyticsError::FitConvergence(format!("point #{} is {}", pos, ys[pos])));
    }
    if ys.iter().all(|y| *y == ys[0]) {
        return Err(AnalyticsError::FitConvergence("series is constant".to_string()));
    }
    Ok(())
}

/// Least-squares fit of the model to `ys` (indexed 0..n) from `seed`.
pub fn fit(ys: &[f64], seed: [f64; PARAM_COUNT], options: &FitOptions) -> Result<FitOutcome, AnalyticsError> {
    check_input(ys)?;

    let mut params = Vector6::from(seed);
    let mut r = residuals(&params, ys);
    let mut evaluations = 1;
    let mut cost = half_sum_sq(&r);
    if !cost.is_finite() {
        return Err(AnalyticsError::FitConvergence("seed gives non-finite model values".to_string()));
    }

    let mut lambda = options.initial_lambda;
    let mut iterations = 0;
    while cost > 0.0 {
        iterations += 1;
        let (jtj, jtr) = normal_equations(&params, &r);

        // Cosine of the angle between the residual and each Jacobian column.
        let r_norm = (2.0 * cost).sqrt();
        let g_norm = (0..PARAM_COUNT)
            .filter(|j| jtj[(*j, *j)] > 0.0)
            .map(|j| jtr[j].abs() / (jtj[(j, j)].sqrt() * r_norm))
            .fold(0.0, f64::max);
        if g_norm <= options.gtol {
            break;
        }

        let scale = Vector6::from_fn(|j, _| jtj[(j, j)].max(f64::MIN_POSITIVE));
        let rhs = -jtr;
        let converged = loop {
            let mut damped = jtj;
            for j in 0..PARAM_COUNT {
                damped[(j, j)] += lambda * scale[j];
            }

            if let Some(step) = solve(damped, &rhs) {
                if evaluations >= options.max_evaluations {
                    return Err(AnalyticsError::FitConvergence(format!(
                        "no convergence within {} evaluations (cost {:.6e})",
                        options.max_evaluations, cost
                    )));
                }
                let trial = params + step;
                let trial_r = residuals(&trial, ys);
                evaluations += 1;
                let trial_cost = half_sum_sq(&trial_r);

                if trial_cost.is_finite() && trial_cost < cost {
                    let small_f = cost - trial_cost <= options.ftol * cost;
                    let small_x = step.norm() <= options.xtol * (options.xtol + params.norm());
                    params = trial;
                    r = trial_r;
                    cost = trial_cost;
                    lambda = (lambda * 0.3).max(MIN_LAMBDA);
                    break small_f || small_x;
                }
            }

            lambda *= 10.0;
            if lambda > MAX_LAMBDA {
                // No downhill step exists at any damping: a (local) minimum.
                break true;
            }
        };
        if converged {
            break;
        }
    }

    let params = HarmonicParams::from_array([params[0], params[1], params[2], params[3], params[4], params[5]]);
    tracing::debug!(?params, cost, evaluations, iterations, "Harmonic fit converged.");
    Ok(FitOutcome {
        params,
        cost,
        evaluations,
        iterations,
    })
}

/// Where the latest close sits relative to the fit's historical residuals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResidualDiagnostics {
    pub mean: f64,
    /// Population standard deviation.
    pub std: f64,
    /// Residual (close minus fit) of the latest bar.
    pub current: f64,
    /// `(current - mean) / std`, or 0 when the residuals do not vary.
    pub z_score: f64,
    /// Percentile rank of `current` among all residuals, 0 to 100.
    pub percentile: f64,
}

impl ResidualDiagnostics {
    pub fn from_residuals(residuals: &[f64]) -> Option<Self> {
        let current = *residuals.last()?;
        let mean = mean(residuals)?;
        let std = std_dev(residuals, 0)?;
        let z_score = if std > 0.0 { (current - mean) / std } else { 0.0 };
        Some(Self {
            mean,
            std,
            current,
            z_score,
            percentile: percentile_rank(residuals, current),
        })
    }
}

/// The complete harmonic analysis of one series at one frequency.
#[derive(Debug, Clone, Serialize)]
pub struct HarmonicAnalysis {
    pub symbol: String,
    pub frequency: Frequency,
    pub params: HarmonicParams,
    pub outcome: FitOutcome,
    pub dates: Vec<NaiveDate>,
    pub closes: Vec<f64>,
    /// Close minus fit over the observed bars.
    pub residuals: Vec<f64>,
    /// Observed dates followed by `projection_offset` future periods.
    pub projection_dates: Vec<NaiveDate>,
    /// The fitted curve over `projection_dates`.
    pub projection: Vec<f64>,
    pub diagnostics: ResidualDiagnostics,
}

impl HarmonicAnalysis {
    pub fn projected_end(&self) -> Option<(NaiveDate, f64)> {
        Some((*self.projection_dates.last()?, *self.projection.last()?))
    }
}

/// Fits a series with one seed and projects the curve forward.
#[derive(Debug, Clone)]
pub struct HarmonicFitter {
    seed: [f64; PARAM_COUNT],
    projection_offset: usize,
    options: FitOptions,
}

impl HarmonicFitter {
    pub fn new(seed: [f64; PARAM_COUNT], projection_offset: usize) -> Self {
        Self {
            seed,
            projection_offset,
            options: FitOptions::default(),
        }
    }

    pub fn with_options(mut self, options: FitOptions) -> Self {
        self.options = options;
        self
    }

    pub fn analyze(&self, series: &PriceSeries) -> Result<HarmonicAnalysis, AnalyticsError> {
        let closes = series.closes();
        let outcome = fit(&closes, self.seed, &self.options)?;
        let params = outcome.params;

        let residuals: Vec<f64> = closes
            .iter()
            .enumerate()
            .map(|(i, y)| y - params.value(i as f64))
            .collect();
        let diagnostics = ResidualDiagnostics::from_residuals(&residuals)
            .ok_or_else(|| AnalyticsError::NotEnoughData("no residuals".to_string()))?;

        let dates = series.dates();
        let mut projection_dates = dates.clone();
        if let Some(last) = series.last_date() {
            projection_dates.extend(future_dates(last, series.frequency(), self.projection_offset));
        }
        let projection = (0..projection_dates.len()).map(|i| params.value(i as f64)).collect();

        tracing::info!(
            symbol = series.symbol(),
            frequency = %series.frequency(),
            z_score = diagnostics.z_score,
            percentile = diagnostics.percentile,
            "Harmonic fit complete."
        );

        Ok(HarmonicAnalysis {
            symbol: series.symbol().to_string(),
            frequency: series.frequency(),
            params,
            outcome,
            dates,
            closes,
            residuals,
            projection_dates,
            projection,
            diagnostics,
        })
    }
}

/// The next `count` period dates after `last`: weekdays for daily data, every
/// seventh day for weekly data. Exchange holidays are not modelled.
pub fn future_dates(last: NaiveDate, frequency: Frequency, count: usize) -> Vec<NaiveDate> {
    let mut dates = Vec::with_capacity(count);
    let mut current = last;
    while dates.len() < count {
        current = match frequency {
            Frequency::Weekly => current + Duration::days(7),
            Frequency::Daily => {
                let mut next = current + Duration::days(1);
                while matches!(next.weekday(), Weekday::Sat | Weekday::Sun) {
                    next += Duration::days(1);
                }
                next
            }
        };
        dates.push(current);
    }
    dates
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::PriceBar;

    fn synthetic(params: [f64; PARAM_COUNT], n: usize) -> Vec<f64> {
        let p = HarmonicParams::from_array(params);
        (0..n).map(|i| p.value(i as f64)).collect()
    }

    fn assert_relative(actual: [f64; PARAM_COUNT], expected: [f64; PARAM_COUNT], tol: f64) {
        for (a, e) in actual.iter().zip(expected) {
            assert!(((a - e) / e).abs() < tol, "{} vs {}", a, e);
        }
    }

    #[test]
    fn recovers_noise_free_parameters() {
        let truth = [0.5, 0.02, 50.0, 0.05, 1.0, 1000.0];
        let ys = synthetic(truth, 400);
        let seed = [0.45, 0.018, 45.0, 0.0502, 0.95, 990.0];

        let outcome = fit(&ys, seed, &FitOptions::default()).unwrap();
        assert_relative(outcome.params.to_array(), truth, 1e-3);
        assert!(outcome.evaluations <= FitOptions::default().max_evaluations);
    }

    #[test]
    fn recovers_daily_scale_parameters() {
        let truth = [0.44, -0.06, -592.09, 0.0045, 0.43, 1303.89];
        let ys: Vec<f64> = {
            let p = HarmonicParams::from_array(truth);
            (0..1000).map(|i| p.value(i as f64 * 3.0)).collect()
        };
        // Same curve sampled every third bar is the curve with k, a, b scaled by 3.
        let truth_scaled = [truth[0] * 3.0, truth[1] * 3.0, truth[2], truth[3] * 3.0, truth[4], truth[5]];
        let seed = [1.2, -0.15, -560.0, 0.01356, 0.45, 1250.0];

        let outcome = fit(&ys, seed, &FitOptions::default()).unwrap();
        assert_relative(outcome.params.to_array(), truth_scaled, 1e-3);
    }

    #[test]
    fn rejects_short_constant_and_non_finite_input() {
        let seed = [0.0, 0.0, 1.0, 0.1, 0.0, 0.0];
        let opts = FitOptions::default();
        assert!(matches!(fit(&[1.0; 6], seed, &opts), Err(AnalyticsError::FitConvergence(_))));
        assert!(matches!(fit(&[5.0; 50], seed, &opts), Err(AnalyticsError::FitConvergence(_))));
        let mut ys = synthetic([0.1, 0.0, 1.0, 0.1, 0.0, 0.0], 50);
        ys[10] = f64::NAN;
        assert!(matches!(fit(&ys, seed, &opts), Err(AnalyticsError::FitConvergence(_))));
    }

    #[test]
    fn tiny_budget_is_a_convergence_error() {
        let ys = synthetic([0.5, 0.02, 50.0, 0.05, 1.0, 1000.0], 200);
        let opts = FitOptions {
            max_evaluations: 2,
            ..FitOptions::default()
        };
        let err = fit(&ys, [0.0, 0.0, 1.0, 0.2, 0.0, 0.0], &opts).unwrap_err();
        assert!(matches!(err, AnalyticsError::FitConvergence(_)));
    }

    #[test]
    fn residual_percentile_extremes() {
        let max_last = ResidualDiagnostics::from_residuals(&[1.0, -2.0, 0.5, 3.0]).unwrap();
        assert_eq!(max_last.percentile, 100.0);
        assert!(max_last.z_score > 0.0);
        let min_last = ResidualDiagnostics::from_residuals(&[1.0, -2.0, 0.5, -3.0]).unwrap();
        assert_eq!(min_last.percentile, 0.0);
        let flat = ResidualDiagnostics::from_residuals(&[2.0, 2.0]).unwrap();
        assert_eq!(flat.z_score, 0.0);
    }

    #[test]
    fn future_dates_skip_weekends() {
        let friday = NaiveDate::from_ymd_opt(2024, 6, 7).unwrap();
        let daily = future_dates(friday, Frequency::Daily, 3);
        assert_eq!(daily[0], NaiveDate::from_ymd_opt(2024, 6, 10).unwrap());
        assert_eq!(daily[2], NaiveDate::from_ymd_opt(2024, 6, 12).unwrap());
        let weekly = future_dates(friday, Frequency::Weekly, 2);
        assert_eq!(weekly[1], NaiveDate::from_ymd_opt(2024, 6, 21).unwrap());
    }

    #[test]
    fn analysis_projects_past_the_last_bar() {
        let truth = [0.5, 0.02, 50.0, 0.05, 1.0, 1000.0];
        let start = NaiveDate::from_ymd_opt(2020, 1, 6).unwrap();
        let bars = future_dates(start, Frequency::Weekly, 300)
            .into_iter()
            .zip(synthetic(truth, 300))
            .map(|(trade_date, close)| PriceBar {
                trade_date,
                open: close,
                high: close,
                low: close,
                close,
                pct_chg: 0.0,
                vol: 0.0,
            })
            .collect();
        let series = PriceSeries::new("SYN", Frequency::Weekly, bars);

        let analysis = HarmonicFitter::new([0.45, 0.018, 45.0, 0.0502, 0.95, 990.0], 100)
            .analyze(&series)
            .unwrap();
        assert_eq!(analysis.projection.len(), 400);
        assert_eq!(analysis.projection_dates.len(), 400);
        assert_eq!(analysis.residuals.len(), 300);
        assert!(analysis.diagnostics.std < 1e-6);
    }
}
