//! Empirical Markov transition matrices over discrete market states.
//!
//! First-order rows are indexed by the previous state, second-order rows by the
//! previous two states (`s(t-2) * 6 + s(t-1)`). Rows are row-normalised counts
//! with no smoothing: a row with no observations stays all-zero, and an exact
//! zero probability is the signal the alerting relies on.

use crate::error::AnalyticsError;
use crate::states::StateThresholds;
use core_types::{AlertLevel, MarketState, PriceSeries, STATE_COUNT};
use serde::Serialize;

/// A probability distribution over the next state.
pub type StateProbabilities = [f64; STATE_COUNT];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MatrixOrder {
    First,
    Second,
}

impl MatrixOrder {
    /// Number of history states a row is conditioned on.
    pub fn arity(self) -> usize {
        match self {
            MatrixOrder::First => 1,
            MatrixOrder::Second => 2,
        }
    }

    pub fn row_count(self) -> usize {
        STATE_COUNT.pow(self.arity() as u32)
    }

    /// Shortest state sequence that yields one transition.
    pub fn min_states(self) -> usize {
        self.arity() + 1
    }
}

/// The conditioning history for a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PriorStates {
    First(MarketState),
    /// `(s(t-2), s(t-1))`.
    Second(MarketState, MarketState),
}

impl PriorStates {
    pub fn order(&self) -> MatrixOrder {
        match self {
            PriorStates::First(_) => MatrixOrder::First,
            PriorStates::Second(..) => MatrixOrder::Second,
        }
    }

    pub fn row_index(&self) -> usize {
        match self {
            PriorStates::First(s) => s.index(),
            PriorStates::Second(older, newer) => older.index() * STATE_COUNT + newer.index(),
        }
    }

    /// The prior ending at position `end` (inclusive) of `states`, if there is enough history.
    fn ending_at(order: MatrixOrder, states: &[MarketState], end: usize) -> Option<Self> {
        match order {
            MatrixOrder::First => states.get(end).map(|s| PriorStates::First(*s)),
            MatrixOrder::Second => {
                let older = states.get(end.checked_sub(1)?)?;
                let newer = states.get(end)?;
                Some(PriorStates::Second(*older, *newer))
            }
        }
    }
}

/// A row-stochastic (or all-zero-row) transition matrix.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionMatrix {
    order: MatrixOrder,
    rows: Vec<StateProbabilities>,
}

impl TransitionMatrix {
    pub fn zeros(order: MatrixOrder) -> Self {
        Self {
            order,
            rows: vec![[0.0; STATE_COUNT]; order.row_count()],
        }
    }

    /// Counts transitions in `states` and normalises each row.
    pub fn from_states(order: MatrixOrder, states: &[MarketState]) -> Self {
        let mut matrix = Self::zeros(order);
        if states.len() < order.min_states() {
            return matrix;
        }

        let arity = order.arity();
        for window in states.windows(arity + 1) {
            let row = match order {
                MatrixOrder::First => PriorStates::First(window[0]),
                MatrixOrder::Second => PriorStates::Second(window[0], window[1]),
            }
            .row_index();
            matrix.rows[row][window[arity].index()] += 1.0;
        }

        for row in matrix.rows.iter_mut() {
            let total: f64 = row.iter().sum();
            if total > 0.0 {
                row.iter_mut().for_each(|p| *p /= total);
            }
        }
        matrix
    }

    pub fn order(&self) -> MatrixOrder {
        self.order
    }

    pub fn rows(&self) -> &[StateProbabilities] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&StateProbabilities> {
        self.rows.get(index)
    }

    pub fn is_zero(&self) -> bool {
        self.rows.iter().all(|r| r.iter().all(|p| *p == 0.0))
    }

    /// Next-state distribution for `prior`.
    ///
    /// A missing prior or one of the wrong order yields all zeros and a warning.
    pub fn predict(&self, prior: Option<PriorStates>) -> StateProbabilities {
        let Some(prior) = prior else {
            tracing::warn!(order = ?self.order, "No prior state available; prediction is all zero.");
            return [0.0; STATE_COUNT];
        };
        if prior.order() != self.order {
            tracing::warn!(
                matrix = ?self.order,
                prior = ?prior.order(),
                "Prior order does not match matrix order; prediction is all zero."
            );
            return [0.0; STATE_COUNT];
        }
        self.rows[prior.row_index()]
    }

    /// Prediction from raw state ordinals, as read from external input.
    ///
    /// The wrong number of ordinals or an ordinal outside `0..=5` yields all zeros
    /// and a warning.
    pub fn predict_ordinals(&self, ordinals: &[i64]) -> StateProbabilities {
        if ordinals.len() != self.order.arity() {
            tracing::warn!(
                expected = self.order.arity(),
                got = ordinals.len(),
                "Wrong number of prior states; prediction is all zero."
            );
            return [0.0; STATE_COUNT];
        }
        let states: Option<Vec<MarketState>> = ordinals.iter().map(|o| MarketState::from_index(*o)).collect();
        let Some(states) = states else {
            tracing::warn!(?ordinals, "Prior state out of range; prediction is all zero.");
            return [0.0; STATE_COUNT];
        };
        let prior = match states.as_slice() {
            [s] => PriorStates::First(*s),
            [older, newer] => PriorStates::Second(*older, *newer),
            _ => return [0.0; STATE_COUNT],
        };
        self.predict(Some(prior))
    }
}

/// The returns a matrix is estimated from.
///
/// With `include_latest` this is the last `window` returns; without it, the
/// `window` returns before the most recent one.
pub fn select_window(returns: &[f64], window: usize, include_latest: bool) -> &[f64] {
    let end = if include_latest {
        returns.len()
    } else {
        returns.len().saturating_sub(1)
    };
    let start = end.saturating_sub(window);
    &returns[start..end]
}

/// A matrix together with the state sequence it was counted from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Estimate {
    pub matrix: TransitionMatrix,
    pub states: Vec<MarketState>,
}

/// Estimates a transition matrix over a window of `returns`.
///
/// Too few states for a single transition is not an error: it is logged and the
/// all-zero matrix returned.
pub fn estimate(
    returns: &[f64],
    thresholds: &StateThresholds,
    window: usize,
    order: MatrixOrder,
    include_latest: bool,
) -> Result<Estimate, AnalyticsError> {
    let selected = select_window(returns, window, include_latest);
    let states = thresholds.states_of(selected)?;
    if states.len() < order.min_states() {
        tracing::warn!(
            ?order,
            states = states.len(),
            required = order.min_states(),
            "Not enough states for a transition matrix; using all zeros."
        );
    }
    Ok(Estimate {
        matrix: TransitionMatrix::from_states(order, &states),
        states,
    })
}

/// How likely today's realised state was given the days before it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TodayAnalysis {
    pub realised: MarketState,
    pub first_prior: Option<PriorStates>,
    pub second_prior: Option<PriorStates>,
    pub first_order: StateProbabilities,
    pub second_order: StateProbabilities,
    /// Probability the first-order matrix gave the realised state.
    pub first_probability: f64,
    pub second_probability: f64,
    pub alert: AlertLevel,
}

/// Next-period distributions conditioned on the latest state(s).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TomorrowPrediction {
    pub current: MarketState,
    pub previous: Option<MarketState>,
    pub first_order: StateProbabilities,
    pub second_order: StateProbabilities,
}

impl TomorrowPrediction {
    /// Total probability of an up move (SmallUp or better) under the first-order matrix.
    pub fn up_probability_first(&self) -> f64 {
        up_mass(&self.first_order)
    }

    pub fn up_probability_second(&self) -> f64 {
        up_mass(&self.second_order)
    }

    /// Most likely next state, or `None` when the distribution is all zero.
    pub fn most_likely(probabilities: &StateProbabilities) -> Option<MarketState> {
        let (idx, p) = probabilities
            .iter()
            .enumerate()
            .fold((0, 0.0), |best, (i, p)| if *p > best.1 { (i, *p) } else { best });
        (p > 0.0).then(|| MarketState::ALL[idx])
    }
}

fn up_mass(probabilities: &StateProbabilities) -> f64 {
    MarketState::ALL
        .iter()
        .filter(|s| s.is_up())
        .map(|s| probabilities[s.index()])
        .sum()
}

/// Grades how surprising the realised state was from the two probabilities it was given.
pub fn alert_level(first_probability: f64, second_probability: f64) -> AlertLevel {
    match (first_probability == 0.0, second_probability == 0.0) {
        (true, true) => AlertLevel::Strong,
        (true, false) | (false, true) => AlertLevel::Normal,
        (false, false) => AlertLevel::None,
    }
}

/// The full result of a probability analysis of one symbol.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbabilityReport {
    pub symbol: String,
    pub last_date: Option<chrono::NaiveDate>,
    pub last_return: Option<f64>,
    pub thresholds: StateThresholds,
    /// Matrices excluding the latest observation.
    pub first_matrix_excl: TransitionMatrix,
    pub second_matrix_excl: TransitionMatrix,
    /// Matrices including the latest observation.
    pub first_matrix: TransitionMatrix,
    pub second_matrix: TransitionMatrix,
    pub today: Option<TodayAnalysis>,
    pub tomorrow: TomorrowPrediction,
}

/// Runs the today-analysis and tomorrow-prediction over a daily return series.
#[derive(Debug, Clone, Copy)]
pub struct ProbabilityAnalyzer {
    first_window: usize,
    second_window: usize,
}

impl Default for ProbabilityAnalyzer {
    fn default() -> Self {
        Self::new(60, 360)
    }
}

impl ProbabilityAnalyzer {
    pub fn new(first_window: usize, second_window: usize) -> Self {
        Self {
            first_window,
            second_window,
        }
    }

    pub fn analyze(&self, series: &PriceSeries) -> Result<ProbabilityReport, AnalyticsError> {
        let returns = series.returns();
        let thresholds = StateThresholds::from_returns(&returns)?;
        tracing::info!(
            symbol = series.symbol(),
            bars = returns.len(),
            thresholds = ?thresholds.bounds(),
            "Derived state thresholds."
        );

        let first_excl = estimate(&returns, &thresholds, self.first_window, MatrixOrder::First, false)?;
        let second_excl = estimate(&returns, &thresholds, self.second_window, MatrixOrder::Second, false)?;
        let first_incl = estimate(&returns, &thresholds, self.first_window, MatrixOrder::First, true)?;
        let second_incl = estimate(&returns, &thresholds, self.second_window, MatrixOrder::Second, true)?;

        let all_states = thresholds.states_of(&returns)?;
        let today = Self::today(&all_states, &first_excl.matrix, &second_excl.matrix);
        let tomorrow = Self::tomorrow(&all_states, &first_incl.matrix, &second_incl.matrix);

        if let Some(t) = &today {
            if t.alert != AlertLevel::None {
                tracing::warn!(
                    symbol = series.symbol(),
                    alert = %t.alert,
                    realised = %t.realised,
                    "Today's state was unexpected under recent transitions."
                );
            }
        }

        Ok(ProbabilityReport {
            symbol: series.symbol().to_string(),
            last_date: series.last_date(),
            last_return: returns.last().copied(),
            thresholds,
            first_matrix_excl: first_excl.matrix,
            second_matrix_excl: second_excl.matrix,
            first_matrix: first_incl.matrix,
            second_matrix: second_incl.matrix,
            today,
            tomorrow,
        })
    }

    /// Probability of the realised latest state under matrices that never saw it.
    fn today(
        states: &[MarketState],
        first: &TransitionMatrix,
        second: &TransitionMatrix,
    ) -> Option<TodayAnalysis> {
        let (realised, history) = states.split_last()?;
        let last = history.len().checked_sub(1);
        let first_prior = last.and_then(|end| PriorStates::ending_at(MatrixOrder::First, history, end));
        let second_prior = last.and_then(|end| PriorStates::ending_at(MatrixOrder::Second, history, end));

        let first_order = first.predict(first_prior);
        let second_order = second.predict(second_prior);
        let first_probability = first_order[realised.index()];
        let second_probability = second_order[realised.index()];

        Some(TodayAnalysis {
            realised: *realised,
            first_prior,
            second_prior,
            first_order,
            second_order,
            first_probability,
            second_probability,
            alert: alert_level(first_probability, second_probability),
        })
    }

    /// Distributions for the next period given the latest state(s).
    fn tomorrow(states: &[MarketState], first: &TransitionMatrix, second: &TransitionMatrix) -> TomorrowPrediction {
        let Some(end) = states.len().checked_sub(1) else {
            tracing::warn!("No states available; defaulting current state to SmallUp.");
            return TomorrowPrediction {
                current: MarketState::SmallUp,
                previous: None,
                first_order: [0.0; STATE_COUNT],
                second_order: [0.0; STATE_COUNT],
            };
        };

        TomorrowPrediction {
            current: states[end],
            previous: end.checked_sub(1).map(|i| states[i]),
            first_order: first.predict(PriorStates::ending_at(MatrixOrder::First, states, end)),
            second_order: second.predict(PriorStates::ending_at(MatrixOrder::Second, states, end)),
        }
    }
}
