//! Hyperparameter search with a tree-structured Parzen estimator (TPE).
//!
//! The first `startup_trials` configurations are drawn uniformly from the
//! search space. Afterwards completed trials are split into a "good" group
//! (the best `ceil(γ·√n)`) and the rest. Each parameter is modelled
//! independently: a Parzen mixture `l(x)` fitted to the good values and
//! `g(x)` fitted to the rest. Candidates are drawn from `l` and the one
//! maximising `l(x) / g(x)` is evaluated next.

use std::time::{Duration, Instant};

use rand::{Rng, SeedableRng, distributions::Distribution, rngs::StdRng};
use serde::{Deserialize, Serialize};
use statrs::distribution::{Continuous, ContinuousCDF, Normal};
use tokio_util::sync::CancellationToken;

use super::{
    FeatureTable, ForecastError, ForecastModel, Hyperparameters, SeasonalityMode,
    cv::{CvWindows, cross_validate, fold_cutoffs},
};

/// Fraction (scaled by √n) of trials treated as "good".
const GAMMA: f64 = 0.25;
/// Candidates drawn from `l(x)` per parameter.
const CANDIDATES: usize = 24;
/// Loss recorded for a trial whose fit or cross-validation failed.
pub const FAILED_TRIAL_LOSS: f64 = f64::MAX;

/// Log-uniform range: `exp(U(low, high))`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogUniform {
    pub low: f64,
    pub high: f64,
}

impl LogUniform {
    pub const fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    fn contains(&self, x: f64) -> bool {
        x >= self.low && x <= self.high
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    pub changepoint_prior_scale: LogUniform,
    pub seasonality_prior_scale: LogUniform,
    pub holidays_prior_scale: LogUniform,
    pub seasonality_modes: Vec<SeasonalityMode>,
}

impl Default for SearchSpace {
    fn default() -> Self {
        Self {
            changepoint_prior_scale: LogUniform::new(-3.0, 0.0),
            seasonality_prior_scale: LogUniform::new(-2.0, 1.0),
            holidays_prior_scale: LogUniform::new(-2.0, 0.0),
            seasonality_modes: SeasonalityMode::ALL.to_vec(),
        }
    }
}

impl SearchSpace {
    pub fn validate(&self) -> Result<(), ForecastError> {
        for (name, range) in [
            ("changepoint_prior_scale", self.changepoint_prior_scale),
            ("seasonality_prior_scale", self.seasonality_prior_scale),
            ("holidays_prior_scale", self.holidays_prior_scale),
        ] {
            if !(range.low.is_finite() && range.high.is_finite() && range.low < range.high) {
                return Err(ForecastError::InvalidParameter(format!(
                    "{name} range must satisfy low < high, got [{}, {}]",
                    range.low, range.high
                )));
            }
        }
        if self.seasonality_modes.is_empty() {
            return Err(ForecastError::InvalidParameter(
                "at least one seasonality mode is required".to_string(),
            ));
        }
        Ok(())
    }

    fn ranges(&self) -> [LogUniform; 3] {
        [
            self.changepoint_prior_scale,
            self.seasonality_prior_scale,
            self.holidays_prior_scale,
        ]
    }
}

/// Limits on a search run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchBudget {
    pub max_evals: usize,
    /// Random trials before the estimator takes over.
    pub startup_trials: usize,
    /// Wall-clock limit; checked between trials.
    pub timeout: Option<Duration>,
    /// Fixed seed for a reproducible search.
    pub seed: Option<u64>,
}

impl Default for SearchBudget {
    fn default() -> Self {
        Self {
            max_evals: 30,
            startup_trials: 10,
            timeout: None,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trial {
    pub index: usize,
    pub params: Hyperparameters,
    pub loss: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Trial {
    pub fn is_feasible(&self) -> bool {
        self.error.is_none() && self.loss.is_finite() && self.loss < FAILED_TRIAL_LOSS
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    BudgetExhausted,
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchOutcome {
    pub best: Hyperparameters,
    pub best_loss: f64,
    pub trials: Vec<Trial>,
    pub stop_reason: StopReason,
}

/// Minimise `objective` over `space`.
///
/// A trial whose objective fails is recorded with [`FAILED_TRIAL_LOSS`] and the
/// search continues. Fails with [`ForecastError::NoFeasibleTrial`] when no
/// trial succeeded and with [`ForecastError::Cancelled`] when `cancel` fires.
pub fn minimize<F>(
    space: &SearchSpace,
    budget: &SearchBudget,
    cancel: &CancellationToken,
    mut objective: F,
    mut on_trial: impl FnMut(&Trial),
) -> Result<SearchOutcome, ForecastError>
where
    F: FnMut(&Hyperparameters) -> Result<f64, ForecastError>,
{
    space.validate()?;
    if budget.max_evals == 0 {
        return Err(ForecastError::InvalidParameter(
            "max_evals must be > 0".to_string(),
        ));
    }

    let mut rng = match budget.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let started = Instant::now();
    let mut trials: Vec<Trial> = Vec::with_capacity(budget.max_evals);
    let mut stop_reason = StopReason::BudgetExhausted;

    for index in 0..budget.max_evals {
        if cancel.is_cancelled() {
            tracing::info!(completed = trials.len(), "Hyperparameter search cancelled");
            return Err(ForecastError::Cancelled);
        }
        if let Some(timeout) = budget.timeout
            && index > 0
            && started.elapsed() >= timeout
        {
            stop_reason = StopReason::TimedOut;
            break;
        }

        let params = if index < budget.startup_trials {
            sample_prior(space, &mut rng)
        } else {
            suggest(space, &trials, &mut rng)
        };

        let trial = match objective(&params) {
            Ok(loss) if loss.is_finite() => Trial {
                index,
                params,
                loss,
                error: None,
            },
            Ok(loss) => Trial {
                index,
                params,
                loss: FAILED_TRIAL_LOSS,
                error: Some(format!("objective returned non-finite loss {loss}")),
            },
            Err(e) => Trial {
                index,
                params,
                loss: FAILED_TRIAL_LOSS,
                error: Some(e.to_string()),
            },
        };

        match &trial.error {
            None => tracing::debug!(trial = index, loss = trial.loss, ?params, "Trial complete"),
            Some(error) => tracing::warn!(trial = index, %error, ?params, "Trial failed"),
        }
        on_trial(&trial);
        trials.push(trial);
    }

    if stop_reason == StopReason::TimedOut {
        tracing::warn!(
            completed = trials.len(),
            budget = budget.max_evals,
            "Hyperparameter search timed out"
        );
    }

    let best = trials
        .iter()
        .filter(|t| t.is_feasible())
        .min_by(|a, b| a.loss.total_cmp(&b.loss))
        .ok_or(ForecastError::NoFeasibleTrial)?;

    Ok(SearchOutcome {
        best: best.params,
        best_loss: best.loss,
        stop_reason,
        trials,
    })
}

/// Search for the hyperparameters with the lowest cross-validated RMSE.
///
/// Each trial fits `table` in full, then runs rolling-origin
/// cross-validation and reports the mean fold RMSE as its loss. The
/// full-history fit only decides feasibility: parameters that cannot be
/// fitted on the whole table fail the trial even when every shorter fold
/// fits. Its model is discarded.
#[tracing::instrument(
    name = "forecast.search",
    skip_all,
    fields(rows = table.len(), max_evals = budget.max_evals, seed = ?budget.seed)
)]
pub fn tune(
    table: &FeatureTable,
    space: &SearchSpace,
    budget: &SearchBudget,
    windows: &CvWindows,
    cancel: &CancellationToken,
    on_trial: impl FnMut(&Trial),
) -> Result<SearchOutcome, ForecastError> {
    windows.validate()?;
    // Every trial would fail identically without at least one fold.
    fold_cutoffs(table, windows)?;

    let outcome = minimize(
        space,
        budget,
        cancel,
        |params| {
            ForecastModel::fit(table, params)?;
            cross_validate(table, params, windows).map(|report| report.mean_rmse)
        },
        on_trial,
    )?;

    tracing::info!(
        best_loss = outcome.best_loss,
        trials = outcome.trials.len(),
        best = ?outcome.best,
        "Hyperparameter search complete"
    );
    Ok(outcome)
}

fn sample_prior(space: &SearchSpace, rng: &mut StdRng) -> Hyperparameters {
    let [cps, sps, hps] = space.ranges().map(|r| rng.gen_range(r.low..=r.high));
    let mode = space.seasonality_modes[rng.gen_range(0..space.seasonality_modes.len())];
    to_params([cps, sps, hps], mode)
}

fn to_params(logs: [f64; 3], mode: SeasonalityMode) -> Hyperparameters {
    Hyperparameters {
        changepoint_prior_scale: logs[0].exp(),
        seasonality_prior_scale: logs[1].exp(),
        holidays_prior_scale: logs[2].exp(),
        seasonality_mode: mode,
    }
}

fn log_values(params: &Hyperparameters) -> [f64; 3] {
    [
        params.changepoint_prior_scale.ln(),
        params.seasonality_prior_scale.ln(),
        params.holidays_prior_scale.ln(),
    ]
}

fn suggest(space: &SearchSpace, trials: &[Trial], rng: &mut StdRng) -> Hyperparameters {
    if trials.is_empty() {
        return sample_prior(space, rng);
    }

    let mut ranked: Vec<&Trial> = trials.iter().collect();
    ranked.sort_by(|a, b| a.loss.total_cmp(&b.loss));
    let n_below = ((GAMMA * (ranked.len() as f64).sqrt()).ceil() as usize).clamp(1, ranked.len());
    let (below, above) = ranked.split_at(n_below);

    let ranges = space.ranges();
    let mut logs = [0.0; 3];
    for (slot, range) in ranges.iter().enumerate() {
        let good: Vec<f64> = below.iter().map(|t| log_values(&t.params)[slot]).collect();
        let bad: Vec<f64> = above.iter().map(|t| log_values(&t.params)[slot]).collect();
        let l = Parzen::fit(&good, *range);
        let g = Parzen::fit(&bad, *range);

        logs[slot] = (0..CANDIDATES)
            .map(|_| l.sample(rng))
            .map(|x| (x, l.log_density(x) - g.log_density(x)))
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map_or_else(|| rng.gen_range(range.low..=range.high), |(x, _)| x);
    }

    let mode = suggest_mode(&space.seasonality_modes, below, above, rng);
    to_params(logs, mode)
}

fn suggest_mode(
    modes: &[SeasonalityMode],
    below: &[&Trial],
    above: &[&Trial],
    rng: &mut StdRng,
) -> SeasonalityMode {
    // Add-one smoothed category frequencies.
    let probabilities = |group: &[&Trial]| -> Vec<f64> {
        let total = group.len() as f64 + modes.len() as f64;
        modes
            .iter()
            .map(|m| {
                let count = group.iter().filter(|t| t.params.seasonality_mode == *m).count();
                (count as f64 + 1.0) / total
            })
            .collect()
    };
    let l = probabilities(below);
    let g = probabilities(above);

    let mut best = (modes[0], f64::NEG_INFINITY);
    for _ in 0..CANDIDATES {
        let mut u: f64 = rng.gen_range(0.0..1.0);
        let mut pick = modes.len() - 1;
        for (i, p) in l.iter().enumerate() {
            if u < *p {
                pick = i;
                break;
            }
            u -= p;
        }
        let score = l[pick] / g[pick];
        if score > best.1 {
            best = (modes[pick], score);
        }
    }
    best.0
}

/// Mixture of truncated normals over one log-scaled parameter, with one
/// component per observation plus a broad prior component.
struct Parzen {
    range: LogUniform,
    components: Vec<Kernel>,
}

struct Kernel {
    mu: f64,
    normal: Normal,
    /// Probability mass of `normal` inside the range.
    mass: f64,
}

impl Kernel {
    fn new(mu: f64, sigma: f64, range: LogUniform) -> Option<Self> {
        let normal = Normal::new(mu, sigma).ok()?;
        let mass = normal.cdf(range.high) - normal.cdf(range.low);
        Some(Self { mu, normal, mass })
    }
}

impl Parzen {
    fn fit(observations: &[f64], range: LogUniform) -> Self {
        let prior_mu = 0.5 * (range.low + range.high);
        let prior_sigma = range.high - range.low;

        let mut mus: Vec<f64> = observations
            .iter()
            .copied()
            .filter(|x| range.contains(*x))
            .collect();
        mus.sort_by(f64::total_cmp);

        // Bandwidths come from the distance to the neighbouring points,
        // counting the prior mean as a point.
        let mut points = mus.clone();
        points.push(prior_mu);
        points.sort_by(f64::total_cmp);
        let min_sigma = prior_sigma / (1.0 + points.len() as f64).min(100.0);

        let components = mus
            .iter()
            .map(|mu| {
                let i = points.partition_point(|p| p < mu);
                let left = if i > 0 { mu - points[i - 1] } else { mu - range.low };
                let right = points.get(i + 1).map_or(range.high - mu, |p| p - mu);
                (*mu, left.max(right).clamp(min_sigma, prior_sigma))
            })
            .chain([(prior_mu, prior_sigma)])
            .filter_map(|(mu, sigma)| Kernel::new(mu, sigma, range))
            .collect();

        Self { range, components }
    }

    fn sample(&self, rng: &mut StdRng) -> f64 {
        if self.components.is_empty() {
            return 0.5 * (self.range.low + self.range.high);
        }
        let kernel = &self.components[rng.gen_range(0..self.components.len())];
        for _ in 0..32 {
            let x = kernel.normal.sample(rng);
            if self.range.contains(x) {
                return x;
            }
        }
        kernel.mu.clamp(self.range.low, self.range.high)
    }

    fn log_density(&self, x: f64) -> f64 {
        let weight = 1.0 / self.components.len().max(1) as f64;
        let density: f64 = self
            .components
            .iter()
            .map(|k| weight * k.normal.pdf(x) / k.mass.max(1e-12))
            .sum();
        density.max(f64::MIN_POSITIVE).ln()
    }
}
