//! Revenue forecast model backed by the Prophet implementation in `augurs`.
//!
//! Prophet fits a piecewise-linear trend (25 changepoints over the first 80%
//! of history), yearly and weekly Fourier seasonality and one linear effect
//! per regressor column as a MAP estimate:
//!
//! ```text
//! additive:        y(t) = trend(t) + seasonal(t) + regressors(t)
//! multiplicative:  y(t) = trend(t) * (1 + seasonal(t) + regressors(t))
//! ```
//!
//! This wrapper owns what Prophet does not: holding non-calendar regressors
//! at their last known value when predicting, range and schema checks, the
//! prediction interval and the versioned artifact.
//!
//! The artifact stores the training set and hyperparameters; loading refits
//! Prophet from them. The MAP optimisation starts from a data-derived initial
//! point, so the refit reproduces the saved model.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use augurs::prophet::{
    FeatureMode, PositiveFloat, PredictionData, Prophet, ProphetOptions, Regressor,
    SeasonalityOption, TrainingData, optimizer::OptimizeOpts, wasmstan::WasmstanOptimizer,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

use super::{FeatureKind, FeatureTable, ForecastError, HolidayRegion};

/// Version tag written into every saved model.
pub const MODEL_FORMAT_VERSION: u32 = 2;

/// Coverage of the prediction interval.
pub const INTERVAL_WIDTH: f64 = 0.95;

/// How far past the end of history predictions are accepted.
pub const MAX_HORIZON_DAYS: i64 = 3660;

const MIN_TRAINING_ROWS: usize = 2;
const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeasonalityMode {
    Additive,
    #[default]
    Multiplicative,
}

impl SeasonalityMode {
    pub const ALL: [SeasonalityMode; 2] = [SeasonalityMode::Additive, SeasonalityMode::Multiplicative];

    pub fn as_str(&self) -> &'static str {
        match self {
            SeasonalityMode::Additive => "additive",
            SeasonalityMode::Multiplicative => "multiplicative",
        }
    }

    fn regressor(&self) -> Regressor {
        match self {
            SeasonalityMode::Additive => Regressor::additive(),
            SeasonalityMode::Multiplicative => Regressor::multiplicative(),
        }
    }
}

impl From<SeasonalityMode> for FeatureMode {
    fn from(mode: SeasonalityMode) -> Self {
        match mode {
            SeasonalityMode::Additive => FeatureMode::Additive,
            SeasonalityMode::Multiplicative => FeatureMode::Multiplicative,
        }
    }
}

impl std::fmt::Display for SeasonalityMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SeasonalityMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "additive" => Ok(SeasonalityMode::Additive),
            "multiplicative" => Ok(SeasonalityMode::Multiplicative),
            other => Err(format!("unknown seasonality mode: {other}")),
        }
    }
}

/// Model hyperparameters tuned by the search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hyperparameters {
    /// Prior scale of trend rate changes; larger allows a more flexible trend.
    pub changepoint_prior_scale: f64,
    /// Prior scale of the Fourier seasonality coefficients.
    pub seasonality_prior_scale: f64,
    /// Prior scale of the regressor (including holiday flag) coefficients.
    pub holidays_prior_scale: f64,
    pub seasonality_mode: SeasonalityMode,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            changepoint_prior_scale: 0.05,
            seasonality_prior_scale: 10.0,
            holidays_prior_scale: 10.0,
            seasonality_mode: SeasonalityMode::Multiplicative,
        }
    }
}

impl Hyperparameters {
    pub fn validate(&self) -> Result<(), ForecastError> {
        self.prophet_options().map(|_| ())
    }

    /// Prophet options for these hyperparameters.
    ///
    /// Regressors without their own prior scale use `holidays_prior_scale`.
    /// Prophet's sampled intervals are disabled; see [`ForecastModel::predict`].
    fn prophet_options(&self) -> Result<ProphetOptions, ForecastError> {
        Ok(ProphetOptions {
            changepoint_prior_scale: prior_scale(
                "changepoint_prior_scale",
                self.changepoint_prior_scale,
            )?,
            seasonality_prior_scale: prior_scale(
                "seasonality_prior_scale",
                self.seasonality_prior_scale,
            )?,
            holidays_prior_scale: prior_scale("holidays_prior_scale", self.holidays_prior_scale)?,
            seasonality_mode: self.seasonality_mode.into(),
            yearly_seasonality: SeasonalityOption::Manual(true),
            weekly_seasonality: SeasonalityOption::Manual(true),
            daily_seasonality: SeasonalityOption::Manual(false),
            uncertainty_samples: 0,
            ..ProphetOptions::default()
        })
    }
}

fn prior_scale(name: &str, value: f64) -> Result<PositiveFloat, ForecastError> {
    PositiveFloat::try_from(value).map_err(|_| {
        ForecastError::InvalidParameter(format!("{name} must be a positive number, got {value}"))
    })
}

/// Point forecast and 95% interval for one date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastRow {
    pub ds: NaiveDate,
    pub yhat: f64,
    pub yhat_lower: f64,
    pub yhat_upper: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct RegressorColumn {
    name: String,
    kind: FeatureKind,
    values: Vec<f64>,
}

/// Rows the model was fitted on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TrainingSet {
    dates: Vec<NaiveDate>,
    target: Vec<f64>,
    regressors: Vec<RegressorColumn>,
}

impl TrainingSet {
    /// Copy `table`, leaving out constant columns. Prophet cannot
    /// standardise them and they carry no signal.
    fn from_table(table: &FeatureTable) -> Self {
        let regressors = table
            .columns()
            .iter()
            .filter(|c| c.values.windows(2).any(|pair| pair[0] != pair[1]))
            .map(|c| RegressorColumn {
                name: c.name.clone(),
                kind: c.kind,
                values: c.values.clone(),
            })
            .collect();
        Self {
            dates: table.dates().to_vec(),
            target: table.target().to_vec(),
            regressors,
        }
    }

    fn fit(&self, params: &Hyperparameters) -> Result<Prophet<WasmstanOptimizer>, ForecastError> {
        let mut prophet = Prophet::new(params.prophet_options()?, WasmstanOptimizer::new());
        for regressor in &self.regressors {
            prophet.add_regressor(regressor.name.clone(), params.seasonality_mode.regressor());
        }

        let data = TrainingData::new(timestamps(&self.dates), self.target.clone())
            .and_then(|data| {
                data.with_regressors(
                    self.regressors
                        .iter()
                        .map(|r| (r.name.clone(), r.values.clone()))
                        .collect(),
                )
            })
            .map_err(model_error)?;
        prophet
            .fit(data, OptimizeOpts::default())
            .map_err(model_error)?;
        Ok(prophet)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Artifact {
    format_version: u32,
    hyperparameters: Hyperparameters,
    region: HolidayRegion,
    training: TrainingSet,
    /// In-sample residual standard deviation in target units.
    sigma: f64,
    trained_at: DateTime<Utc>,
}

/// A fitted forecast model. Immutable once fitted; retraining builds a new one.
pub struct ForecastModel {
    artifact: Artifact,
    prophet: Prophet<WasmstanOptimizer>,
}

impl std::fmt::Debug for ForecastModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForecastModel")
            .field("artifact", &self.artifact)
            .finish_non_exhaustive()
    }
}

impl PartialEq for ForecastModel {
    fn eq(&self, other: &Self) -> bool {
        self.artifact == other.artifact
    }
}

/// Summary of a fitted model, for status endpoints and logs.
#[derive(Debug, Clone, Serialize)]
pub struct ModelSummary {
    pub format_version: u32,
    pub hyperparameters: Hyperparameters,
    pub holiday_region: HolidayRegion,
    pub history_start: NaiveDate,
    pub history_end: NaiveDate,
    pub training_rows: usize,
    pub regressors: Vec<String>,
    pub residual_std: f64,
    pub trained_at: DateTime<Utc>,
}

impl ForecastModel {
    /// Fit a model on every row of `table`; every non-constant feature column
    /// is a regressor.
    #[tracing::instrument(
        name = "forecast.fit",
        skip(table),
        fields(rows = table.len(), regressors = table.columns().len())
    )]
    pub fn fit(table: &FeatureTable, params: &Hyperparameters) -> Result<Self, ForecastError> {
        params.validate()?;

        let n = table.len();
        if n < MIN_TRAINING_ROWS {
            return Err(ForecastError::InsufficientData {
                required: MIN_TRAINING_ROWS,
                actual: n,
            });
        }
        if let Some(bad) = table
            .columns()
            .iter()
            .find(|c| c.values.iter().any(|v| !v.is_finite()))
        {
            return Err(ForecastError::SchemaMismatch(format!(
                "regressor '{}' contains non-finite values",
                bad.name
            )));
        }

        let training = TrainingSet::from_table(table);
        let prophet = training.fit(params)?;
        let mut model = Self {
            artifact: Artifact {
                format_version: MODEL_FORMAT_VERSION,
                hyperparameters: *params,
                region: table.region(),
                training,
                sigma: 0.0,
                trained_at: Utc::now(),
            },
            prophet,
        };

        let training = &model.artifact.training;
        let fitted = model.point_forecast(
            &training.dates,
            training
                .regressors
                .iter()
                .map(|r| (r.name.clone(), r.values.clone()))
                .collect(),
        )?;
        let sum_sq: f64 = training
            .target
            .iter()
            .zip(&fitted)
            .map(|(y, yhat)| (y - yhat).powi(2))
            .sum();
        let sigma = (sum_sq / (n - 1) as f64).sqrt();
        if !sigma.is_finite() {
            return Err(ForecastError::ModelError(
                "fit produced non-finite predictions".to_string(),
            ));
        }
        model.artifact.sigma = sigma;

        tracing::debug!(
            sigma,
            regressors = model.artifact.training.regressors.len(),
            mode = %params.seasonality_mode,
            "Model fitted"
        );
        Ok(model)
    }

    /// Predict `dates`, deriving regressor values from `reference`.
    ///
    /// Calendar and holiday regressors are recomputed for each date. Every
    /// other regressor (exogenous metrics, rolling statistics) is held at its
    /// most recent value in `reference`, so forecasts far from the end of
    /// history do not reflect future changes in those inputs.
    ///
    /// Intervals are `yhat ± z·σ(h)` with `z` the normal quantile for
    /// [`INTERVAL_WIDTH`]. `σ(h)` is the in-sample residual scale, widened
    /// with the square root of the horizon `h` measured in multiples of the
    /// history length.
    pub fn predict(
        &self,
        dates: &[NaiveDate],
        reference: &FeatureTable,
    ) -> Result<Vec<ForecastRow>, ForecastError> {
        let missing: Vec<&str> = self
            .regressors()
            .filter(|r| reference.column(&r.name).is_none())
            .map(|r| r.name.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(ForecastError::SchemaMismatch(format!(
                "reference table is missing regressor columns: {}",
                missing.join(", ")
            )));
        }
        for date in dates {
            self.check_range(*date)?;
        }

        let region = self.artifact.region;
        let values = self
            .regressors()
            .map(|r| {
                let held = if r.kind.is_calendar() {
                    None
                } else {
                    reference.last_value(&r.name)
                };
                let column = dates
                    .iter()
                    .map(|date| r.kind.calendar_value(*date, region).or(held).unwrap_or(0.0))
                    .collect();
                (r.name.clone(), column)
            })
            .collect();
        self.rows(dates, values)
    }

    /// Predict every row of `table` using the table's own regressor values.
    pub fn predict_table(&self, table: &FeatureTable) -> Result<Vec<ForecastRow>, ForecastError> {
        let values = self
            .regressors()
            .map(|r| {
                table
                    .column(&r.name)
                    .map(|c| (r.name.clone(), c.values.clone()))
                    .ok_or_else(|| {
                        ForecastError::SchemaMismatch(format!(
                            "table is missing regressor column '{}'",
                            r.name
                        ))
                    })
            })
            .collect::<Result<HashMap<_, _>, _>>()?;
        for date in table.dates() {
            self.check_range(*date)?;
        }
        self.rows(table.dates(), values)
    }

    /// Forecast the `periods` days following the end of the training history.
    pub fn forecast_periods(
        &self,
        reference: &FeatureTable,
        periods: usize,
    ) -> Result<Vec<ForecastRow>, ForecastError> {
        if periods == 0 {
            return Err(ForecastError::InvalidParameter(
                "periods must be > 0".to_string(),
            ));
        }
        let end = self.history_end();
        let dates: Vec<NaiveDate> = (1..=periods as i64).map(|i| end + Duration::days(i)).collect();
        self.predict(&dates, reference)
    }

    /// Write the model to `path` as JSON.
    ///
    /// The artifact is written to a temporary sibling file and renamed into
    /// place, so an existing model at `path` is only replaced by a complete one.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<PathBuf, ForecastError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| ForecastError::io(e, parent))?;
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "model.json".to_string());
        let tmp_path = path.with_file_name(format!(".{file_name}.tmp"));

        let bytes = serde_json::to_vec_pretty(&self.artifact)?;
        std::fs::write(&tmp_path, bytes).map_err(|e| ForecastError::io(e, &tmp_path))?;
        if let Err(e) = std::fs::rename(&tmp_path, path) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(ForecastError::io(e, path));
        }

        tracing::info!(path = %path.display(), "Model saved");
        Ok(path.to_path_buf())
    }

    /// Load a model saved by [`ForecastModel::save`], refitting it from the
    /// stored training set.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ForecastError> {
        let path = path.as_ref();
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ForecastError::ModelNotFound(path.to_path_buf()));
            }
            Err(e) => return Err(ForecastError::io(e, path)),
        };

        let value: serde_json::Value = serde_json::from_slice(&bytes)?;
        let found = value
            .get("format_version")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0) as u32;
        if found != MODEL_FORMAT_VERSION {
            return Err(ForecastError::IncompatibleVersion {
                found,
                expected: MODEL_FORMAT_VERSION,
            });
        }

        let artifact: Artifact = serde_json::from_value(value)?;
        if artifact.training.dates.len() < MIN_TRAINING_ROWS {
            return Err(ForecastError::InsufficientData {
                required: MIN_TRAINING_ROWS,
                actual: artifact.training.dates.len(),
            });
        }
        let prophet = artifact.training.fit(&artifact.hyperparameters)?;
        tracing::info!(path = %path.display(), trained_at = %artifact.trained_at, "Model loaded");
        Ok(Self { artifact, prophet })
    }

    pub fn hyperparameters(&self) -> &Hyperparameters {
        &self.artifact.hyperparameters
    }

    pub fn region(&self) -> HolidayRegion {
        self.artifact.region
    }

    pub fn history_start(&self) -> NaiveDate {
        self.artifact.training.dates[0]
    }

    pub fn history_end(&self) -> NaiveDate {
        let dates = &self.artifact.training.dates;
        dates[dates.len() - 1]
    }

    pub fn regressor_names(&self) -> impl Iterator<Item = &str> {
        self.regressors().map(|r| r.name.as_str())
    }

    pub fn summary(&self) -> ModelSummary {
        ModelSummary {
            format_version: self.artifact.format_version,
            hyperparameters: self.artifact.hyperparameters,
            holiday_region: self.artifact.region,
            history_start: self.history_start(),
            history_end: self.history_end(),
            training_rows: self.artifact.training.dates.len(),
            regressors: self.regressor_names().map(str::to_string).collect(),
            residual_std: self.artifact.sigma,
            trained_at: self.artifact.trained_at,
        }
    }

    fn regressors(&self) -> impl Iterator<Item = &RegressorColumn> {
        self.artifact.training.regressors.iter()
    }

    fn check_range(&self, date: NaiveDate) -> Result<(), ForecastError> {
        let start = self.history_start();
        let end = self.history_end() + Duration::days(MAX_HORIZON_DAYS);
        if date < start || date > end {
            return Err(ForecastError::OutOfRange { date, start, end });
        }
        Ok(())
    }

    fn point_forecast(
        &self,
        dates: &[NaiveDate],
        regressors: HashMap<String, Vec<f64>>,
    ) -> Result<Vec<f64>, ForecastError> {
        if dates.is_empty() {
            return Ok(Vec::new());
        }
        let data = PredictionData::new(timestamps(dates))
            .with_regressors(regressors)
            .map_err(model_error)?;
        let predictions = self.prophet.predict(data).map_err(model_error)?;
        Ok(predictions.yhat.point)
    }

    fn rows(
        &self,
        dates: &[NaiveDate],
        regressors: HashMap<String, Vec<f64>>,
    ) -> Result<Vec<ForecastRow>, ForecastError> {
        let yhat = self.point_forecast(dates, regressors)?;
        let z = interval_z()?;
        let end = self.history_end();
        let span = ((end - self.history_start()).num_days() as f64).max(1.0);

        Ok(dates
            .iter()
            .zip(yhat)
            .map(|(date, yhat)| {
                let horizon = ((*date - end).num_days() as f64).max(0.0) / span;
                let spread = z * self.artifact.sigma * (1.0 + horizon).sqrt();
                ForecastRow {
                    ds: *date,
                    yhat,
                    yhat_lower: yhat - spread,
                    yhat_upper: yhat + spread,
                }
            })
            .collect())
    }
}

/// Two-sided standard normal quantile for [`INTERVAL_WIDTH`].
fn interval_z() -> Result<f64, ForecastError> {
    let standard = Normal::new(0.0, 1.0).map_err(model_error)?;
    Ok(standard.inverse_cdf(0.5 + INTERVAL_WIDTH / 2.0))
}

/// Midnight UTC of each date, in Unix seconds.
fn timestamps(dates: &[NaiveDate]) -> Vec<i64> {
    dates
        .iter()
        .map(|d| (*d - NaiveDate::default()).num_days() * SECONDS_PER_DAY)
        .collect()
}

fn model_error(err: impl std::fmt::Display) -> ForecastError {
    ForecastError::ModelError(err.to_string())
}
