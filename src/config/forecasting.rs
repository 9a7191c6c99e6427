use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::forecasting::{
    DEFAULT_EXOGENOUS_COLUMNS, DEFAULT_TARGET_COLUMN, HolidayRegion, Hyperparameters,
    SearchBudget, cv::CvWindows, report::DEFAULT_REPORT_TITLE,
};

/// Forecasting pipeline configuration.
///
/// ```toml
/// [forecasting]
/// model_path = "models/revenue_model.json"
/// holiday_region = "in"
///
/// [forecasting.search]
/// max_evals = 50
/// timeout_secs = 900
///
/// [forecasting.retrain]
/// on_ingest = true
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForecastingConfig {
    /// Where the active model artifact lives.
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,

    /// Column forecast by the model.
    #[serde(default = "default_target_column")]
    pub target_column: String,

    /// Columns attached as regressors when present in the data.
    #[serde(default = "default_exogenous_columns")]
    pub exogenous_columns: Vec<String>,

    /// National holiday calendar used for both training and prediction.
    #[serde(default)]
    pub holiday_region: HolidayRegion,

    /// Directory that report, chart and CSV files are written to.
    #[serde(default = "default_report_dir")]
    pub report_dir: PathBuf,

    #[serde(default = "default_report_title")]
    pub report_title: String,

    /// Hyperparameters used when the search is disabled.
    #[serde(default)]
    pub defaults: Hyperparameters,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub retrain: RetrainConfig,
}

impl Default for ForecastingConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            target_column: default_target_column(),
            exogenous_columns: default_exogenous_columns(),
            holiday_region: HolidayRegion::default(),
            report_dir: default_report_dir(),
            report_title: default_report_title(),
            defaults: Hyperparameters::default(),
            search: SearchConfig::default(),
            retrain: RetrainConfig::default(),
        }
    }
}

impl ForecastingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_column.trim().is_empty() {
            return Err(ConfigError::Validation(
                "forecasting.target_column cannot be empty".into(),
            ));
        }
        if self.exogenous_columns.iter().any(|c| c == &self.target_column) {
            return Err(ConfigError::Validation(format!(
                "forecasting.exogenous_columns cannot contain the target column '{}'",
                self.target_column
            )));
        }
        self.defaults
            .validate()
            .map_err(|e| ConfigError::Validation(format!("forecasting.defaults: {e}")))?;
        self.search.validate()
    }
}

fn default_model_path() -> PathBuf {
    PathBuf::from("models/revenue_model.json")
}

fn default_target_column() -> String {
    DEFAULT_TARGET_COLUMN.to_string()
}

fn default_exogenous_columns() -> Vec<String> {
    DEFAULT_EXOGENOUS_COLUMNS.iter().map(|c| c.to_string()).collect()
}

fn default_report_dir() -> PathBuf {
    PathBuf::from("reports")
}

fn default_report_title() -> String {
    DEFAULT_REPORT_TITLE.to_string()
}

/// Hyperparameter search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchConfig {
    /// Tune hyperparameters on every retrain. When false, retraining fits
    /// `forecasting.defaults` directly.
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_max_evals")]
    pub max_evals: usize,

    /// Random trials before the Parzen estimator takes over.
    #[serde(default = "default_startup_trials")]
    pub startup_trials: usize,

    /// Wall-clock limit for one search. 0 disables the limit.
    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,

    /// Fixed seed for reproducible searches.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Cross-validation windows, in days.
    #[serde(default = "default_initial_days")]
    pub initial_days: i64,
    #[serde(default = "default_period_days")]
    pub period_days: i64,
    #[serde(default = "default_horizon_days")]
    pub horizon_days: i64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_evals: default_max_evals(),
            startup_trials: default_startup_trials(),
            timeout_secs: default_search_timeout(),
            seed: None,
            initial_days: default_initial_days(),
            period_days: default_period_days(),
            horizon_days: default_horizon_days(),
        }
    }
}

impl SearchConfig {
    pub fn budget(&self) -> SearchBudget {
        SearchBudget {
            max_evals: self.max_evals,
            startup_trials: self.startup_trials,
            timeout: (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs)),
            seed: self.seed,
        }
    }

    pub fn windows(&self) -> CvWindows {
        CvWindows {
            initial_days: self.initial_days,
            period_days: self.period_days,
            horizon_days: self.horizon_days,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_evals == 0 {
            return Err(ConfigError::Validation(
                "forecasting.search.max_evals must be greater than 0".into(),
            ));
        }
        self.windows()
            .validate()
            .map_err(|e| ConfigError::Validation(format!("forecasting.search: {e}")))
    }
}

fn default_true() -> bool {
    true
}

fn default_max_evals() -> usize {
    30
}

fn default_startup_trials() -> usize {
    10
}

fn default_search_timeout() -> u64 {
    600 // 10 minutes
}

fn default_initial_days() -> i64 {
    366
}

fn default_period_days() -> i64 {
    30
}

fn default_horizon_days() -> i64 {
    30
}

/// Background retraining settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrainConfig {
    /// Start a retrain after every successful submission.
    #[serde(default)]
    pub on_ingest: bool,
}
