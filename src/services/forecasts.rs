//! Active model management: training, loading and forecasting.
//!
//! The fitted model is shared behind an `Arc` and swapped wholesale after a
//! successful retrain. Readers holding the previous `Arc` keep using it until
//! they finish; a failed retrain leaves both the artifact on disk and the
//! in-memory model untouched.

use std::{path::PathBuf, sync::Arc};

use chrono::NaiveDate;
use parking_lot::RwLock;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::{
    config::ForecastingConfig,
    forecasting::{
        FeatureTable, ForecastError, ForecastModel, ForecastRow, Hyperparameters, MetricsTable,
        SearchSpace, build_features,
        model::ModelSummary,
        report,
        search::{self, StopReason, Trial},
    },
};

/// Search statistics attached to a training run.
#[derive(Debug, Clone, Serialize)]
pub struct SearchSummary {
    pub best_loss: f64,
    pub trials: usize,
    pub failed_trials: usize,
    pub stop_reason: StopReason,
}

/// Result of [`ForecastService::train`].
#[derive(Debug, Clone, Serialize)]
pub struct TrainingRun {
    pub model: ModelSummary,
    pub path: PathBuf,
    /// `None` when the search is disabled or the history is too short for
    /// cross-validation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<SearchSummary>,
}

/// Paths written by [`ForecastService::write_reports`].
#[derive(Debug, Clone, Serialize)]
pub struct ReportFiles {
    pub text: PathBuf,
    pub chart: PathBuf,
    pub csv: PathBuf,
}

#[derive(Clone)]
pub struct ForecastService {
    config: Arc<ForecastingConfig>,
    active: Arc<RwLock<Option<Arc<ForecastModel>>>>,
}

impl ForecastService {
    pub fn new(config: ForecastingConfig) -> Self {
        Self {
            config: Arc::new(config),
            active: Arc::new(RwLock::new(None)),
        }
    }

    pub fn config(&self) -> &ForecastingConfig {
        &self.config
    }

    /// The model currently serving forecasts, if any.
    pub fn active(&self) -> Option<Arc<ForecastModel>> {
        self.active.read().clone()
    }

    /// Load the artifact at the configured model path and make it active.
    pub fn load(&self) -> Result<Arc<ForecastModel>, ForecastError> {
        let model = Arc::new(ForecastModel::load(&self.config.model_path)?);
        *self.active.write() = Some(model.clone());
        Ok(model)
    }

    /// Build the feature table the model trains on and predicts from.
    pub fn features(&self, table: &MetricsTable) -> Result<FeatureTable, ForecastError> {
        build_features(
            table,
            &self.config.target_column,
            &self.config.exogenous_columns,
            self.config.holiday_region,
        )
    }

    /// Fit a model on `table`, save it and make it active.
    ///
    /// With the search enabled the hyperparameters come from a TPE search;
    /// otherwise, or when the history admits no cross-validation fold, the
    /// configured defaults are used. Blocking: call from a blocking thread.
    pub fn train(
        &self,
        table: &MetricsTable,
        cancel: &CancellationToken,
        on_trial: impl FnMut(&Trial),
    ) -> Result<TrainingRun, ForecastError> {
        let features = self.features(table)?;
        let (params, search) = self.choose_hyperparameters(&features, cancel, on_trial)?;

        if cancel.is_cancelled() {
            return Err(ForecastError::Cancelled);
        }
        let model = ForecastModel::fit(&features, &params)?;
        let path = model.save(&self.config.model_path)?;
        let summary = model.summary();
        *self.active.write() = Some(Arc::new(model));

        tracing::info!(
            path = %path.display(),
            rows = summary.training_rows,
            history_end = %summary.history_end,
            "Active model replaced"
        );
        Ok(TrainingRun {
            model: summary,
            path,
            search,
        })
    }

    fn choose_hyperparameters(
        &self,
        features: &FeatureTable,
        cancel: &CancellationToken,
        on_trial: impl FnMut(&Trial),
    ) -> Result<(Hyperparameters, Option<SearchSummary>), ForecastError> {
        let search_config = &self.config.search;
        if !search_config.enabled {
            return Ok((self.config.defaults, None));
        }

        let outcome = match search::tune(
            features,
            &SearchSpace::default(),
            &search_config.budget(),
            &search_config.windows(),
            cancel,
            on_trial,
        ) {
            Ok(outcome) => outcome,
            Err(ForecastError::InsufficientData { required, actual }) => {
                tracing::warn!(
                    required,
                    actual,
                    "History too short for cross-validation, using default hyperparameters"
                );
                return Ok((self.config.defaults, None));
            }
            Err(e) => return Err(e),
        };

        let summary = SearchSummary {
            best_loss: outcome.best_loss,
            trials: outcome.trials.len(),
            failed_trials: outcome.trials.iter().filter(|t| !t.is_feasible()).count(),
            stop_reason: outcome.stop_reason,
        };
        Ok((outcome.best, Some(summary)))
    }

    /// Forecast the `periods` days after the end of the model's history.
    pub fn forecast(
        &self,
        table: &MetricsTable,
        periods: usize,
    ) -> Result<Vec<ForecastRow>, ForecastError> {
        let model = self.require_active()?;
        let reference = self.features(table)?;
        model.forecast_periods(&reference, periods)
    }

    /// Predict specific dates.
    pub fn predict_dates(
        &self,
        table: &MetricsTable,
        dates: &[NaiveDate],
    ) -> Result<Vec<ForecastRow>, ForecastError> {
        let model = self.require_active()?;
        let reference = self.features(table)?;
        model.predict(dates, &reference)
    }

    /// Target history of `table` as chart points.
    pub fn history(&self, table: &MetricsTable) -> Result<Vec<(NaiveDate, f64)>, ForecastError> {
        let features = self.features(table)?;
        Ok(features
            .dates()
            .iter()
            .copied()
            .zip(features.target().iter().copied())
            .collect())
    }

    /// Write the text report, SVG chart and CSV for `rows` into the report
    /// directory as `<stem>.txt`, `<stem>.svg` and `<stem>.csv`.
    pub fn write_reports(
        &self,
        history: &[(NaiveDate, f64)],
        rows: &[ForecastRow],
        stem: &str,
    ) -> Result<ReportFiles, ForecastError> {
        let dir = &self.config.report_dir;
        let title = &self.config.report_title;
        Ok(ReportFiles {
            text: report::write_text_report(rows, title, dir.join(format!("{stem}.txt")))?,
            chart: report::write_chart(history, rows, title, dir.join(format!("{stem}.svg")))?,
            csv: report::write_csv(rows, dir.join(format!("{stem}.csv")))?,
        })
    }

    fn require_active(&self) -> Result<Arc<ForecastModel>, ForecastError> {
        self.active()
            .ok_or_else(|| ForecastError::ModelNotFound(self.config.model_path.clone()))
    }
}
