//! Rolling-origin cross-validation.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use super::{FeatureTable, ForecastError, ForecastModel, Hyperparameters};

/// Window sizes, in days, for rolling-origin cross-validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CvWindows {
    /// Minimum training history before the first cutoff.
    pub initial_days: i64,
    /// Spacing between consecutive cutoffs.
    pub period_days: i64,
    /// Days evaluated after each cutoff.
    pub horizon_days: i64,
}

impl Default for CvWindows {
    fn default() -> Self {
        Self {
            initial_days: 366,
            period_days: 30,
            horizon_days: 30,
        }
    }
}

impl CvWindows {
    pub fn validate(&self) -> Result<(), ForecastError> {
        if self.initial_days <= 0 || self.period_days <= 0 || self.horizon_days <= 0 {
            return Err(ForecastError::InvalidParameter(format!(
                "cross-validation windows must be positive (initial {}, period {}, horizon {})",
                self.initial_days, self.period_days, self.horizon_days
            )));
        }
        Ok(())
    }

    /// Cutoff dates for a history spanning `start..=end`, oldest first.
    ///
    /// The last cutoff leaves exactly one horizon of data after it; earlier
    /// cutoffs step back by the period while at least `initial_days` of
    /// history precede them.
    pub fn cutoffs(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        let earliest = start + Duration::days(self.initial_days);
        let mut cutoff = end - Duration::days(self.horizon_days);
        let mut cutoffs = Vec::new();
        while cutoff >= earliest {
            cutoffs.push(cutoff);
            cutoff -= Duration::days(self.period_days);
        }
        cutoffs.reverse();
        cutoffs
    }
}

/// Error of one cross-validation fold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FoldScore {
    pub cutoff: NaiveDate,
    pub rows: usize,
    pub rmse: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CvReport {
    pub folds: Vec<FoldScore>,
    /// Mean of the per-fold RMSE values.
    pub mean_rmse: f64,
}

/// Fit on history up to each cutoff and score the following horizon.
///
/// Held-out rows are predicted with their actual regressor values. A table
/// too short to produce a single fold is rejected with
/// [`ForecastError::InsufficientData`].
#[tracing::instrument(name = "forecast.cross_validate", skip(table, params), fields(rows = table.len()))]
pub fn cross_validate(
    table: &FeatureTable,
    params: &Hyperparameters,
    windows: &CvWindows,
) -> Result<CvReport, ForecastError> {
    windows.validate()?;
    let cutoffs = fold_cutoffs(table, windows)?;

    let dates = table.dates();
    let mut folds = Vec::with_capacity(cutoffs.len());
    for cutoff in cutoffs {
        let horizon_end = cutoff + Duration::days(windows.horizon_days);
        let train_end = dates.partition_point(|d| *d <= cutoff);
        let test_end = dates.partition_point(|d| *d <= horizon_end);
        if train_end == 0 || test_end == train_end {
            continue;
        }

        let model = ForecastModel::fit(&table.slice(0..train_end), params)?;
        let test = table.slice(train_end..test_end);
        let predictions = model.predict_table(&test)?;
        let yhat: Vec<f64> = predictions.iter().map(|row| row.yhat).collect();

        folds.push(FoldScore {
            cutoff,
            rows: test.len(),
            rmse: rmse(test.target(), &yhat),
        });
    }

    if folds.is_empty() {
        return Err(ForecastError::InsufficientData {
            required: min_rows(windows),
            actual: table.len(),
        });
    }

    let mean_rmse = folds.iter().map(|f| f.rmse).sum::<f64>() / folds.len() as f64;
    tracing::debug!(folds = folds.len(), mean_rmse, "Cross-validation complete");
    Ok(CvReport { folds, mean_rmse })
}

/// Cutoffs for `table`, failing when there are none.
pub fn fold_cutoffs(
    table: &FeatureTable,
    windows: &CvWindows,
) -> Result<Vec<NaiveDate>, ForecastError> {
    let cutoffs = match (table.dates().first(), table.dates().last()) {
        (Some(start), Some(end)) => windows.cutoffs(*start, *end),
        _ => Vec::new(),
    };
    if cutoffs.is_empty() {
        return Err(ForecastError::InsufficientData {
            required: min_rows(windows),
            actual: table.len(),
        });
    }
    Ok(cutoffs)
}

fn min_rows(windows: &CvWindows) -> usize {
    (windows.initial_days + windows.horizon_days + 1) as usize
}

/// Root mean squared error over paired values.
pub fn rmse(actual: &[f64], predicted: &[f64]) -> f64 {
    let n = actual.len().min(predicted.len());
    if n == 0 {
        return 0.0;
    }
    let sum: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    (sum / n as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecasting::model::{
        SeasonalityMode,
        tests::{features, synthetic_table},
    };

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_cutoffs_step_back_from_end() {
        let windows = CvWindows {
            initial_days: 10,
            period_days: 5,
            horizon_days: 5,
        };
        let cutoffs = windows.cutoffs(date("2024-01-01"), date("2024-01-31"));
        assert_eq!(
            cutoffs,
            vec![
                date("2024-01-11"),
                date("2024-01-16"),
                date("2024-01-21"),
                date("2024-01-26"),
            ]
        );
    }

    #[test]
    fn test_no_cutoffs_for_short_history() {
        let cutoffs = CvWindows::default().cutoffs(date("2024-01-01"), date("2024-06-01"));
        assert!(cutoffs.is_empty());
    }

    #[test]
    fn test_rmse() {
        assert_eq!(rmse(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]), 0.0);
        assert!((rmse(&[0.0, 0.0], &[3.0, 4.0]) - 12.5_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_cross_validate_scores_each_fold() {
        let table = features(&synthetic_table(460, 10.0, 21));
        let params = Hyperparameters {
            seasonality_mode: SeasonalityMode::Additive,
            ..Hyperparameters::default()
        };
        let report = cross_validate(&table, &params, &CvWindows::default()).unwrap();

        // 460 days: cutoffs at day 429, 399 and 369
        assert_eq!(report.folds.len(), 3);
        assert!(report.folds.iter().all(|f| f.rows == 30));
        assert!(report.mean_rmse > 0.0 && report.mean_rmse < 100.0);
    }

    #[test]
    fn test_cross_validate_without_folds() {
        let table = features(&synthetic_table(200, 10.0, 22));
        let result = cross_validate(&table, &Hyperparameters::default(), &CvWindows::default());
        assert!(matches!(result, Err(ForecastError::InsufficientData { .. })));
    }

    #[test]
    fn test_invalid_windows() {
        let windows = CvWindows {
            period_days: 0,
            ..CvWindows::default()
        };
        let table = features(&synthetic_table(50, 1.0, 0));
        let result = cross_validate(&table, &Hyperparameters::default(), &windows);
        assert!(matches!(result, Err(ForecastError::InvalidParameter(_))));
    }
}
