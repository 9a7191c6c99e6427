//! Room revenue forecasting pipeline.
//!
//! The pipeline runs in four stages, each a plain function over explicit
//! inputs:
//!
//! 1. [`table::MetricsTable`] holds the raw daily metrics (one row per date).
//! 2. [`features::build_features`] derives the calendar, holiday and rolling
//!    statistic columns the model regresses on.
//! 3. [`model::ForecastModel`] fits a Prophet model (trend, seasonality and
//!    regressors) and predicts point estimates with 95% intervals.
//! 4. [`report`] renders forecasts as text, SVG or CSV.
//!
//! [`search`] tunes the model hyperparameters with a tree-structured Parzen
//! estimator over rolling-origin cross-validation ([`cv`]).

pub mod cv;
pub mod features;
pub mod holidays;
pub mod model;
pub mod report;
pub mod search;
pub mod table;

use std::path::PathBuf;

use chrono::NaiveDate;

pub use features::{FeatureColumn, FeatureKind, FeatureTable, build_features};
pub use holidays::HolidayRegion;
pub use model::{ForecastModel, ForecastRow, Hyperparameters, SeasonalityMode};
pub use search::{SearchBudget, SearchOutcome, SearchSpace};
pub use table::MetricsTable;

/// Date format used for every date column, report and request.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Column forecast by default.
pub const DEFAULT_TARGET_COLUMN: &str = "Room Revenue";

/// Exogenous columns attached as regressors by default.
pub const DEFAULT_EXOGENOUS_COLUMNS: [&str; 4] = ["Rooms Sold", "Occupancy %", "ARR", "Pax"];

/// Error type for forecasting operations
#[derive(Debug, thiserror::Error)]
pub enum ForecastError {
    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Duplicate date in series: {0}")]
    DuplicateDate(NaiveDate),

    #[error("Insufficient data: need at least {required} rows, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Date {date} is outside the supported forecast range ({start} to {end})")]
    OutOfRange {
        date: NaiveDate,
        start: NaiveDate,
        end: NaiveDate,
    },

    #[error("Forecast model error: {0}")]
    ModelError(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("No model file found at {}", .0.display())]
    ModelNotFound(PathBuf),

    #[error("Incompatible model format version {found} (expected {expected})")]
    IncompatibleVersion { found: u32, expected: u32 },

    #[error("Hyperparameter search produced no successful trial")]
    NoFeasibleTrial,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Failed to access {}: {source}", path.display())]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    #[error("Model serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl ForecastError {
    pub(crate) fn io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        Self::Io {
            source,
            path: path.into(),
        }
    }
}
