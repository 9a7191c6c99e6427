//! Background jobs.
//!
//! - **Model retraining**: rebuilds the training table from stored actuals,
//!   optionally runs the hyperparameter search, saves the new model and swaps
//!   it in. Started explicitly through the API or, when
//!   `forecasting.retrain.on_ingest` is set, after each accepted submission.
//!
//! ```toml
//! [forecasting.retrain]
//! on_ingest = true
//! ```

mod retrain;

pub use retrain::{RetrainTrigger, Retrainer};
