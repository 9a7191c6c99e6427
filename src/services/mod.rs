mod forecasts;
mod observations;
mod users;

use std::sync::Arc;

pub use forecasts::{ForecastService, TrainingRun};
pub use observations::{ObservationService, SubmitError};
pub use users::{AuthenticateError, UserService};

use crate::db::DbPool;

/// Container for the database-backed services
#[derive(Clone)]
pub struct Services {
    pub observations: ObservationService,
    pub users: UserService,
}

impl Services {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self {
            observations: ObservationService::new(db.clone()),
            users: UserService::new(db),
        }
    }
}
