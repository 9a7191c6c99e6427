mod common;
mod observations;
mod users;

pub use observations::SqliteObservationRepo;
pub use users::SqliteUserRepo;
