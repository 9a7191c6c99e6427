mod observations;
mod users;

pub use observations::PostgresObservationRepo;
pub use users::PostgresUserRepo;
