mod observation;
mod user;
mod validators;

pub use observation::*;
pub use user::*;
pub use validators::describe as describe_validation_errors;
