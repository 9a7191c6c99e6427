mod session;

pub use session::{current_session_id, require_session};
