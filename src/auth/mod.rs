//! Username/password authentication with server-side sessions.

mod password;
mod session_store;

pub use password::{hash_password, verify_password};
pub use session_store::*;
