use async_trait::async_trait;

use crate::{
    db::error::DbResult,
    models::{CreateUser, User},
};

/// A user together with the stored password hash.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    pub password_hash: String,
}

#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Create an active user. A taken username fails with `DbError::Conflict`.
    async fn create(&self, input: &CreateUser, password_hash: &str) -> DbResult<User>;
    async fn get_by_id(&self, id: i64) -> DbResult<Option<User>>;
    async fn get_credentials(&self, username: &str) -> DbResult<Option<UserCredentials>>;
    async fn record_login(&self, id: i64) -> DbResult<()>;
    async fn set_active(&self, id: i64, is_active: bool) -> DbResult<()>;
}
