use std::sync::Arc;

use validator::Validate;

use crate::{
    auth::{hash_password, verify_password},
    db::{DbError, DbPool, DbResult},
    models::{CreateUser, User, describe_validation_errors},
};

#[derive(Debug, thiserror::Error)]
pub enum AuthenticateError {
    /// Unknown username, wrong password or a deactivated account.
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error(transparent)]
    Database(#[from] DbError),
}

/// Service layer for user accounts
#[derive(Clone)]
pub struct UserService {
    db: Arc<DbPool>,
}

impl UserService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Create a new user, hashing the supplied password.
    pub async fn create(&self, input: CreateUser) -> DbResult<User> {
        input
            .validate()
            .map_err(|e| DbError::Validation(describe_validation_errors(&e)))?;
        let password_hash = hash_password(&input.password);
        let user = self.db.users().create(&input, &password_hash).await?;
        tracing::info!(user_id = user.id, username = %user.username, role = %user.role, "User created");
        Ok(user)
    }

    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<User>> {
        self.db.users().get_by_id(id).await
    }

    /// Check a username/password pair and record the login.
    #[tracing::instrument(name = "users.authenticate", skip(self, password))]
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<User, AuthenticateError> {
        let Some(credentials) = self.db.users().get_credentials(username).await? else {
            tracing::debug!("Unknown username");
            return Err(AuthenticateError::InvalidCredentials);
        };
        if !credentials.user.is_active || !verify_password(password, &credentials.password_hash)
        {
            return Err(AuthenticateError::InvalidCredentials);
        }

        self.db.users().record_login(credentials.user.id).await?;
        Ok(credentials.user)
    }

    /// Enable or disable sign-in for `username`.
    pub async fn set_active(&self, username: &str, is_active: bool) -> DbResult<User> {
        let mut user = self
            .db
            .users()
            .get_credentials(username)
            .await?
            .ok_or(DbError::NotFound)?
            .user;
        self.db.users().set_active(user.id, is_active).await?;
        user.is_active = is_active;
        tracing::info!(user_id = user.id, is_active, "User activation changed");
        Ok(user)
    }
}
