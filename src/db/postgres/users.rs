use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{
    db::{
        error::{DbError, DbResult},
        repos::{UserCredentials, UserRepo},
    },
    models::{CreateUser, User},
};

pub struct PostgresUserRepo {
    write_pool: PgPool,
    read_pool: PgPool,
}

impl PostgresUserRepo {
    pub fn new(write_pool: PgPool, read_pool: Option<PgPool>) -> Self {
        let read_pool = read_pool.unwrap_or_else(|| write_pool.clone());
        Self {
            write_pool,
            read_pool,
        }
    }

    fn row_to_user(row: &PgRow) -> User {
        User {
            id: row.get("id"),
            username: row.get("username"),
            full_name: row.get("full_name"),
            role: row.get("role"),
            is_active: row.get("is_active"),
            last_login: row.get("last_login"),
            created_at: row.get("created_at"),
        }
    }
}

#[async_trait]
impl UserRepo for PostgresUserRepo {
    async fn create(&self, input: &CreateUser, password_hash: &str) -> DbResult<User> {
        let row = sqlx::query(
            r#"
            INSERT INTO users (username, password_hash, full_name, role, is_active)
            VALUES ($1, $2, $3, $4, TRUE)
            RETURNING id, username, full_name, role, is_active, last_login, created_at
            "#,
        )
        .bind(&input.username)
        .bind(password_hash)
        .bind(&input.full_name)
        .bind(&input.role)
        .fetch_one(&self.write_pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => DbError::Conflict(
                format!("User with username '{}' already exists", input.username),
            ),
            _ => DbError::from(e),
        })?;

        Ok(Self::row_to_user(&row))
    }

    async fn get_by_id(&self, id: i64) -> DbResult<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT id, username, full_name, role, is_active, last_login, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.read_pool)
        .await?;

        Ok(row.as_ref().map(Self::row_to_user))
    }

    // Login reads the primary so a freshly created account can sign in at once.
    async fn get_credentials(&self, username: &str) -> DbResult<Option<UserCredentials>> {
        let row = sqlx::query(
            r#"
            SELECT id, username, full_name, role, is_active, last_login, created_at, password_hash
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.write_pool)
        .await?;

        Ok(row.map(|row| UserCredentials {
            user: Self::row_to_user(&row),
            password_hash: row.get("password_hash"),
        }))
    }

    async fn record_login(&self, id: i64) -> DbResult<()> {
        let result = sqlx::query("UPDATE users SET last_login = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.write_pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    async fn set_active(&self, id: i64, is_active: bool) -> DbResult<()> {
        let result = sqlx::query("UPDATE users SET is_active = $1 WHERE id = $2")
            .bind(is_active)
            .bind(id)
            .execute(&self.write_pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }
}
