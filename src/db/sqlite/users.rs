use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use crate::{
    db::{
        error::{DbError, DbResult},
        repos::{UserCredentials, UserRepo},
    },
    models::{CreateUser, User},
};

pub struct SqliteUserRepo {
    pool: SqlitePool,
}

impl SqliteUserRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_user(row: &SqliteRow) -> User {
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
impl UserRepo for SqliteUserRepo {
    async fn create(&self, input: &CreateUser, password_hash: &str) -> DbResult<User> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO users (username, password_hash, full_name, role, is_active, created_at)
            VALUES (?, ?, ?, ?, 1, ?)
            "#,
        )
        .bind(&input.username)
        .bind(password_hash)
        .bind(&input.full_name)
        .bind(&input.role)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => DbError::Conflict(
                format!("User with username '{}' already exists", input.username),
            ),
            _ => DbError::from(e),
        })?;

        Ok(User {
            id: result.last_insert_rowid(),
            username: input.username.clone(),
            full_name: input.full_name.clone(),
            role: input.role.clone(),
            is_active: true,
            last_login: None,
            created_at: now,
        })
    }

    async fn get_by_id(&self, id: i64) -> DbResult<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT id, username, full_name, role, is_active, last_login, created_at
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(Self::row_to_user))
    }

    async fn get_credentials(&self, username: &str) -> DbResult<Option<UserCredentials>> {
        let row = sqlx::query(
            r#"
            SELECT id, username, full_name, role, is_active, last_login, created_at, password_hash
            FROM users
            WHERE username = ?
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| UserCredentials {
            user: Self::row_to_user(&row),
            password_hash: row.get("password_hash"),
        }))
    }

    async fn record_login(&self, id: i64) -> DbResult<()> {
        let result = sqlx::query("UPDATE users SET last_login = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    async fn set_active(&self, id: i64, is_active: bool) -> DbResult<()> {
        let result = sqlx::query("UPDATE users SET is_active = ? WHERE id = ?")
            .bind(is_active)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }
}
