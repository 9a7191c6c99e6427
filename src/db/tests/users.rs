//! Shared tests for UserRepo implementations

use crate::{
    db::{error::DbError, repos::UserRepo},
    models::{CreateUser, DEFAULT_ROLE},
};

fn create_user_input(username: &str, full_name: Option<&str>) -> CreateUser {
    CreateUser {
        username: username.to_string(),
        password: "not-used-by-the-repo".to_string(),
        full_name: full_name.map(|n| n.to_string()),
        role: DEFAULT_ROLE.to_string(),
    }
}

pub async fn test_create_user(repo: &dyn UserRepo) {
    let user = repo
        .create(&create_user_input("frontdesk", Some("Front Desk")), "salt$hash")
        .await
        .expect("Failed to create user");

    assert!(user.id > 0);
    assert_eq!(user.username, "frontdesk");
    assert_eq!(user.full_name.as_deref(), Some("Front Desk"));
    assert_eq!(user.role, DEFAULT_ROLE);
    assert!(user.is_active);
    assert!(user.last_login.is_none());

    let fetched = repo
        .get_by_id(user.id)
        .await
        .expect("Query failed")
        .expect("User not found");
    assert_eq!(fetched.username, "frontdesk");
    assert!(fetched.is_active);
}

pub async fn test_create_duplicate_username_fails(repo: &dyn UserRepo) {
    repo.create(&create_user_input("frontdesk", None), "h1")
        .await
        .expect("Failed to create user");

    let result = repo.create(&create_user_input("frontdesk", None), "h2").await;
    assert!(matches!(result, Err(DbError::Conflict(_))));
}

pub async fn test_get_credentials(repo: &dyn UserRepo) {
    repo.create(&create_user_input("audit", None), "salt$hash")
        .await
        .expect("Failed to create user");

    let credentials = repo
        .get_credentials("audit")
        .await
        .expect("Query failed")
        .expect("User not found");
    assert_eq!(credentials.password_hash, "salt$hash");
    assert_eq!(credentials.user.username, "audit");

    let missing = repo.get_credentials("nobody").await.expect("Query failed");
    assert!(missing.is_none());
}

pub async fn test_record_login(repo: &dyn UserRepo) {
    let user = repo
        .create(&create_user_input("audit", None), "h")
        .await
        .expect("Failed to create user");

    repo.record_login(user.id)
        .await
        .expect("Failed to record login");

    let fetched = repo
        .get_by_id(user.id)
        .await
        .expect("Query failed")
        .expect("User not found");
    assert!(fetched.last_login.is_some());

    let result = repo.record_login(999_999).await;
    assert!(matches!(result, Err(DbError::NotFound)));
}

pub async fn test_set_active(repo: &dyn UserRepo) {
    let user = repo
        .create(&create_user_input("seasonal", None), "h")
        .await
        .expect("Failed to create user");

    repo.set_active(user.id, false)
        .await
        .expect("Failed to deactivate");
    let credentials = repo
        .get_credentials("seasonal")
        .await
        .expect("Query failed")
        .expect("User not found");
    assert!(!credentials.user.is_active);
}

// ============================================================================
// SQLite Tests - Fast, in-memory
// ============================================================================

#[cfg(all(test, feature = "database-sqlite"))]
mod sqlite_tests {
    use crate::db::{
        sqlite::SqliteUserRepo,
        tests::harness::{create_sqlite_pool, run_sqlite_migrations},
    };

    macro_rules! sqlite_test {
        ($name:ident) => {
            #[tokio::test]
            async fn $name() {
                let pool = create_sqlite_pool().await;
                run_sqlite_migrations(&pool).await;
                let repo = SqliteUserRepo::new(pool);
                super::$name(&repo).await;
            }
        };
    }

    sqlite_test!(test_create_user);
    sqlite_test!(test_create_duplicate_username_fails);
    sqlite_test!(test_get_credentials);
    sqlite_test!(test_record_login);
    sqlite_test!(test_set_active);
}

// ============================================================================
// PostgreSQL Tests - Require Docker, run with `cargo test -- --ignored`
// ============================================================================

#[cfg(all(test, feature = "database-postgres"))]
mod postgres_tests {
    use crate::db::{
        postgres::PostgresUserRepo,
        tests::harness::postgres::{create_isolated_postgres_pool, run_postgres_migrations},
    };

    macro_rules! postgres_test {
        ($name:ident) => {
            #[tokio::test]
            #[ignore = "Requires Docker - run with `cargo test -- --ignored`"]
            async fn $name() {
                let pool = create_isolated_postgres_pool().await;
                run_postgres_migrations(&pool).await;
                let repo = PostgresUserRepo::new(pool, None);
                super::$name(&repo).await;
            }
        };
    }

    postgres_test!(test_create_user);
    postgres_test!(test_create_duplicate_username_fails);
    postgres_test!(test_get_credentials);
    postgres_test!(test_record_login);
    postgres_test!(test_set_active);
}
