//! End-to-end tests against the full router.

#[cfg(all(test, feature = "database-sqlite"))]
mod api_e2e;
