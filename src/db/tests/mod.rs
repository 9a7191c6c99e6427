//! Shared database repository test infrastructure
//!
//! Each repository has a test module containing shared async test functions
//! that take `&dyn XxxRepo`. The same functions run against in-memory SQLite
//! on every `cargo test`, and against PostgreSQL (testcontainers) when run
//! with `cargo test -- --ignored`.

mod observations;
mod users;
