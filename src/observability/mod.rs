//! Observability: structured logging through `tracing`.

mod tracing_init;

pub use tracing_init::*;
