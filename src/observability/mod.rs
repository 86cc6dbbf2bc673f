//! Logging setup.
//!
//! Structured logging via `tracing`, with a pretty, compact, or JSON console
//! format selected by `[observability.logging]`.

mod tracing_init;

pub use tracing_init::*;
