//! Observability module providing structured console logging.
//!
//! Log events are emitted through `tracing`; this module turns the
//! `[observability.logging]` configuration into a subscriber.

mod tracing_init;

pub use tracing_init::*;
