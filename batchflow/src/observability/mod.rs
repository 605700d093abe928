//! Tracing/logging initialization.
//!
//! The crate itself only emits `tracing` events. Binaries and tests that
//! want to see them install a subscriber with [`init_tracing`].

mod subscriber;

pub use subscriber::{init_tracing, init_tracing_with, TracingConfig};
