//! Testing utilities for batchflow pipelines.
//!
//! [`RecordingHandler`] captures every flush so tests can assert on shard
//! routing, mirror tagging, batch contents and flush timing.

mod recording;

pub use recording::{FlushRecord, RecordingHandler};
