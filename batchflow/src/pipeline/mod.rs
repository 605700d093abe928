//! Sharded batching pipeline.
//!
//! This module provides:
//! - Pipeline configuration with defaults
//! - The batch handler contract
//! - Shard workers flushing by size or interval
//! - Primary and mirror traffic separation

mod config;
mod handler;
mod runtime;
mod worker;


pub use config::PipelineConfig;
pub use handler::{Batch, BatchHandler, ProcessFn, SplitFn};
pub use runtime::Pipeline;
