//! # Batchflow
//!
//! Sharded batching for high-volume keyed writes.
//!
//! Batchflow merges values tagged with a key into per-shard batches and hands
//! each batch to a handler, with support for:
//!
//! - **Size- and time-bounded flushes**: a shard flushes when full or when its interval elapses
//! - **Staggered timers**: shard flushes are spread across one interval
//! - **Mirror traffic**: shadow requests are batched apart from primary traffic
//! - **Graceful shutdown**: `close` drains every queue before returning
//! - **Retries**: exponential backoff with jitter and a bounded retry loop
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use batchflow::prelude::*;
//!
//! let pipeline = Pipeline::new(PipelineConfig::new().with_worker(4).with_name("likes"))
//!     .with_process(|ctx, shard, batch| async move {
//!         let _ = retry(&ctx, |_ctx| store(shard, batch.clone())).await;
//!     })
//!     .with_split(|key| key.parse().unwrap_or(0));
//!
//! pipeline.start();
//! pipeline.add(&Context::background(), "42", Like::new())?;
//! pipeline.close().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod backoff;
pub mod cancellation;
pub mod context;
pub mod errors;
pub mod group;
pub mod metrics;
pub mod observability;
pub mod pipeline;
pub mod retry;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::backoff::{BackoffStrategy, Exponential};
    pub use crate::cancellation::CancellationToken;
    pub use crate::context::{Context, MetaValue, Metadata};
    pub use crate::errors::{BatchflowError, PipelineError, Result, RetryError};
    pub use crate::group::Group;
    pub use crate::metrics::{InMemoryMetricsSink, MetricsSink, NoOpMetricsSink, ShardLabel};
    pub use crate::observability::init_tracing;
    pub use crate::pipeline::{Batch, BatchHandler, Pipeline, PipelineConfig};
    pub use crate::retry::{retry, Retry};
}
