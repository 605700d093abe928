//! Batch processing callbacks.

use crate::context::Context;
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use std::collections::HashMap;
use std::sync::Arc;

/// Values accumulated by one shard since its last flush, grouped by key.
///
/// Values for a key keep their insertion order.
pub type Batch<T> = HashMap<String, Vec<T>>;

/// Type-erased batch processing function.
pub type ProcessFn<T> = Arc<dyn Fn(Context, usize, Batch<T>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Type-erased shard selection function.
pub type SplitFn = Arc<dyn Fn(&str) -> usize + Send + Sync>;

/// Processes flushed batches and routes keys to shards.
#[async_trait]
pub trait BatchHandler<T: Send + 'static>: Send + Sync {
    /// Handles one flushed batch from shard `shard`.
    ///
    /// Runs on the shard's worker; the shard accepts no further values
    /// until this returns. Mirror shards pass a context whose
    /// [`Context::is_mirror`] is true.
    async fn process(&self, ctx: Context, shard: usize, batch: Batch<T>);

    /// Maps a key to a shard. Must be deterministic.
    fn split(&self, key: &str) -> usize;
}

pub(crate) fn process_fn<T, H>(handler: Arc<H>) -> ProcessFn<T>
where
    T: Send + 'static,
    H: BatchHandler<T> + ?Sized + 'static,
{
    Arc::new(move |ctx: Context, shard: usize, batch: Batch<T>| {
        let handler = handler.clone();
        async move { handler.process(ctx, shard, batch).await }.boxed()
    })
}

pub(crate) fn split_fn<T, H>(handler: Arc<H>) -> SplitFn
where
    T: Send + 'static,
    H: BatchHandler<T> + ?Sized + 'static,
{
    Arc::new(move |key: &str| handler.split(key))
}
