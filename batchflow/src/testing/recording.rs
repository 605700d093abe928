//! A batch handler that records every flush.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};
use tokio::time::Instant;

use crate::context::Context;
use crate::pipeline::{Batch, BatchHandler, SplitFn};

/// One observed flush.
#[derive(Debug, Clone, PartialEq)]
pub struct FlushRecord<T> {
    /// Shard index passed to the handler.
    pub shard: usize,
    /// Whether the dispatch context carried the mirror flag.
    pub mirror: bool,
    /// When the handler was invoked.
    pub at: Instant,
    /// The flushed batch.
    pub batch: Batch<T>,
}

/// A [`BatchHandler`] that stores each flush for later inspection.
pub struct RecordingHandler<T> {
    split: SplitFn,
    records: Mutex<Vec<FlushRecord<T>>>,
    notify: Notify,
    gate: Option<Arc<Semaphore>>,
}

impl<T> RecordingHandler<T> {
    /// Creates a handler routing keys with `split`.
    #[must_use]
    pub fn new<F>(split: F) -> Self
    where
        F: Fn(&str) -> usize + Send + Sync + 'static,
    {
        Self {
            split: Arc::new(split),
            records: Mutex::new(Vec::new()),
            notify: Notify::new(),
            gate: None,
        }
    }

    /// Creates a handler that parses keys as shard numbers.
    ///
    /// Keys that are not numbers route to shard 0.
    #[must_use]
    pub fn numeric() -> Self {
        Self::new(|key| key.parse().unwrap_or(0))
    }

    /// Makes every flush wait for a permit from `gate` before recording.
    ///
    /// Permits are consumed, so a test controls exactly how many flushes
    /// may complete.
    #[must_use]
    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Returns the number of recorded flushes.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Returns true if nothing has been flushed.
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Waits until at least `count` flushes are recorded.
    ///
    /// Returns false if `timeout` elapses first.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let reached = async {
            loop {
                let notified = self.notify.notified();
                if self.len() >= count {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, reached).await.is_ok()
    }
}

impl<T: Clone> RecordingHandler<T> {
    /// Returns a copy of every recorded flush, in invocation order.
    pub fn records(&self) -> Vec<FlushRecord<T>> {
        self.records.lock().clone()
    }

    /// Returns the batches flushed by one shard of one traffic class.
    pub fn batches(&self, shard: usize, mirror: bool) -> Vec<Batch<T>> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.shard == shard && r.mirror == mirror)
            .map(|r| r.batch.clone())
            .collect()
    }

    /// Returns every value flushed under `key`, across all batches.
    pub fn values(&self, key: &str) -> Vec<T> {
        self.records
            .lock()
            .iter()
            .filter_map(|r| r.batch.get(key))
            .flat_map(|values| values.iter().cloned())
            .collect()
    }
}

impl<T> std::fmt::Debug for RecordingHandler<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingHandler")
            .field("flushes", &self.len())
            .field("gated", &self.gate.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<T: Send + 'static> BatchHandler<T> for RecordingHandler<T> {
    async fn process(&self, ctx: Context, shard: usize, batch: Batch<T>) {
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        self.records.lock().push(FlushRecord {
            shard,
            mirror: ctx.is_mirror(),
            at: Instant::now(),
            batch,
        });
        self.notify.notify_waiters();
    }

    fn split(&self, key: &str) -> usize {
        (self.split)(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_records_flushes() {
        let handler = RecordingHandler::numeric();
        handler
            .process(Context::mirror(), 2, Batch::from([("2".to_string(), vec![1, 2])]))
            .await;
        handler
            .process(Context::background(), 2, Batch::from([("2".to_string(), vec![3])]))
            .await;

        assert_eq!(handler.len(), 2);
        assert_eq!(handler.batches(2, true).len(), 1);
        assert_eq!(handler.values("2"), vec![1, 2, 3]);
        assert!(handler.records()[0].mirror);
        assert!(!handler.records()[1].mirror);
    }

    #[test]
    fn test_numeric_split() {
        let handler: RecordingHandler<u8> = RecordingHandler::numeric();
        assert_eq!(handler.split("7"), 7);
        assert_eq!(handler.split("seven"), 0);
    }

    #[tokio::test]
    async fn test_wait_for_times_out() {
        let handler: RecordingHandler<u8> = RecordingHandler::numeric();
        assert!(!handler.wait_for(1, Duration::from_millis(5)).await);
        assert!(handler.wait_for(0, Duration::from_millis(5)).await);
    }
}
