//! The sharded batching pipeline.

use super::config::PipelineConfig;
use super::handler::{process_fn, split_fn, Batch, BatchHandler, ProcessFn, SplitFn};
use super::worker::{Message, ShardWorker};
use crate::context::Context;
use crate::errors::PipelineError;
use crate::metrics::{MetricsSink, NoOpMetricsSink, ShardLabel};
use futures::FutureExt;
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

type Receivers<T> = Vec<mpsc::Receiver<Message<T>>>;

/// Merges keyed values into per-shard batches and hands them to a handler.
///
/// Each of the `worker` shards owns a primary queue and a mirror queue, and
/// each queue is drained by its own task. A shard flushes when it holds
/// `max_size` values or when its flush interval elapses, whichever comes
/// first. First flushes are staggered across one interval.
///
/// ```rust,ignore
/// let pipeline = Pipeline::new(PipelineConfig::new().with_worker(4))
///     .with_process(|_ctx, shard, batch| async move { store(shard, batch).await })
///     .with_split(|key| key.len());
/// pipeline.start();
/// pipeline.add(&Context::background(), "user:1", 1)?;
/// pipeline.close().await?;
/// ```
///
/// `add` and `sync_add` must not race with `close`: a value pushed after the
/// shutdown marker is never flushed.
pub struct Pipeline<T> {
    config: PipelineConfig,
    process: Option<ProcessFn<T>>,
    split: Option<SplitFn>,
    metrics: Arc<dyn MetricsSink>,
    senders: Vec<mpsc::Sender<Message<T>>>,
    mirror_senders: Vec<mpsc::Sender<Message<T>>>,
    receivers: Mutex<Option<(Receivers<T>, Receivers<T>)>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
    closed: AtomicBool,
    dropped: AtomicU64,
}

impl<T: Send + 'static> Pipeline<T> {
    /// Creates a pipeline and allocates its queues. No worker runs until
    /// [`start`](Self::start).
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        let config = config.fixed();
        let (senders, receivers): (Vec<_>, Vec<_>) =
            (0..config.worker).map(|_| mpsc::channel(config.buffer)).unzip();
        let (mirror_senders, mirror_receivers): (Vec<_>, Vec<_>) =
            (0..config.worker).map(|_| mpsc::channel(config.buffer)).unzip();

        Self {
            config,
            process: None,
            split: None,
            metrics: Arc::new(NoOpMetricsSink),
            senders,
            mirror_senders,
            receivers: Mutex::new(Some((receivers, mirror_receivers))),
            workers: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    /// Installs both callbacks from one handler.
    #[must_use]
    pub fn with_handler<H>(mut self, handler: Arc<H>) -> Self
    where
        H: BatchHandler<T> + ?Sized + 'static,
    {
        self.split = Some(split_fn::<T, _>(handler.clone()));
        self.process = Some(process_fn(handler));
        self
    }

    /// Sets the batch processing callback.
    #[must_use]
    pub fn with_process<F, Fut>(mut self, process: F) -> Self
    where
        F: Fn(Context, usize, Batch<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.process = Some(Arc::new(move |ctx: Context, shard: usize, batch: Batch<T>| {
            process(ctx, shard, batch).boxed()
        }));
        self
    }

    /// Sets the key-to-shard callback. The result is taken modulo `worker`.
    #[must_use]
    pub fn with_split<F>(mut self, split: F) -> Self
    where
        F: Fn(&str) -> usize + Send + Sync + 'static,
    {
        self.split = Some(Arc::new(split));
        self
    }

    /// Sets the metrics sink.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Spawns one worker per primary queue and one per mirror queue.
    ///
    /// Must run inside a tokio runtime. Calling it again is a no-op.
    ///
    /// # Panics
    ///
    /// Panics if the process or split callback has not been set.
    pub fn start(&self) {
        let Some(process) = self.process.clone() else {
            panic!("pipeline '{}': process callback must be set before start", self.config.name);
        };
        assert!(
            self.split.is_some(),
            "pipeline '{}': split callback must be set before start",
            self.config.name
        );

        if self.closed.load(Ordering::SeqCst) {
            warn!(pipeline = %self.config.name, "Start called on a closed pipeline");
            return;
        }
        if self.started.swap(true, Ordering::SeqCst) {
            warn!(pipeline = %self.config.name, "Pipeline already started");
            return;
        }

        let Some((receivers, mirror_receivers)) = self.receivers.lock().take() else {
            return;
        };

        let mut workers = self.workers.lock();
        let queues = receivers
            .into_iter()
            .enumerate()
            .map(|(index, rx)| (index, false, rx))
            .chain(mirror_receivers.into_iter().enumerate().map(|(index, rx)| (index, true, rx)));
        for (index, mirror, rx) in queues {
            let worker = ShardWorker::new(
                &self.config,
                index,
                mirror,
                rx,
                process.clone(),
                self.metrics.clone(),
            );
            workers.push(tokio::spawn(worker.run()));
        }

        info!(
            pipeline = %self.config.name,
            worker = self.config.worker,
            max_size = self.config.max_size,
            interval_us = u64::try_from(self.config.interval().as_micros()).unwrap_or(u64::MAX),
            buffer = self.config.buffer,
            "Pipeline started"
        );
    }

    /// Enqueues a value without waiting.
    ///
    /// Contexts carrying the mirror flag go to the mirror queue of the shard.
    /// Returns [`PipelineError::QueueFull`] if that queue is at capacity.
    pub fn add(&self, ctx: &Context, key: impl Into<String>, value: T) -> Result<(), PipelineError> {
        let key = key.into();
        let (shard, mirror) = self.route(ctx, &key)?;

        match self.sender(shard, mirror).try_send(Message::Data { key, value }) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                let label = self.shard_label(shard, mirror);
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                self.metrics.record_dropped(&label);
                warn!(
                    pipeline = %self.config.name,
                    shard,
                    mirror,
                    dropped,
                    "Shard queue full, value rejected"
                );
                Err(PipelineError::QueueFull {
                    name: self.config.name.clone(),
                    shard,
                    mirror,
                })
            }
            Err(TrySendError::Closed(_)) => Err(PipelineError::Closed),
        }
    }

    /// Enqueues a value, waiting for queue capacity.
    ///
    /// Returns [`PipelineError::Cancelled`] if `ctx` is cancelled first.
    pub async fn sync_add(
        &self,
        ctx: &Context,
        key: impl Into<String>,
        value: T,
    ) -> Result<(), PipelineError> {
        let key = key.into();
        let (shard, mirror) = self.route(ctx, &key)?;
        let tx = self.sender(shard, mirror);

        tokio::select! {
            biased;
            () = ctx.cancelled() => {
                debug!(pipeline = %self.config.name, shard, mirror, "Blocking enqueue cancelled");
                Err(PipelineError::Cancelled(ctx.cancel_reason()))
            }
            sent = tx.send(Message::Data { key, value }) => sent.map_err(|_| PipelineError::Closed),
        }
    }

    /// Stops the pipeline after every queue has been drained and flushed.
    ///
    /// Pushes one shutdown marker per queue and waits for all workers to
    /// exit. Closing a pipeline that never started, or closing twice, is a
    /// no-op.
    pub async fn close(&self) -> Result<(), PipelineError> {
        if self.closed.swap(true, Ordering::SeqCst) || !self.started.load(Ordering::SeqCst) {
            return Ok(());
        }

        info!(pipeline = %self.config.name, "Draining pipeline");
        for tx in self.senders.iter().chain(&self.mirror_senders) {
            // A send error means that worker already exited; its join reports why.
            let _ = tx.send(Message::Shutdown).await;
        }

        let workers = std::mem::take(&mut *self.workers.lock());
        let mut failure = None;
        for handle in workers {
            if let Err(err) = handle.await {
                error!(pipeline = %self.config.name, error = %err, "Shard worker failed");
                failure.get_or_insert_with(|| err.to_string());
            }
        }

        info!(
            pipeline = %self.config.name,
            dropped = self.dropped.load(Ordering::Relaxed),
            "Pipeline closed"
        );
        failure.map_or(Ok(()), |msg| Err(PipelineError::WorkerFailed(msg)))
    }

    fn route(&self, ctx: &Context, key: &str) -> Result<(usize, bool), PipelineError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PipelineError::Closed);
        }
        if !self.started.load(Ordering::SeqCst) {
            return Err(PipelineError::NotStarted);
        }
        let shard = self.shard_for(key).ok_or(PipelineError::NotStarted)?;
        Ok((shard, ctx.is_mirror()))
    }

    fn sender(&self, shard: usize, mirror: bool) -> &mpsc::Sender<Message<T>> {
        if mirror {
            &self.mirror_senders[shard]
        } else {
            &self.senders[shard]
        }
    }
}

impl<T> Pipeline<T> {
    /// Returns the pipeline name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Returns the effective configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Returns the shard `key` routes to, once a split callback is set.
    pub fn shard_for(&self, key: &str) -> Option<usize> {
        self.split.as_ref().map(|split| split(key) % self.config.worker)
    }

    /// Returns the metric label of a shard.
    pub fn shard_label(&self, shard: usize, mirror: bool) -> ShardLabel {
        ShardLabel::new(&self.config.name, shard, mirror)
    }

    /// Returns the number of values waiting in a shard queue.
    pub fn queue_len(&self, shard: usize, mirror: bool) -> usize {
        let senders = if mirror { &self.mirror_senders } else { &self.senders };
        senders
            .get(shard)
            .map_or(0, |tx| tx.max_capacity() - tx.capacity())
    }

    /// Returns how many values `add` rejected because a queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Returns true once `start` has spawned the workers.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Returns true once `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl<T> fmt::Debug for Pipeline<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("started", &self.is_started())
            .field("closed", &self.is_closed())
            .field("dropped", &self.dropped())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn noop() -> Pipeline<u32> {
        Pipeline::new(
            PipelineConfig::new()
                .with_worker(3)
                .with_interval(Duration::from_millis(10)),
        )
        .with_process(|_ctx, _shard, _batch| async {})
        .with_split(|key: &str| key.parse().unwrap_or(0))
    }

    #[test]
    fn test_new_applies_defaults() {
        let pipeline: Pipeline<u32> = Pipeline::new(PipelineConfig::new().with_worker(0).with_name(""));
        assert_eq!(pipeline.config().worker, 10);
        assert_eq!(pipeline.name(), "anonymous");
        assert!(!pipeline.is_started());
    }

    #[test]
    fn test_shard_for_wraps_modulo_worker() {
        let pipeline = noop();
        assert_eq!(pipeline.shard_for("1"), Some(1));
        assert_eq!(pipeline.shard_for("4"), Some(1));
        assert_eq!(pipeline.shard_for("x"), Some(0));
    }

    #[test]
    fn test_shard_for_without_split() {
        let pipeline: Pipeline<u32> = Pipeline::new(PipelineConfig::new());
        assert_eq!(pipeline.shard_for("1"), None);
    }

    #[test]
    fn test_add_before_start() {
        let pipeline = noop();
        assert_eq!(
            pipeline.add(&Context::background(), "1", 1),
            Err(PipelineError::NotStarted)
        );
    }

    #[tokio::test]
    async fn test_queue_len_counts_pending() {
        let pipeline = Pipeline::new(
            PipelineConfig::new()
                .with_worker(2)
                .with_buffer(8)
                .with_interval(Duration::from_secs(3600)),
        )
        .with_process(|_ctx, _shard, _batch: Batch<u32>| async {})
        .with_split(|_key: &str| 1);
        pipeline.start();

        // No yield between the pushes, so the current-thread worker has not run.
        pipeline.add(&Context::background(), "a", 1).unwrap();
        pipeline.add(&Context::mirror(), "a", 2).unwrap();
        pipeline.add(&Context::mirror(), "a", 3).unwrap();

        assert_eq!(pipeline.queue_len(1, false), 1);
        assert_eq!(pipeline.queue_len(1, true), 2);
        assert_eq!(pipeline.queue_len(0, false), 0);
        assert_eq!(pipeline.queue_len(9, false), 0);

        pipeline.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let pipeline = noop();
        pipeline.start();
        pipeline.close().await.unwrap();
        pipeline.close().await.unwrap();
        assert!(pipeline.is_closed());
    }
}
