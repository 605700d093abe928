//! Shard worker: accumulates values and flushes them by size or time.

use super::config::PipelineConfig;
use super::handler::{Batch, ProcessFn};
use crate::context::Context;
use crate::metrics::{MetricsSink, ShardLabel};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Item carried by a shard queue.
#[derive(Debug)]
pub(crate) enum Message<T> {
    /// A value to batch under `key`.
    Data { key: String, value: T },
    /// No more input will follow; flush and exit.
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlushReason {
    Size,
    Interval,
    Shutdown,
}

impl FlushReason {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Size => "size",
            Self::Interval => "interval",
            Self::Shutdown => "shutdown",
        }
    }
}

/// One accumulate-and-flush loop, owning its queue receiver and batch.
pub(crate) struct ShardWorker<T> {
    index: usize,
    mirror: bool,
    label: ShardLabel,
    max_size: usize,
    interval: Duration,
    first_interval: Duration,
    rx: mpsc::Receiver<Message<T>>,
    process: ProcessFn<T>,
    metrics: Arc<dyn MetricsSink>,
}

impl<T: Send + 'static> ShardWorker<T> {
    pub(crate) fn new(
        config: &PipelineConfig,
        index: usize,
        mirror: bool,
        rx: mpsc::Receiver<Message<T>>,
        process: ProcessFn<T>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            index,
            mirror,
            label: ShardLabel::new(&config.name, index, mirror),
            max_size: config.max_size,
            interval: config.interval(),
            first_interval: config.first_interval(index),
            rx,
            process,
            metrics,
        }
    }

    fn dispatch_context(&self) -> Context {
        if self.mirror {
            Context::mirror()
        } else {
            Context::background()
        }
    }

    pub(crate) async fn run(mut self) {
        let mut batch: Batch<T> = Batch::new();
        let mut count = 0usize;
        let timer = tokio::time::sleep(self.first_interval);
        tokio::pin!(timer);

        debug!(
            shard = %self.label,
            first_interval_us = u64::try_from(self.first_interval.as_micros()).unwrap_or(u64::MAX),
            "Shard worker started"
        );

        loop {
            let reason = tokio::select! {
                msg = self.rx.recv() => match msg {
                    Some(Message::Data { key, value }) => {
                        batch.entry(key).or_default().push(value);
                        count += 1;
                        if count < self.max_size {
                            continue;
                        }
                        FlushReason::Size
                    }
                    // A closed channel means every sender is gone; treat it as shutdown.
                    Some(Message::Shutdown) | None => FlushReason::Shutdown,
                },
                () = &mut timer => FlushReason::Interval,
            };

            let processed = count;
            if !batch.is_empty() {
                trace!(
                    shard = %self.label,
                    keys = batch.len(),
                    values = processed,
                    reason = reason.as_str(),
                    "Flushing batch"
                );
                let ctx = self.dispatch_context();
                (self.process)(ctx, self.index, std::mem::take(&mut batch)).await;
                count = 0;
            }

            self.metrics.record_queue_len(&self.label, self.rx.len());
            self.metrics.record_processed(&self.label, processed);

            if reason == FlushReason::Shutdown {
                break;
            }
            timer.as_mut().reset(Instant::now() + self.interval);
        }

        debug!(shard = %self.label, "Shard worker stopped");
    }
}
