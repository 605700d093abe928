//! Per-shard metrics hooks.
//!
//! The pipeline reports through a [`MetricsSink`] after every flush cycle.
//! Exporting the numbers is left to the sink implementation.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Stable label identifying one shard of one pipeline.
///
/// Mirror shards carry the pipeline name prefixed with `mirror_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShardLabel {
    /// Pipeline name.
    pub name: String,
    /// Shard index.
    pub index: usize,
}

impl ShardLabel {
    /// Creates a label for a primary or mirror shard.
    #[must_use]
    pub fn new(name: &str, index: usize, mirror: bool) -> Self {
        let name = if mirror {
            format!("mirror_{name}")
        } else {
            name.to_string()
        };
        Self { name, index }
    }
}

impl fmt::Display for ShardLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.index)
    }
}

/// Receives pipeline measurements.
#[cfg_attr(test, mockall::automock)]
pub trait MetricsSink: Send + Sync {
    /// Number of values handed to the batch handler in one flush cycle.
    fn record_processed(&self, label: &ShardLabel, count: usize);

    /// Values still waiting in the shard queue after a flush cycle.
    fn record_queue_len(&self, label: &ShardLabel, len: usize);

    /// A value was rejected because the shard queue was full.
    fn record_dropped(&self, label: &ShardLabel);
}

/// A sink that discards all measurements.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpMetricsSink;

impl MetricsSink for NoOpMetricsSink {
    fn record_processed(&self, _label: &ShardLabel, _count: usize) {}
    fn record_queue_len(&self, _label: &ShardLabel, _len: usize) {}
    fn record_dropped(&self, _label: &ShardLabel) {}
}

#[derive(Debug, Default)]
struct ShardCounters {
    processed: AtomicU64,
    queue_len: AtomicU64,
    dropped: AtomicU64,
}

/// A sink keeping counters and gauges in memory.
#[derive(Debug, Default)]
pub struct InMemoryMetricsSink {
    shards: DashMap<ShardLabel, ShardCounters>,
}

impl InMemoryMetricsSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_counters(&self, label: &ShardLabel, f: impl FnOnce(&ShardCounters)) {
        if let Some(counters) = self.shards.get(label) {
            f(counters.value());
            return;
        }
        let counters = self.shards.entry(label.clone()).or_default();
        f(counters.value());
    }

    /// Returns the processed-values counter for a shard.
    #[must_use]
    pub fn processed(&self, label: &ShardLabel) -> u64 {
        self.shards
            .get(label)
            .map_or(0, |c| c.processed.load(Ordering::Relaxed))
    }

    /// Returns the last observed queue length for a shard.
    #[must_use]
    pub fn queue_len(&self, label: &ShardLabel) -> u64 {
        self.shards
            .get(label)
            .map_or(0, |c| c.queue_len.load(Ordering::Relaxed))
    }

    /// Returns the dropped-values counter for a shard.
    #[must_use]
    pub fn dropped(&self, label: &ShardLabel) -> u64 {
        self.shards
            .get(label)
            .map_or(0, |c| c.dropped.load(Ordering::Relaxed))
    }

    /// Returns the processed total across all shards.
    #[must_use]
    pub fn total_processed(&self) -> u64 {
        self.shards
            .iter()
            .map(|entry| entry.value().processed.load(Ordering::Relaxed))
            .sum()
    }

    /// Converts all counters to a JSON object keyed by `name/index`.
    #[must_use]
    pub fn to_dict(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .shards
            .iter()
            .map(|entry| {
                let c = entry.value();
                (
                    entry.key().to_string(),
                    serde_json::json!({
                        "processed": c.processed.load(Ordering::Relaxed),
                        "queue_len": c.queue_len.load(Ordering::Relaxed),
                        "dropped": c.dropped.load(Ordering::Relaxed),
                    }),
                )
            })
            .collect();
        serde_json::Value::Object(map)
    }
}

impl MetricsSink for InMemoryMetricsSink {
    fn record_processed(&self, label: &ShardLabel, count: usize) {
        self.with_counters(label, |c| {
            c.processed.fetch_add(count as u64, Ordering::Relaxed);
        });
    }

    fn record_queue_len(&self, label: &ShardLabel, len: usize) {
        self.with_counters(label, |c| c.queue_len.store(len as u64, Ordering::Relaxed));
    }

    fn record_dropped(&self, label: &ShardLabel) {
        self.with_counters(label, |c| {
            c.dropped.fetch_add(1, Ordering::Relaxed);
        });
    }
}
