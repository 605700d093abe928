//! Pipeline configuration.

use crate::errors::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a [`super::Pipeline`].
///
/// Zero or empty values are replaced with defaults by [`fixed`](Self::fixed),
/// which the pipeline applies at construction. The configuration is
/// immutable once the pipeline exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Number of values that triggers an immediate flush of a shard.
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    /// Flush interval in nanoseconds.
    #[serde(default = "default_interval_ns")]
    pub interval_ns: u64,
    /// Capacity of each shard queue.
    #[serde(default = "default_buffer")]
    pub buffer: usize,
    /// Number of shards.
    #[serde(default = "default_worker")]
    pub worker: usize,
    /// Name used in logs and metric labels.
    #[serde(default = "default_name")]
    pub name: String,
}

fn default_max_size() -> usize {
    1000
}

fn default_interval_ns() -> u64 {
    1_000_000_000
}

fn default_buffer() -> usize {
    1000
}

fn default_worker() -> usize {
    10
}

fn default_name() -> String {
    "anonymous".to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            interval_ns: default_interval_ns(),
            buffer: default_buffer(),
            worker: default_worker(),
            name: default_name(),
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a configuration from JSON, applying defaults to missing fields.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        Ok(config.fixed())
    }

    /// Sets the batch size that forces a flush.
    #[must_use]
    pub fn with_max_size(mut self, size: usize) -> Self {
        self.max_size = size;
        self
    }

    /// Sets the flush interval.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval_ns = u64::try_from(interval.as_nanos()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the per-shard queue capacity.
    #[must_use]
    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer;
        self
    }

    /// Sets the number of shards.
    #[must_use]
    pub fn with_worker(mut self, worker: usize) -> Self {
        self.worker = worker;
        self
    }

    /// Sets the pipeline name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Replaces zero or empty values with defaults.
    #[must_use]
    pub fn fixed(mut self) -> Self {
        if self.max_size == 0 {
            self.max_size = default_max_size();
        }
        if self.interval_ns == 0 {
            self.interval_ns = default_interval_ns();
        }
        if self.buffer == 0 {
            self.buffer = default_buffer();
        }
        if self.worker == 0 {
            self.worker = default_worker();
        }
        if self.name.is_empty() {
            self.name = default_name();
        }
        self
    }

    /// Returns the flush interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_nanos(self.interval_ns)
    }

    /// Returns the delay before shard `index` first flushes.
    ///
    /// Shards are staggered across one interval so their flushes do not
    /// line up. Shard 0 waits a full interval.
    #[must_use]
    pub fn first_interval(&self, index: usize) -> Duration {
        if index == 0 || self.worker == 0 {
            return self.interval();
        }
        let step = u128::from(self.interval_ns) / self.worker as u128;
        Duration::from_nanos(u64::try_from(step * index as u128).unwrap_or(u64::MAX))
    }
}
