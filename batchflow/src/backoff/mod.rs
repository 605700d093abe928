//! Exponential backoff with multiplicative jitter.
//!
//! Every delay after the first is scaled by a random factor in
//! `1 ± jitter`.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Maps a retry count to the time to wait before the next attempt.
pub trait BackoffStrategy: Send + Sync {
    /// Returns the delay to apply after `retries` consecutive failures.
    fn backoff(&self, retries: u32) -> Duration;
}

/// Exponential backoff, modelled on the gRPC connection-backoff algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exponential {
    /// Delay after the first failure in nanoseconds.
    #[serde(default = "default_base_delay_ns")]
    pub base_delay_ns: u64,
    /// Upper bound on the delay in nanoseconds.
    #[serde(default = "default_max_delay_ns")]
    pub max_delay_ns: u64,
    /// Growth factor per retry. Should be greater than 1.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Randomization factor in `[0, 1]`.
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

fn default_base_delay_ns() -> u64 {
    150_000_000
}

fn default_max_delay_ns() -> u64 {
    15_000_000_000
}

fn default_multiplier() -> f64 {
    1.6
}

fn default_jitter() -> f64 {
    0.2
}

impl Default for Exponential {
    fn default() -> Self {
        Self {
            base_delay_ns: default_base_delay_ns(),
            max_delay_ns: default_max_delay_ns(),
            multiplier: default_multiplier(),
            jitter: default_jitter(),
        }
    }
}

impl Exponential {
    /// Creates an exponential backoff with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay_ns = duration_ns(delay);
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay_ns = duration_ns(delay);
        self
    }

    /// Sets the multiplier.
    #[must_use]
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Sets the jitter factor, clamped to `[0, 1]`.
    #[must_use]
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Returns the base delay.
    #[must_use]
    pub fn base_delay(&self) -> Duration {
        Duration::from_nanos(self.base_delay_ns)
    }

    /// Returns the maximum delay.
    #[must_use]
    pub fn max_delay(&self) -> Duration {
        Duration::from_nanos(self.max_delay_ns)
    }

    /// Computes the clamped delay in nanoseconds before jitter is applied.
    fn grown_ns(&self, mut retries: u32) -> f64 {
        let max = self.max_delay_ns as f64;
        let mut backoff = self.base_delay_ns as f64;
        while backoff < max && retries > 0 {
            backoff *= self.multiplier;
            retries -= 1;
        }
        backoff.min(max)
    }
}

impl BackoffStrategy for Exponential {
    fn backoff(&self, retries: u32) -> Duration {
        if retries == 0 {
            return self.base_delay();
        }

        let spread: f64 = rand::thread_rng().gen_range(-1.0..1.0);
        let backoff = self.grown_ns(retries) * (1.0 + self.jitter * spread);
        if backoff.is_nan() || backoff <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(backoff as u64)
    }
}

fn duration_ns(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}
