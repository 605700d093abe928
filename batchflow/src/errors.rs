//! Error types for the batchflow crate.
//!
//! The pipeline surfaces only queue-full and cancellation errors from its
//! enqueue API. Failures inside the batch handler belong to the caller.

use thiserror::Error;

/// Convenience alias for results carrying a [`BatchflowError`].
pub type Result<T, E = BatchflowError> = std::result::Result<T, E>;

/// The main error type for batchflow operations.
#[derive(Debug, Error)]
pub enum BatchflowError {
    /// An enqueue or lifecycle error from the pipeline.
    #[error("{0}")]
    Pipeline(#[from] PipelineError),

    /// A retry loop was cancelled before the operation succeeded.
    #[error("Retry cancelled: {0}")]
    RetryCancelled(String),

    /// A retry loop gave up on the operation.
    #[error("Retry failed: {0}")]
    Retry(String),

    /// A configuration value could not be parsed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors returned by [`crate::pipeline::Pipeline`] operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// The selected shard queue has no free capacity.
    #[error("channel full: pipeline '{name}' shard {shard}{}", if *mirror { " (mirror)" } else { "" })]
    QueueFull {
        /// Pipeline name.
        name: String,
        /// Shard index the value was routed to.
        shard: usize,
        /// Whether the mirror queue was selected.
        mirror: bool,
    },

    /// The caller's context was cancelled before the push completed.
    #[error("enqueue cancelled: {0}")]
    Cancelled(String),

    /// The pipeline has not been started yet.
    #[error("pipeline not started")]
    NotStarted,

    /// The pipeline has been closed and no longer accepts input.
    #[error("pipeline closed")]
    Closed,

    /// A shard worker terminated abnormally during shutdown.
    #[error("worker failed: {0}")]
    WorkerFailed(String),
}

impl PipelineError {
    /// Returns true if this is a queue-full error.
    #[must_use]
    pub fn is_queue_full(&self) -> bool {
        matches!(self, Self::QueueFull { .. })
    }

    /// Returns true if this is a cancellation error.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

/// Outcome of a failed [`crate::retry::Retry`] run.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The governing context was cancelled at the top of the loop.
    #[error("retry cancelled: {0}")]
    Cancelled(String),

    /// The attempt budget ran out; carries the last error.
    #[error("retries exhausted after {attempts} attempts: {last}")]
    Exhausted {
        /// Number of invocations made.
        attempts: u32,
        /// The last error returned by the operation.
        last: E,
    },

    /// The retryable predicate rejected the error.
    #[error("non-retryable error: {0}")]
    NotRetryable(E),
}

impl<E> RetryError<E> {
    /// Returns the last operation error, if the loop ended on one.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Cancelled(_) => None,
            Self::Exhausted { last, .. } | Self::NotRetryable(last) => Some(last),
        }
    }

    /// Returns true if the loop ended because of cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

impl<E: std::fmt::Display> From<RetryError<E>> for BatchflowError {
    fn from(err: RetryError<E>) -> Self {
        match err {
            RetryError::Cancelled(reason) => Self::RetryCancelled(reason),
            other => Self::Retry(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_full_display() {
        let err = PipelineError::QueueFull {
            name: "counter".to_string(),
            shard: 3,
            mirror: false,
        };
        assert_eq!(err.to_string(), "channel full: pipeline 'counter' shard 3");
        assert!(err.is_queue_full());
        assert!(!err.is_cancelled());
    }

    #[test]
    fn test_queue_full_mirror_display() {
        let err = PipelineError::QueueFull {
            name: "counter".to_string(),
            shard: 0,
            mirror: true,
        };
        assert!(err.to_string().ends_with("(mirror)"));
    }

    #[test]
    fn test_pipeline_error_converts() {
        let err: BatchflowError = PipelineError::Closed.into();
        assert!(matches!(err, BatchflowError::Pipeline(PipelineError::Closed)));
    }

    #[test]
    fn test_retry_error_into_inner() {
        let exhausted: RetryError<&str> = RetryError::Exhausted {
            attempts: 3,
            last: "boom",
        };
        assert_eq!(exhausted.into_inner(), Some("boom"));

        let cancelled: RetryError<&str> = RetryError::Cancelled("deadline".to_string());
        assert!(cancelled.is_cancelled());
        assert_eq!(cancelled.into_inner(), None);
    }
}
