//! Bounded retry loop driven by a backoff strategy.
//!
//! Cancellation is observed only at the top of each iteration; an operation
//! already in flight runs to completion.

use crate::backoff::{BackoffStrategy, Exponential};
use crate::context::Context;
use crate::errors::RetryError;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Decides whether an error is worth another attempt.
pub type Retryable<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Retry executor.
///
/// `attempts` counts total invocations; zero means retry without limit.
pub struct Retry<E> {
    attempts: u32,
    retryable: Retryable<E>,
    backoff: Arc<dyn BackoffStrategy>,
}

impl<E> Clone for Retry<E> {
    fn clone(&self) -> Self {
        Self {
            attempts: self.attempts,
            retryable: self.retryable.clone(),
            backoff: self.backoff.clone(),
        }
    }
}

impl<E> fmt::Debug for Retry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retry")
            .field("attempts", &self.attempts)
            .field("retryable", &"<fn>")
            .field("backoff", &"<strategy>")
            .finish()
    }
}

impl<E> Default for Retry<E> {
    fn default() -> Self {
        Self {
            attempts: 3,
            retryable: Arc::new(|_| true),
            backoff: Arc::new(Exponential::default()),
        }
    }
}

impl<E> Retry<E> {
    /// Creates a retry executor: three attempts, every error retryable,
    /// default exponential backoff.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the attempt budget. Zero means unlimited.
    #[must_use]
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Sets the retryable predicate.
    #[must_use]
    pub fn with_retryable<F>(mut self, retryable: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.retryable = Arc::new(retryable);
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, backoff: Arc<dyn BackoffStrategy>) -> Self {
        self.backoff = backoff;
        self
    }

    /// Returns the attempt budget.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Runs `operation` until it succeeds, the error is not retryable, the
    /// budget is spent, or `ctx` is cancelled.
    pub async fn run<T, F, Fut>(&self, ctx: &Context, mut operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut(Context) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let mut retries: u32 = 0;

        loop {
            if ctx.is_cancelled() {
                return Err(RetryError::Cancelled(ctx.cancel_reason()));
            }

            let err = match operation(ctx.clone()).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !(self.retryable)(&err) {
                return Err(RetryError::NotRetryable(err));
            }

            retries += 1;
            if self.attempts > 0 && retries >= self.attempts {
                tracing::debug!(attempts = retries, error = %err, "Retries exhausted");
                return Err(RetryError::Exhausted {
                    attempts: retries,
                    last: err,
                });
            }

            let delay = self.backoff.backoff(retries);
            tracing::debug!(
                attempt = retries,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "Retrying after error"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// Runs `operation` with a default [`Retry`].
pub async fn retry<T, E, F, Fut>(ctx: &Context, operation: F) -> Result<T, RetryError<E>>
where
    F: FnMut(Context) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    Retry::new().run(ctx, operation).await
}
