//! Retry with exponential backoff
//!
//! Runs an async operation, retrying failures the caller classifies as
//! transient. Delays double from `initial_delay` up to `max_delay`, and the
//! operation runs at most `max_retries + 1` times. A terminal failure is
//! returned to the caller exactly as the operation produced it.

use crate::config::RetryConfig;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Failure of a cancellable retry loop
#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Failed(E),
}

/// Bookkeeping for a single `retry_if` call
#[derive(Debug)]
struct RetryState<E> {
    attempt: u32,

    /// Error of the most recent retried attempt
    last_error: Option<E>,
}

impl<E> RetryState<E> {
    fn new() -> Self {
        Self {
            attempt: 0,
            last_error: None,
        }
    }
}

/// Retry schedule: attempt budget and delay bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts allowed after the first one
    pub max_retries: u32,

    /// Delay before the first retry
    pub initial_delay: Duration,

    /// Ceiling for any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay,
        }
    }

    /// Builds a policy from the `[retry]` configuration section
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.initial_delay_ms),
            Duration::from_millis(config.max_delay_ms),
        )
    }

    /// Delay to wait after the failure of zero-based `attempt`
    ///
    /// `min(initial_delay * 2^attempt, max_delay)`, saturating instead of
    /// overflowing for large attempt numbers.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Retries every failure until the attempt budget is spent
    pub async fn retry<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        self.retry_if(operation, |_| true).await
    }

    /// Retries failures for which `should_retry` returns true
    ///
    /// # Returns
    ///
    /// * `Ok(T)` - The first successful result
    /// * `Err(E)` - The error of the last attempt, when the budget is spent
    ///   or `should_retry` rejected it
    pub async fn retry_if<T, E, F, Fut, P>(
        &self,
        mut operation: F,
        should_retry: P,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: fmt::Display,
    {
        let mut state = RetryState::new();

        loop {
            let error = match operation().await {
                Ok(value) => {
                    if let Some(last_error) = &state.last_error {
                        tracing::debug!(
                            "Succeeded after {} retries (last error: {})",
                            state.attempt,
                            last_error
                        );
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if state.attempt >= self.max_retries || !should_retry(&error) {
                return Err(error);
            }

            let delay = self.delay_for_attempt(state.attempt);
            state.attempt += 1;
            tracing::warn!(
                "Attempt {}/{} failed: {}; retrying in {:?}",
                state.attempt,
                self.max_retries + 1,
                error,
                delay
            );
            state.last_error = Some(error);
            tokio::time::sleep(delay).await;
        }
    }

    /// Like [`retry_if`](Self::retry_if), but stops when `cancel` fires
    ///
    /// Cancellation is observed during an attempt as well as during the
    /// delay between attempts.
    pub async fn retry_if_or_cancel<T, E, F, Fut, P>(
        &self,
        cancel: &CancellationToken,
        operation: F,
        should_retry: P,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: fmt::Display,
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RetryError::Cancelled),
            result = self.retry_if(operation, should_retry) => result.map_err(RetryError::Failed),
        }
    }
}
