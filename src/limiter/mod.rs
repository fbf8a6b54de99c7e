//! Token-bucket rate limiter with adaptive backoff
//!
//! Paces outbound requests to a fixed average rate while letting the caller
//! report server-side rate limiting:
//! - `acquire()` suspends until a token is available, then consumes it
//! - `rate_limited()` doubles the wait multiplier (capped at 32)
//! - `success()` resets the multiplier to 1
//!
//! Callers are admitted one at a time in arrival order, so several tasks may
//! share a limiter without racing on the bucket.

mod token_bucket;

pub use token_bucket::{
    LimiterStats, TokenBucket, MAX_BACKOFF_MULTIPLIER, MAX_WAIT, MIN_REFILL_PER_SECOND,
};

use crate::config::RateLimitConfig;
use crate::Cancelled;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Rate limiter shared by every outbound request of a crawl session
#[derive(Debug)]
pub struct RateLimiter {
    /// Serialises acquirers for the whole refill/wait/consume sequence
    turn: tokio::sync::Mutex<()>,
    bucket: Mutex<TokenBucket>,
}

impl RateLimiter {
    /// Creates a limiter whose bucket starts full
    ///
    /// # Arguments
    ///
    /// * `max_tokens` - Burst capacity; values below 1 are raised to 1
    /// * `refill_rate_per_second` - Average admitted requests per second; values
    ///   below [`MIN_REFILL_PER_SECOND`] (including zero, negatives and NaN) are
    ///   raised to it
    pub fn new(max_tokens: f64, refill_rate_per_second: f64) -> Self {
        Self {
            turn: tokio::sync::Mutex::new(()),
            bucket: Mutex::new(TokenBucket::new(
                max_tokens,
                refill_rate_per_second,
                Instant::now(),
            )),
        }
    }

    /// Creates a limiter from the `[rate-limit]` configuration section
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_tokens, config.refill_per_second)
    }

    fn bucket(&self) -> MutexGuard<'_, TokenBucket> {
        self.bucket.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Waits until a token is available and consumes it
    pub async fn acquire(&self) {
        let _turn = self.turn.lock().await;

        let wait = {
            let mut bucket = self.bucket();
            bucket.refill(Instant::now());
            if bucket.try_consume() {
                bucket.stats.acquired += 1;
                return;
            }
            bucket.wait_time()
        };

        tracing::debug!(
            "Rate limiter out of tokens, waiting {:?} (backoff x{})",
            wait,
            self.backoff_multiplier()
        );
        tokio::time::sleep(wait).await;

        let mut bucket = self.bucket();
        bucket.refill(Instant::now());
        bucket.consume();
        bucket.stats.acquired += 1;
        bucket.stats.waited += 1;
        bucket.stats.total_wait = bucket.stats.total_wait.saturating_add(wait);
    }

    /// Like [`acquire`](Self::acquire), but gives up when `cancel` fires
    ///
    /// A cancelled acquisition consumes no token.
    pub async fn acquire_or_cancel(&self, cancel: &CancellationToken) -> Result<(), Cancelled> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Cancelled),
            _ = self.acquire() => Ok(()),
        }
    }

    /// Reports a successful request, resetting the backoff multiplier
    pub fn success(&self) {
        let mut bucket = self.bucket();
        if bucket.backoff_multiplier() > 1.0 {
            tracing::info!("Rate limiter backoff reset after successful request");
        }
        bucket.reset_backoff();
    }

    /// Reports an upstream rate-limit response, doubling future waits
    pub fn rate_limited(&self) {
        let mut bucket = self.bucket();
        bucket.escalate();
        tracing::warn!(
            "Rate limited upstream, backoff multiplier now x{}",
            bucket.backoff_multiplier()
        );
    }

    /// Current backoff multiplier
    pub fn backoff_multiplier(&self) -> f64 {
        self.bucket().backoff_multiplier()
    }

    /// Tokens available right now, after accounting for elapsed time
    pub fn available_tokens(&self) -> f64 {
        let mut bucket = self.bucket();
        bucket.refill(Instant::now());
        bucket.tokens()
    }

    /// Snapshot of the pacing counters
    pub fn stats(&self) -> LimiterStats {
        self.bucket().stats
    }
}
