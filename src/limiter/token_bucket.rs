//! Token bucket state and arithmetic
//!
//! The bucket itself is plain data driven by an explicit `now`, so the
//! refill and wait calculations can be exercised without a runtime.

use std::time::Duration;
use tokio::time::Instant;

/// Upper bound for the adaptive backoff multiplier
pub const MAX_BACKOFF_MULTIPLIER: f64 = 32.0;

/// Slowest refill rate a bucket accepts (one token every ~17 minutes)
pub const MIN_REFILL_PER_SECOND: f64 = 0.001;

/// Longest single wait `wait_time` will report
pub const MAX_WAIT: Duration = Duration::from_secs(24 * 60 * 60);

/// Counters describing how the limiter has paced requests so far
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LimiterStats {
    /// Tokens handed out
    pub acquired: u64,

    /// Acquisitions that had to suspend before a token was available
    pub waited: u64,

    /// Total time spent suspended in `acquire`
    pub total_wait: Duration,

    /// Number of `rate_limited()` signals received
    pub rate_limit_hits: u64,
}

/// Mutable state of a token bucket
#[derive(Debug, Clone)]
pub struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
    max_tokens: f64,
    refill_rate_per_second: f64,
    backoff_multiplier: f64,
    pub(crate) stats: LimiterStats,
}

impl TokenBucket {
    /// Creates a full bucket
    ///
    /// `max_tokens` is raised to at least 1 and `refill_rate_per_second` is
    /// clamped to [`MIN_REFILL_PER_SECOND`]..=`f64::MAX`; NaN takes the lower bound.
    pub fn new(max_tokens: f64, refill_rate_per_second: f64, now: Instant) -> Self {
        let max_tokens = max_tokens.max(1.0);
        let refill_rate_per_second = refill_rate_per_second
            .max(MIN_REFILL_PER_SECOND)
            .min(f64::MAX);

        Self {
            tokens: max_tokens,
            last_refill: now,
            max_tokens,
            refill_rate_per_second,
            backoff_multiplier: 1.0,
            stats: LimiterStats::default(),
        }
    }

    /// Adds the tokens accrued since the last refill, clamped to capacity
    pub fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate_per_second).min(self.max_tokens);
        self.last_refill = now;
    }

    /// Consumes one token if a whole token is available
    pub fn try_consume(&mut self) -> bool {
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Consumes one token without checking availability
    ///
    /// May leave `tokens` slightly below zero; the next refill absorbs it.
    pub fn consume(&mut self) {
        self.tokens -= 1.0;
    }

    /// Time until one token is available, stretched by the backoff multiplier
    ///
    /// Never longer than [`MAX_WAIT`].
    pub fn wait_time(&self) -> Duration {
        let missing = (1.0 - self.tokens).max(0.0);
        let secs = missing / self.refill_rate_per_second * self.backoff_multiplier;
        Duration::try_from_secs_f64(secs).map_or(MAX_WAIT, |wait| wait.min(MAX_WAIT))
    }

    /// Doubles the backoff multiplier, up to [`MAX_BACKOFF_MULTIPLIER`]
    pub fn escalate(&mut self) {
        self.backoff_multiplier = (self.backoff_multiplier * 2.0).min(MAX_BACKOFF_MULTIPLIER);
        self.stats.rate_limit_hits += 1;
    }

    /// Resets the backoff multiplier to 1
    pub fn reset_backoff(&mut self) {
        self.backoff_multiplier = 1.0;
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    pub fn max_tokens(&self) -> f64 {
        self.max_tokens
    }

    pub fn refill_rate_per_second(&self) -> f64 {
        self.refill_rate_per_second
    }

    pub fn backoff_multiplier(&self) -> f64 {
        self.backoff_multiplier
    }
}
