//! Retry policy with exponential backoff and jitter.
//!
//! A policy is normalized when a chain is created: out-of-range values are
//! clamped, never rejected.

use crate::errors::{Sentinel, StepError};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound for [`RetryPolicy::max_attempts`].
pub const MAX_RETRY_ATTEMPTS: u32 = 8;

/// Base delay used when none (or zero) is configured.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(10);

/// Upper bound for [`RetryPolicy::base_delay`].
pub const MAX_BASE_DELAY: Duration = Duration::from_secs(1);

fn default_base_delay() -> Duration {
    DEFAULT_BASE_DELAY
}

/// Configuration for retrying failed steps.
///
/// The default policy never retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt. `0` disables retry, at most 8.
    #[serde(default)]
    pub max_attempts: u32,
    /// Delay before the first retry; doubled for each later retry.
    /// Clamped to `(0, 1s]`.
    #[serde(default = "default_base_delay")]
    pub base_delay: Duration,
    /// Errors that are surfaced immediately instead of retried.
    #[serde(default)]
    pub non_retryable: Vec<Sentinel>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            base_delay: DEFAULT_BASE_DELAY,
            non_retryable: Vec::new(),
        }
    }
}

impl RetryPolicy {
    /// Creates a policy that never retries.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of retries after the first attempt.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the base delay in milliseconds.
    #[must_use]
    pub fn with_base_delay_ms(self, delay: u64) -> Self {
        self.with_base_delay(Duration::from_millis(delay))
    }

    /// Adds an error that must not be retried.
    #[must_use]
    pub fn with_non_retryable(mut self, sentinel: Sentinel) -> Self {
        self.non_retryable.push(sentinel);
        self
    }

    /// Returns a copy with every field clamped into its valid range.
    #[must_use]
    pub fn normalized(&self) -> Self {
        let base_delay = if self.base_delay.is_zero() {
            DEFAULT_BASE_DELAY
        } else {
            self.base_delay.min(MAX_BASE_DELAY)
        };

        Self {
            max_attempts: self.max_attempts.min(MAX_RETRY_ATTEMPTS),
            base_delay,
            non_retryable: self.non_retryable.clone(),
        }
    }

    /// Returns true if the policy allows any retry at all.
    #[must_use]
    pub fn retries_enabled(&self) -> bool {
        self.max_attempts > 0
    }

    /// Returns true if `error` may be retried under this policy.
    ///
    /// Argument-shape errors are deterministic and never retried.
    #[must_use]
    pub fn is_retryable(&self, error: &StepError) -> bool {
        !error.is_argument_error() && !self.non_retryable.iter().any(|s| error.is(s))
    }

    /// Un-jittered delay before retry `attempt` (0-indexed):
    /// `base_delay * 2^attempt`.
    #[must_use]
    pub fn base_backoff(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Delay before retry `attempt` (0-indexed), including jitter.
    ///
    /// The result lies in `[base * 2^attempt, base * 2^attempt * 1.5)`.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        with_jitter(self.base_backoff(attempt), &mut rand::thread_rng())
    }
}

/// Adds a uniformly random jitter in `[0, delay / 2)` to `delay`.
pub fn with_jitter<R: Rng>(delay: Duration, rng: &mut R) -> Duration {
    let half_nanos = u64::try_from(delay.as_nanos() / 2).unwrap_or(u64::MAX);
    if half_nanos == 0 {
        return delay;
    }
    delay.saturating_add(Duration::from_nanos(rng.gen_range(0..half_nanos)))
}
