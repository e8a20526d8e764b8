//! Reconnection backoff.
//!
//! The n-th scheduled retry (counting from zero) waits
//! `base_delay * growth_factor^n`. After `max_attempts` scheduled retries
//! without a successful login the feed gives up and waits for a manual
//! reconnect. A successful login resets the counter.

use std::time::Duration;

use crate::constants::defaults;
use crate::error::{FeedError, Result};

/// Exponential backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Multiplier applied per consecutive failure. Must be greater than 1.
    pub growth_factor: f64,
    /// Retries scheduled before giving up.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(defaults::RECONNECT_BASE_DELAY_MS),
            growth_factor: defaults::RECONNECT_GROWTH_FACTOR,
            max_attempts: defaults::RECONNECT_MAX_ATTEMPTS,
        }
    }
}

impl RetryPolicy {
    /// Reject parameters that would not produce a strictly growing,
    /// terminating sequence of delays.
    pub fn validate(&self) -> Result<()> {
        if self.base_delay.is_zero() {
            return Err(FeedError::InvalidArgument(
                "retry base delay must be non-zero".into(),
            ));
        }
        if !self.growth_factor.is_finite() || self.growth_factor <= 1.0 {
            return Err(FeedError::InvalidArgument(format!(
                "retry growth factor must be finite and > 1.0, got {}",
                self.growth_factor
            )));
        }
        if self.max_attempts == 0 {
            return Err(FeedError::InvalidArgument(
                "retry max attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Delay for the zero-based retry `attempt`. Saturates at `Duration::MAX`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.growth_factor.powi(exponent);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}

/// Retry counter for the current run of failures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryState {
    attempt: u32,
}

impl RetryState {
    /// Number of retries scheduled since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Back to zero, after a successful login or a manual reconnect.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Claim the next retry: returns its one-based number and delay, or
    /// `None` once `policy.max_attempts` retries have been scheduled.
    pub fn next_retry(&mut self, policy: &RetryPolicy) -> Option<(u32, Duration)> {
        if self.attempt >= policy.max_attempts {
            return None;
        }
        let delay = policy.delay_for(self.attempt);
        self.attempt += 1;
        Some((self.attempt, delay))
    }
}
