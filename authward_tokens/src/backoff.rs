//! Error backoff handling
//!
//! A failed request is retried after a delay of `base_delay * multiplier^n`,
//! where `n` is the number of the retry being scheduled, counting from one.
//! With the defaults, the first retry waits 400 ms, the second 800 ms, and so
//! on.
//!
//! A [`RetryBudget`] without a limit never runs out, and the default
//! configuration has no cap on the delay. Callers that cannot tolerate an
//! unbounded wait should set a limit on the budget or a
//! [maximum delay][ErrorBackoffConfig::with_max_delay].

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for how to manage backoff when an error is encountered
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ErrorBackoffConfig {
    base_delay: Duration,
    multiplier: u32,
    max_delay: Option<Duration>,
}

impl Default for ErrorBackoffConfig {
    /// Default backoff configuration
    ///
    /// Uses a base delay of 200 ms with a multiplier of 2. The delay is not
    /// capped.
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(200),
            multiplier: 2,
            max_delay: None,
        }
    }
}

impl ErrorBackoffConfig {
    /// Constructs a new backoff configuration
    pub fn new(base_delay: Duration, multiplier: u32) -> Self {
        Self {
            base_delay,
            multiplier,
            max_delay: None,
        }
    }

    /// Caps every computed delay at `max_delay`
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// The delay to wait before performing retry number `attempt`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.checked_pow(attempt).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor);
        match self.max_delay {
            Some(max) => delay.min(max),
            None => delay,
        }
    }
}

/// Tracks how many more times a single call may be retried
///
/// The budget travels with the request across every retry so that a retried
/// call resumes with the budget the previous attempt left behind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryBudget {
    times_to_retry: Option<u32>,
    retry_attempts: u32,
}

impl RetryBudget {
    /// A budget permitting at most `times_to_retry` retries
    ///
    /// A call with this budget makes at most `times_to_retry + 1` attempts.
    pub const fn limited(times_to_retry: u32) -> Self {
        Self {
            times_to_retry: Some(times_to_retry),
            retry_attempts: 0,
        }
    }

    /// A budget that never runs out
    pub const fn unlimited() -> Self {
        Self {
            times_to_retry: None,
            retry_attempts: 0,
        }
    }

    /// Retries remaining, or `None` if unlimited
    pub fn remaining(&self) -> Option<u32> {
        self.times_to_retry
    }

    /// Retries performed so far
    pub fn attempts(&self) -> u32 {
        self.retry_attempts
    }

    /// Consumes one retry from the budget
    ///
    /// Returns the delay to wait before retrying, or `None` if the budget is
    /// exhausted, in which case the budget is left untouched.
    pub fn consume(&mut self, config: &ErrorBackoffConfig) -> Option<Duration> {
        match self.times_to_retry {
            Some(0) => return None,
            Some(ref mut remaining) => *remaining -= 1,
            None => {}
        }

        self.retry_attempts = self.retry_attempts.saturating_add(1);
        Some(config.delay_for_attempt(self.retry_attempts))
    }
}

impl From<Option<u32>> for RetryBudget {
    fn from(times_to_retry: Option<u32>) -> Self {
        Self {
            times_to_retry,
            retry_attempts: 0,
        }
    }
}
