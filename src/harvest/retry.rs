// src/harvest/retry.rs
use std::ops::RangeInclusive;
use std::time::Duration;

/// Bounded, jittered retry for a single post download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Slept before every attempt, including the first.
    pub pre_attempt_delay: RangeInclusive<Duration>,
    /// Slept after a transient failure, before the next attempt.
    pub backoff_delay: RangeInclusive<Duration>,
    /// Slept before fetching each account's listing.
    pub account_delay: RangeInclusive<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            pre_attempt_delay: secs(2)..=secs(5),
            backoff_delay: secs(10)..=secs(30),
            account_delay: secs(5)..=secs(10),
        }
    }
}

impl RetryPolicy {
    /// Same attempt bound, no waiting. Handy for tests and dry runs.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            pre_attempt_delay: Duration::ZERO..=Duration::ZERO,
            backoff_delay: Duration::ZERO..=Duration::ZERO,
            account_delay: Duration::ZERO..=Duration::ZERO,
        }
    }
}

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}
