//! Exponential backoff for retriable phase failures.

use std::time::Duration;

/// Retry attempts allowed before a phase fails with `RetriesExhausted`.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Backoff schedule: attempt `n` (from 0) waits `2^n` time units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub time_unit: Duration,
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            time_unit: Duration::from_secs(1),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl RetryPolicy {
    pub fn new(time_unit: Duration, max_retries: u32) -> Self {
        Self {
            time_unit,
            max_retries,
        }
    }

    /// Delay before retry `attempt`, or `None` once the budget is spent.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_retries {
            return None;
        }
        Some(self.time_unit.saturating_mul(2u32.saturating_pow(attempt)))
    }

    /// Every delay the policy allows, in order.
    pub fn schedule(&self) -> Vec<Duration> {
        (0..self.max_retries).filter_map(|a| self.delay_for(a)).collect()
    }
}
