//! Backoff arithmetic for repeated attempts of one logical call.

use std::time::Duration;

pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(32);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(10_000);

/// Exponential backoff bounds shared by every call of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
        }
    }

    pub fn initial(&self) -> Duration {
        self.initial
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Fresh state for the first attempt of a call.
    pub fn start(&self) -> RetryState {
        self.starting_at(self.initial)
    }

    /// Fresh state whose first retry waits `delay` (still capped).
    pub fn starting_at(&self, delay: Duration) -> RetryState {
        RetryState {
            delay: delay.min(self.max),
            max: self.max,
            attempt: 0,
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_DELAY, DEFAULT_MAX_DELAY)
    }
}

/// The only mutable state threaded through the attempts of one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    delay: Duration,
    max: Duration,
    attempt: u32,
}

impl RetryState {
    /// How long to wait before the next attempt.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// 0 for the first attempt.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Whether the current attempt repeats an earlier one.
    pub fn is_retry(&self) -> bool {
        self.attempt > 0
    }

    /// State for the following attempt: delay doubled, capped.
    pub fn next(self) -> Self {
        Self {
            delay: self.delay.saturating_mul(2).min(self.max),
            max: self.max,
            attempt: self.attempt.saturating_add(1),
        }
    }
}
