//! Exponential backoff with jitter.
//!
//! Used for two loops: receipt polling (bounded by a deadline) and the
//! rebuild-transaction retry policy (bounded by an attempt count).

use rand::Rng;
use std::time::{Duration, Instant};

/// Calculate exponential backoff delay with jitter.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exponential_base);
    let capped_delay = delay_ms.min(max_ms);

    // Apply jitter (0 to 10% of the delay)
    let jitter_range = capped_delay / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}

/// Delay sequence for a poll loop that must give up at a deadline.
#[derive(Debug)]
pub struct PollSchedule {
    attempt: u32,
    base_ms: u64,
    max_ms: u64,
    deadline: Instant,
}

impl PollSchedule {
    pub fn new(base: Duration, max: Duration, timeout: Duration) -> Self {
        Self {
            attempt: 0,
            base_ms: base.as_millis() as u64,
            max_ms: max.as_millis() as u64,
            deadline: Instant::now() + timeout,
        }
    }

    /// Next sleep, clamped so the loop wakes no later than the deadline.
    /// `None` once the deadline has passed.
    pub fn next_delay(&mut self) -> Option<Duration> {
        let remaining = self.deadline.checked_duration_since(Instant::now())?;
        if remaining.is_zero() {
            return None;
        }
        self.attempt = self.attempt.saturating_add(1);
        let delay = calculate_backoff(self.attempt, self.base_ms, self.max_ms);
        Some(delay.min(remaining))
    }

    pub fn attempts(&self) -> u32 {
        self.attempt
    }
}
