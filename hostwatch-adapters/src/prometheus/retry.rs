//! Retry policy for transient query failures.

use std::time::Duration;

/// Delay strategy between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Sleep the same amount after every failed attempt.
    Fixed(Duration),

    /// Double the delay after every failed attempt, starting at `base` and
    /// never exceeding `max`.
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    /// Delay to wait after the given (1-based) failed attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { base, max } => {
                let factor = 1u32
                    .checked_shl(attempt.saturating_sub(1))
                    .unwrap_or(u32::MAX);
                base.checked_mul(factor).unwrap_or(max).min(max)
            }
        }
    }
}

/// How many times to try a query and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    backoff: Backoff,
}

impl RetryPolicy {
    /// Create a policy. At least one attempt is always made.
    pub fn new(attempts: u32, backoff: Backoff) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff,
        }
    }

    /// Fixed delay between attempts.
    pub fn fixed(attempts: u32, delay: Duration) -> Self {
        Self::new(attempts, Backoff::Fixed(delay))
    }

    /// Exponentially growing delay between attempts.
    pub fn exponential(attempts: u32, base: Duration, max: Duration) -> Self {
        Self::new(attempts, Backoff::Exponential { base, max })
    }

    /// Maximum number of attempts.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// The backoff strategy.
    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Delay after the given failed attempt, or `None` when it was the last.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        (attempt < self.attempts).then(|| self.backoff.delay(attempt))
    }
}

impl Default for RetryPolicy {
    /// Three attempts, 500ms apart.
    fn default() -> Self {
        Self::fixed(3, Duration::from_millis(500))
    }
}
