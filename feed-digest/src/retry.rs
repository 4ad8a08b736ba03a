use backoff::backoff::Backoff;
use std::time::Duration;

/// Bounded retry with linearly growing delays: the pause after the n-th
/// failed attempt is `n * base_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn backoff(&self) -> LinearBackoff {
        LinearBackoff {
            policy: *self,
            failures: 0,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}

/// Yields one delay per failed attempt until the attempt budget is spent,
/// then `None`.
#[derive(Debug, Clone)]
pub struct LinearBackoff {
    policy: RetryPolicy,
    failures: u32,
}

impl LinearBackoff {
    pub fn failures(&self) -> u32 {
        self.failures
    }
}

impl Backoff for LinearBackoff {
    fn reset(&mut self) {
        self.failures = 0;
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        self.failures += 1;
        if self.failures >= self.policy.max_attempts {
            return None;
        }
        Some(self.policy.base_delay * self.failures)
    }
}
