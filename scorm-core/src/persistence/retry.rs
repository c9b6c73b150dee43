//! Retry policy for backend writes

use std::time::Duration;

/// Default backoff delays: immediate, 250ms, 1s
const DEFAULT_BACKOFF: [Duration; 3] = [
    Duration::from_millis(0),
    Duration::from_millis(250),
    Duration::from_millis(1000),
];

/// Bounded retry with a backoff table
///
/// The table is indexed by attempt; attempts past its end reuse the last
/// delay.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Vec<Duration>,
    attempts: u32,
}

impl RetryPolicy {
    /// Create a policy allowing `max_attempts` tries with the given delays
    pub fn new(max_attempts: u32, backoff: Vec<Duration>) -> Self {
        Self {
            max_attempts,
            backoff,
            attempts: 0,
        }
    }

    /// Default policy: 3 attempts, 0ms / 250ms / 1000ms
    pub fn default_policy() -> Self {
        Self::new(3, DEFAULT_BACKOFF.to_vec())
    }

    /// Whether another attempt is allowed, and how long to wait before it
    ///
    /// Returns `Some(delay)` while attempts remain, `None` once exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.max_attempts {
            return None;
        }
        let delay = self
            .backoff
            .get(self.attempts as usize)
            .or_else(|| self.backoff.last())
            .copied()
            .unwrap_or(Duration::ZERO);
        self.attempts += 1;
        Some(delay)
    }

    /// Reset after a successful write
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Attempts made since the last reset
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::default_policy()
    }
}
