//! Exponential backoff between delivery retries.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound on the delay between two attempts.
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(60);
/// First delay after a failure.
pub const DEFAULT_BACKOFF_INITIAL: Duration = Duration::from_secs(1);
/// Smallest delay ever used, so a zero policy cannot spin.
pub const MIN_BACKOFF: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: DEFAULT_BACKOFF_INITIAL,
            max: DEFAULT_BACKOFF_MAX,
        }
    }
}

impl BackoffPolicy {
    pub fn with_initial(mut self, initial: Duration) -> Self {
        self.initial = initial;
        self
    }
}

/// Delay for failure `k` (from zero) is `min(max, initial * 2^k)`.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    current: Duration,
}

impl Backoff {
    /// Both bounds are raised to at least [`MIN_BACKOFF`].
    pub fn new(policy: BackoffPolicy) -> Self {
        let max = policy.max.max(MIN_BACKOFF);
        let policy = BackoffPolicy {
            initial: policy.initial.clamp(MIN_BACKOFF, max),
            max,
        };
        Self {
            current: policy.initial,
            policy,
        }
    }

    /// Delay to wait before the next attempt; doubles the following one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.policy.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.policy.initial;
    }
}
