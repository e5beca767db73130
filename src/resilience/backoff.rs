//! Backoff strategies: pure maps from attempt index to wait duration.

use std::time::Duration;

pub trait BackoffStrategy: Send + Sync {
    /// Wait before retry number `attempt` (0-based).
    fn next(&self, attempt: u32) -> Duration;
}

/// `base * 2^attempt`, capped at `max`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    pub base: Duration,
    pub max: Duration,
}

impl ExponentialBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30))
    }
}

impl BackoffStrategy for ExponentialBackoff {
    fn next(&self, attempt: u32) -> Duration {
        let base = self.base.as_millis() as u64;
        let cap = self.max.as_millis() as u64;

        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let delay = base.saturating_mul(factor).min(cap);
        Duration::from_millis(delay)
    }
}

/// Same wait every time.
#[derive(Debug, Clone)]
pub struct ConstantBackoff(pub Duration);

impl BackoffStrategy for ConstantBackoff {
    fn next(&self, _attempt: u32) -> Duration {
        self.0
    }
}
