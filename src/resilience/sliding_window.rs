//! Exact trailing-window rate limiter.

use crate::context::CallContext;
use crate::resilience::rate_limiter::RateLimiter;
use crate::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);
const INITIAL_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct SlidingWindowConfig {
    /// Admissions allowed in any trailing window.
    pub limit: usize,
    pub window: Duration,
    /// Upper bound on a single sleep inside `wait`.
    pub poll_interval: Duration,
}

impl SlidingWindowConfig {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

impl Default for SlidingWindowConfig {
    fn default() -> Self {
        Self::new(60, Duration::from_secs(60))
    }
}

/// Holds the timestamps of the admissions inside the current window.
pub struct SlidingWindowLimiter {
    cfg: SlidingWindowConfig,
    admitted: Mutex<VecDeque<Instant>>,
}

impl SlidingWindowLimiter {
    pub fn new(cfg: SlidingWindowConfig) -> Self {
        Self {
            admitted: Mutex::new(VecDeque::with_capacity(cfg.limit.min(INITIAL_CAPACITY))),
            cfg,
        }
    }

    pub fn config(&self) -> &SlidingWindowConfig {
        &self.cfg
    }

    fn prune(window: Duration, admitted: &mut VecDeque<Instant>, now: Instant) {
        while let Some(oldest) = admitted.front() {
            if now.duration_since(*oldest) >= window {
                admitted.pop_front();
            } else {
                break;
            }
        }
    }

    /// Admit now, or report when the oldest admission leaves the window.
    fn try_admit(&self) -> std::result::Result<(), Duration> {
        let now = Instant::now();
        let mut admitted = self.admitted.lock().unwrap_or_else(|e| e.into_inner());
        Self::prune(self.cfg.window, &mut admitted, now);
        if admitted.len() < self.cfg.limit {
            admitted.push_back(now);
            return Ok(());
        }
        let until = admitted
            .front()
            .map(|oldest| match oldest.checked_add(self.cfg.window) {
                Some(leaves) => leaves.saturating_duration_since(now),
                None => Duration::MAX,
            })
            .unwrap_or(self.cfg.poll_interval);
        Err(until)
    }

    /// Admissions currently counted against the window.
    pub fn in_window(&self) -> usize {
        let mut admitted = self.admitted.lock().unwrap_or_else(|e| e.into_inner());
        Self::prune(self.cfg.window, &mut admitted, Instant::now());
        admitted.len()
    }
}

#[async_trait]
impl RateLimiter for SlidingWindowLimiter {
    fn allow(&self) -> bool {
        self.try_admit().is_ok()
    }

    async fn wait(&self, ctx: &CallContext) -> Result<()> {
        loop {
            if let Some(cause) = ctx.err() {
                return Err(cause);
            }
            match self.try_admit() {
                Ok(()) => return Ok(()),
                Err(until) => {
                    let nap = until
                        .min(self.cfg.poll_interval)
                        .max(Duration::from_millis(1));
                    ctx.sleep(nap).await?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_limit_is_exact() {
        let limiter = SlidingWindowLimiter::new(SlidingWindowConfig::new(3, Duration::from_secs(10)));
        assert!(limiter.allow());
        assert!(limiter.allow());
        assert!(limiter.allow());
        assert!(!limiter.allow());
        assert_eq!(limiter.in_window(), 3);
    }

    #[test]
    fn test_huge_limits_allocate_lazily() {
        let unbounded = SlidingWindowLimiter::new(SlidingWindowConfig::new(usize::MAX, Duration::from_secs(1)));
        assert!(unbounded.allow());
        assert_eq!(unbounded.in_window(), 1);

        let large = SlidingWindowLimiter::new(SlidingWindowConfig::new(10_000_000, Duration::from_secs(1)));
        assert!(large.admitted.lock().unwrap().capacity() < 10_000);
    }

    #[test]
    fn test_endless_window_does_not_overflow() {
        let limiter = SlidingWindowLimiter::new(SlidingWindowConfig::new(1, Duration::MAX));
        assert!(limiter.allow());
        assert!(!limiter.allow());
        assert_eq!(limiter.try_admit(), Err(Duration::MAX));
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let limiter =
            SlidingWindowLimiter::new(SlidingWindowConfig::new(1, Duration::from_millis(40)));
        assert!(limiter.allow());
        assert!(!limiter.allow());
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(limiter.in_window(), 0);
        assert!(limiter.allow());
    }

    #[tokio::test]
    async fn test_wait_admits_after_window() {
        let limiter =
            SlidingWindowLimiter::new(SlidingWindowConfig::new(1, Duration::from_millis(60)));
        let ctx = CallContext::new();
        limiter.wait(&ctx).await.unwrap();

        let started = Instant::now();
        limiter.wait(&ctx).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_wait_cancelled() {
        let limiter = SlidingWindowLimiter::new(SlidingWindowConfig::new(1, Duration::from_secs(30)));
        assert!(limiter.allow());

        let ctx = CallContext::new();
        let c = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            c.cancel();
        });
        let err = limiter.wait(&ctx).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
