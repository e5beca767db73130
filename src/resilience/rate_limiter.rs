use crate::context::CallContext;
use crate::resilience::keyed::KeyedRegistry;
use crate::resilience::sliding_window::{SlidingWindowConfig, SlidingWindowLimiter};
use crate::Result;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Admission control shared by both limiter algorithms.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Non-blocking check; consumes one permit on success.
    fn allow(&self) -> bool;

    /// Block until a permit is available or the context finishes.
    async fn wait(&self, ctx: &CallContext) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct RateLimiterSnapshot {
    pub rps: f64,
    pub burst: f64,
    pub tokens: f64,
    /// Estimated wait time until a token is available (ms), if currently empty.
    pub estimated_wait_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct TokenBucketConfig {
    /// Tokens per second.
    pub rps: f64,
    /// Maximum burst size (tokens).
    pub burst: f64,
}

impl TokenBucketConfig {
    pub fn new() -> Self {
        Self {
            rps: 10.0,
            burst: 10.0,
        }
    }

    pub fn from_rps(rps: f64) -> Option<Self> {
        if !rps.is_finite() || rps < 0.0 {
            return None;
        }
        Some(Self {
            rps,
            burst: rps.max(1.0), // default burst: 1 second worth, at least 1
        })
    }

    pub fn with_burst(mut self, burst: u32) -> Self {
        self.burst = burst as f64;
        self
    }

    pub fn with_rps(mut self, rps: f64) -> Self {
        self.rps = rps;
        self
    }
}

impl Default for TokenBucketConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
struct State {
    tokens: f64,
    last: Instant,
}

/// Token bucket with continuous refill.
///
/// The bucket starts full. A zero refill rate disables limiting.
pub struct TokenBucketLimiter {
    cfg: TokenBucketConfig,
    state: Mutex<State>,
}

impl TokenBucketLimiter {
    pub fn new(cfg: TokenBucketConfig) -> Self {
        let state = Mutex::new(State {
            tokens: cfg.burst,
            last: Instant::now(),
        });
        Self { cfg, state }
    }

    /// `rps` requests per second with a bucket of `burst`.
    pub fn with_rate(rps: f64, burst: u32) -> Self {
        Self::new(TokenBucketConfig::new().with_rps(rps).with_burst(burst))
    }

    pub fn config(&self) -> &TokenBucketConfig {
        &self.cfg
    }

    fn refill_locked(cfg: &TokenBucketConfig, st: &mut State) {
        let now = Instant::now();
        let elapsed = now.duration_since(st.last).as_secs_f64();
        if elapsed > 0.0 {
            st.tokens = (st.tokens + elapsed * cfg.rps).min(cfg.burst);
            st.last = now;
        }
    }

    /// Take a token, or report how long until one is available.
    fn try_take(&self) -> std::result::Result<(), Duration> {
        let cfg = &self.cfg;
        if cfg.rps <= 0.0 {
            return Ok(());
        }
        let mut st = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Self::refill_locked(cfg, &mut st);
        if st.tokens >= 1.0 {
            st.tokens -= 1.0;
            return Ok(());
        }
        Err(refill_wait(1.0 - st.tokens, cfg.rps))
    }

    pub fn snapshot(&self) -> RateLimiterSnapshot {
        let cfg = &self.cfg;
        let mut st = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let mut wait_ms = None;
        if cfg.rps > 0.0 {
            Self::refill_locked(cfg, &mut st);
            if st.tokens < 1.0 {
                let wait = refill_wait(1.0 - st.tokens, cfg.rps);
                wait_ms = Some(u64::try_from(wait.as_millis()).unwrap_or(u64::MAX));
            }
        }
        RateLimiterSnapshot {
            rps: cfg.rps,
            burst: cfg.burst,
            tokens: st.tokens,
            estimated_wait_ms: wait_ms,
        }
    }
}

/// Time to refill `missing` tokens; saturates when the rate is too small to
/// express the wait as a `Duration`.
fn refill_wait(missing: f64, rps: f64) -> Duration {
    Duration::try_from_secs_f64(missing / rps).unwrap_or(Duration::MAX)
}

#[async_trait]
impl RateLimiter for TokenBucketLimiter {
    fn allow(&self) -> bool {
        self.try_take().is_ok()
    }

    async fn wait(&self, ctx: &CallContext) -> Result<()> {
        loop {
            if let Some(cause) = ctx.err() {
                return Err(cause);
            }
            match self.try_take() {
                Ok(()) => return Ok(()),
                Err(wait) => {
                    tracing::debug!(wait_ms = wait.as_millis() as u64, "token bucket empty");
                    ctx.sleep(wait.max(Duration::from_millis(1))).await?;
                }
            }
        }
    }
}

/// One limiter per routing key, created on first use.
pub struct PerKeyRateLimiter {
    registry: KeyedRegistry<dyn RateLimiter>,
}

impl PerKeyRateLimiter {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(&str) -> Arc<dyn RateLimiter> + Send + Sync + 'static,
    {
        Self {
            registry: KeyedRegistry::new(factory),
        }
    }

    /// Every key gets its own token bucket with the same configuration.
    pub fn token_bucket(cfg: TokenBucketConfig) -> Self {
        Self::new(move |_key| Arc::new(TokenBucketLimiter::new(cfg.clone())) as Arc<dyn RateLimiter>)
    }

    /// Every key gets its own sliding window with the same configuration.
    pub fn sliding_window(cfg: SlidingWindowConfig) -> Self {
        Self::new(move |_key| {
            Arc::new(SlidingWindowLimiter::new(cfg.clone())) as Arc<dyn RateLimiter>
        })
    }

    pub fn limiter(&self, key: &str) -> Arc<dyn RateLimiter> {
        self.registry.get(key)
    }

    pub fn allow(&self, key: &str) -> bool {
        self.limiter(key).allow()
    }

    pub async fn wait(&self, ctx: &CallContext, key: &str) -> Result<()> {
        self.limiter(key).wait(ctx).await
    }

    pub fn keys(&self) -> Vec<String> {
        self.registry.keys()
    }
}
