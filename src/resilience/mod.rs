//! 弹性模式模块：提供熔断器、限流器、重试退避等可靠性保障机制。
//!
//! # Resilience Primitives Module
//!
//! Stateful building blocks behind the resilience middlewares. Each one is
//! internally synchronized and safe to share between in-flight calls; none of
//! them hold a lock across an await point.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`circuit_breaker`] | Closed / Open / HalfOpen failure isolation, optionally per model |
//! | [`rate_limiter`] | [`RateLimiter`] contract, token bucket and per-key limiter |
//! | [`sliding_window`] | Exact trailing-window limiter |
//! | [`backoff`] | Attempt → delay strategies |
//! | [`retry`] | Attempt budget and error classification |
//! | [`keyed`] | Double-checked per-key instance registry |
//!
//! ## Circuit Breaker
//!
//! ```rust
//! use llmx::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! let config = CircuitBreakerConfig::new()
//!     .with_failure_threshold(5)
//!     .with_open_timeout(Duration::from_secs(30));
//! let breaker = CircuitBreaker::new(config);
//!
//! if breaker.allow().is_ok() {
//!     // Make API call...
//!     breaker.record_success();
//! }
//! ```
//!
//! ## Rate Limiter
//!
//! ```rust
//! use llmx::resilience::{RateLimiter, TokenBucketLimiter};
//!
//! let limiter = TokenBucketLimiter::with_rate(10.0, 20); // 10 req/s, burst 20
//! if limiter.allow() {
//!     // Proceed with request...
//! }
//! ```

pub mod backoff;
pub mod circuit_breaker;
pub mod keyed;
pub mod rate_limiter;
pub mod retry;
pub mod sliding_window;

pub use backoff::{BackoffStrategy, ConstantBackoff, ExponentialBackoff};
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot, CircuitState,
    PerModelCircuitBreaker, Rejection,
};
pub use keyed::KeyedRegistry;
pub use rate_limiter::{
    PerKeyRateLimiter, RateLimiter, RateLimiterSnapshot, TokenBucketConfig, TokenBucketLimiter,
};
pub use retry::{ResiliencePolicy, RetryConfig};
pub use sliding_window::{SlidingWindowConfig, SlidingWindowLimiter};
