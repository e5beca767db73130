//! 中间件模块：限流、熔断、重试、超时、缓存、日志与遥测。
//!
//! # Middlewares
//!
//! Each type here implements [`Middleware`](crate::pipeline::Middleware) and
//! can be registered on a [`PipelineBuilder`](crate::pipeline::PipelineBuilder)
//! or a [`Client`](crate::client::Client). A middleware that refuses a call
//! (limiter, breaker, timeout) synthesizes its own error and never invokes
//! the wrapped handler; everything else passes handler errors through as is.
//!
//! | Middleware | Refuses with |
//! |------------|--------------|
//! | [`RateLimitMiddleware`] | `Error::RateLimited` |
//! | [`CircuitBreakerMiddleware`] | `Error::Internal` ("circuit breaker: …") |
//! | [`RetryMiddleware`] | last handler error, or the cancellation cause |
//! | [`TimeoutMiddleware`] | `Error::Internal` wrapping `DeadlineExceeded` |
//! | [`CacheMiddleware`] | never refuses |
//! | [`LoggingMiddleware`] / [`TelemetryMiddleware`] | never refuse |
//!
//! A typical order, outermost first:
//!
//! ```rust
//! use llmx::middleware::{RetryMiddleware, TimeoutMiddleware};
//! use llmx::pipeline::{handler_fn, PipelineBuilder};
//! use llmx::resilience::RetryConfig;
//! use llmx::types::ChatResponse;
//! use std::time::Duration;
//!
//! let pipeline = PipelineBuilder::new()
//!     .add_middleware(RetryMiddleware::new(RetryConfig::new(3)))
//!     .add_middleware(TimeoutMiddleware::fixed(Duration::from_secs(30)))
//!     .build(handler_fn(|_ctx, _req| async { Ok(ChatResponse::new("ok")) }));
//! assert_eq!(pipeline.names(), ["retry", "timeout"]);
//! ```

pub mod cache;
pub mod circuit_breaker;
pub mod logging;
pub mod rate_limit;
pub mod retry;
pub mod telemetry;
pub mod timeout;

pub use cache::CacheMiddleware;
pub use circuit_breaker::CircuitBreakerMiddleware;
pub use logging::LoggingMiddleware;
pub use rate_limit::{RateLimitMiddleware, REJECT_RETRY_AFTER};
pub use retry::RetryMiddleware;
pub use telemetry::TelemetryMiddleware;
pub use timeout::{AdaptiveTimeout, TimeoutMiddleware};
