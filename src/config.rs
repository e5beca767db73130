//! 配置模块：以声明方式描述整条弹性流水线。
//!
//! # Resilience configuration
//!
//! [`ResilienceConfig`] aggregates one optional section per middleware. It is
//! plain data: deserialize it from whatever source the application owns,
//! call [`ResilienceConfig::validate`], then [`ResilienceConfig::build`] a
//! pipeline around a base handler. Durations are written in milliseconds.
//!
//! Middlewares are always stacked in the same order, outermost first:
//! logging → telemetry → cache → rate limit → circuit breaker → retry →
//! timeout. Retries therefore re-enter the timeout, and a cache hit never
//! consumes a rate-limit token.
//!
//! ```rust
//! use llmx::config::ResilienceConfig;
//! use llmx::pipeline::handler_fn;
//! use llmx::types::ChatResponse;
//!
//! let cfg = ResilienceConfig::from_json(r#"{
//!     "rate_limit": { "limiter": { "algorithm": "token_bucket", "rps": 5.0 }, "wait": true },
//!     "retry": { "max_attempts": 3 },
//!     "timeout": { "mode": "fixed", "timeout_ms": 30000 }
//! }"#).unwrap();
//!
//! let pipeline = cfg
//!     .build(handler_fn(|_ctx, _req| async { Ok(ChatResponse::new("ok")) }))
//!     .unwrap();
//! assert_eq!(pipeline.names(), ["rate_limit", "retry", "timeout"]);
//! ```

use crate::cache::{CacheConfig, CacheManager, MemoryCache};
use crate::error::ErrorContext;
use crate::middleware::{
    AdaptiveTimeout, CacheMiddleware, CircuitBreakerMiddleware, LoggingMiddleware,
    RateLimitMiddleware, RetryMiddleware, TelemetryMiddleware, TimeoutMiddleware,
};
use crate::pipeline::{BoxHandler, Middleware, Pipeline, PipelineBuilder};
use crate::resilience::{
    CircuitBreaker, CircuitBreakerConfig, ExponentialBackoff, PerKeyRateLimiter,
    PerModelCircuitBreaker, RateLimiter, RetryConfig, SlidingWindowConfig, SlidingWindowLimiter,
    TokenBucketConfig, TokenBucketLimiter,
};
use crate::telemetry::Telemetry;
use crate::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Slowest accepted token-bucket rate: one request every 1000 seconds.
pub const MIN_RPS: f64 = 0.001;

/// `Duration` as an integer number of milliseconds.
pub mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

fn invalid(field: &str, message: impl Into<String>) -> Error {
    Error::configuration_with_context(
        message,
        ErrorContext::new()
            .with_field_path(field)
            .with_source("resilience_config"),
    )
}

/// Declarative description of a middleware stack.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Log start and outcome of every call.
    pub logging: bool,
    /// Record metrics through the global telemetry sink.
    pub telemetry: bool,
    pub cache: Option<CacheSection>,
    pub rate_limit: Option<RateLimitSection>,
    pub circuit_breaker: Option<CircuitBreakerSection>,
    pub retry: Option<RetrySection>,
    pub timeout: Option<TimeoutSection>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    #[serde(rename = "ttl_ms", with = "millis")]
    pub ttl: Duration,
    pub max_entries: usize,
    pub max_entry_size: usize,
    pub prefix: Option<String>,
}

impl Default for CacheSection {
    fn default() -> Self {
        let defaults = CacheConfig::default();
        Self {
            ttl: defaults.default_ttl,
            max_entries: 1000,
            max_entry_size: defaults.max_entry_size,
            prefix: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSection {
    pub limiter: LimiterSection,
    /// Block until admitted instead of failing fast.
    #[serde(default)]
    pub wait: bool,
    /// One limiter per model instead of one shared limiter.
    #[serde(default)]
    pub per_model: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum LimiterSection {
    TokenBucket {
        rps: f64,
        /// Defaults to one second worth of tokens.
        #[serde(default)]
        burst: Option<u32>,
    },
    SlidingWindow {
        limit: usize,
        #[serde(rename = "window_ms", with = "millis")]
        window: Duration,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSection {
    pub failure_threshold: u32,
    #[serde(rename = "open_timeout_ms", with = "millis")]
    pub open_timeout: Duration,
    pub reset_successes: u32,
    pub half_open_requests: u32,
    pub per_model: bool,
}

impl Default for CircuitBreakerSection {
    fn default() -> Self {
        let defaults = CircuitBreakerConfig::default();
        Self {
            failure_threshold: defaults.failure_threshold,
            open_timeout: defaults.open_timeout,
            reset_successes: defaults.reset_successes,
            half_open_requests: defaults.half_open_requests,
            per_model: false,
        }
    }
}

impl CircuitBreakerSection {
    pub fn to_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig::new()
            .with_failure_threshold(self.failure_threshold)
            .with_open_timeout(self.open_timeout)
            .with_reset_successes(self.reset_successes)
            .with_half_open_requests(self.half_open_requests)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    /// Total invocations, including the first.
    pub max_attempts: u32,
    #[serde(rename = "base_ms", with = "millis")]
    pub base: Duration,
    #[serde(rename = "max_ms", with = "millis")]
    pub max: Duration,
}

impl Default for RetrySection {
    fn default() -> Self {
        let backoff = ExponentialBackoff::default();
        Self {
            max_attempts: 3,
            base: backoff.base,
            max: backoff.max,
        }
    }
}

impl RetrySection {
    pub fn to_config(&self) -> RetryConfig {
        RetryConfig::new(self.max_attempts).with_backoff(ExponentialBackoff::new(self.base, self.max))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TimeoutSection {
    Fixed {
        #[serde(rename = "timeout_ms", with = "millis")]
        timeout: Duration,
    },
    PerModel {
        /// Model name to timeout in milliseconds.
        #[serde(default)]
        models: HashMap<String, u64>,
        #[serde(rename = "default_ms", with = "millis")]
        default: Duration,
    },
    Adaptive(AdaptiveTimeout),
}

impl TimeoutSection {
    pub fn middleware(&self) -> TimeoutMiddleware {
        match self {
            TimeoutSection::Fixed { timeout } => TimeoutMiddleware::fixed(*timeout),
            TimeoutSection::PerModel { models, default } => TimeoutMiddleware::per_model(
                models
                    .iter()
                    .map(|(m, ms)| (m.clone(), Duration::from_millis(*ms)))
                    .collect(),
                *default,
            ),
            TimeoutSection::Adaptive(cfg) => TimeoutMiddleware::adaptive(cfg.clone()),
        }
    }
}

impl ResilienceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a JSON document. Parse failures become configuration errors.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            Error::configuration_with_context(
                format!("cannot parse resilience config: {}", e),
                ErrorContext::new()
                    .with_details(format!("line {}, column {}", e.line(), e.column()))
                    .with_source("resilience_config"),
            )
        })
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(cache) = &self.cache {
            if cache.max_entries == 0 {
                return Err(invalid("cache.max_entries", "must be at least 1"));
            }
            if cache.ttl.is_zero() {
                return Err(invalid("cache.ttl_ms", "must be positive"));
            }
        }

        if let Some(rl) = &self.rate_limit {
            match &rl.limiter {
                LimiterSection::TokenBucket { rps, burst } => {
                    if !rps.is_finite() || *rps < 0.0 {
                        return Err(invalid(
                            "rate_limit.limiter.rps",
                            format!("must be a finite, non-negative number (got {})", rps),
                        ));
                    }
                    if *rps > 0.0 && *rps < MIN_RPS {
                        return Err(invalid(
                            "rate_limit.limiter.rps",
                            format!("must be 0 (unlimited) or at least {} (got {})", MIN_RPS, rps),
                        ));
                    }
                    if *rps > 0.0 && *burst == Some(0) {
                        return Err(invalid("rate_limit.limiter.burst", "must be at least 1"));
                    }
                }
                LimiterSection::SlidingWindow { limit, window } => {
                    if *limit == 0 {
                        return Err(invalid("rate_limit.limiter.limit", "must be at least 1"));
                    }
                    if window.is_zero() {
                        return Err(invalid("rate_limit.limiter.window_ms", "must be positive"));
                    }
                }
            }
        }

        if let Some(cb) = &self.circuit_breaker {
            if cb.failure_threshold == 0 {
                return Err(invalid("circuit_breaker.failure_threshold", "must be at least 1"));
            }
            if cb.open_timeout.is_zero() {
                return Err(invalid("circuit_breaker.open_timeout_ms", "must be positive"));
            }
            if cb.half_open_requests == 0 {
                return Err(invalid("circuit_breaker.half_open_requests", "must be at least 1"));
            }
            if cb.reset_successes == 0 || cb.reset_successes > cb.half_open_requests {
                return Err(invalid(
                    "circuit_breaker.reset_successes",
                    format!(
                        "must be between 1 and half_open_requests ({})",
                        cb.half_open_requests
                    ),
                ));
            }
        }

        if let Some(retry) = &self.retry {
            if retry.max_attempts == 0 {
                return Err(invalid("retry.max_attempts", "must be at least 1"));
            }
            if retry.base > retry.max {
                return Err(invalid("retry.base_ms", "must not exceed retry.max_ms"));
            }
        }

        match &self.timeout {
            Some(TimeoutSection::Fixed { timeout }) if timeout.is_zero() => {
                return Err(invalid("timeout.timeout_ms", "must be positive"));
            }
            Some(TimeoutSection::PerModel { models, default }) => {
                if default.is_zero() {
                    return Err(invalid("timeout.default_ms", "must be positive"));
                }
                if let Some((model, _)) = models.iter().find(|(_, ms)| **ms == 0) {
                    return Err(invalid(&format!("timeout.models.{}", model), "must be positive"));
                }
            }
            Some(TimeoutSection::Adaptive(cfg)) if cfg.max.is_zero() => {
                return Err(invalid("timeout.max_ms", "must be positive"));
            }
            _ => {}
        }

        Ok(())
    }

    /// Validated middleware list, outermost first.
    pub fn middlewares(&self) -> Result<Vec<Arc<dyn Middleware>>> {
        self.validate()?;
        let mut out: Vec<Arc<dyn Middleware>> = Vec::new();

        if self.logging {
            out.push(Arc::new(LoggingMiddleware::default()));
        }
        if self.telemetry {
            out.push(Arc::new(TelemetryMiddleware::new(Telemetry::global())));
        }
        if let Some(cache) = &self.cache {
            let mut cfg = CacheConfig::new()
                .with_ttl(cache.ttl)
                .with_max_entry_size(cache.max_entry_size);
            if let Some(prefix) = &cache.prefix {
                cfg = cfg.with_key_prefix(prefix.clone());
            }
            let manager = CacheManager::new(cfg, Arc::new(MemoryCache::new(cache.max_entries)));
            out.push(Arc::new(CacheMiddleware::new(Arc::new(manager))));
        }
        if let Some(rl) = &self.rate_limit {
            let mw = if rl.per_model {
                let limiters = match &rl.limiter {
                    LimiterSection::TokenBucket { rps, burst } => {
                        PerKeyRateLimiter::token_bucket(token_bucket_config(*rps, *burst))
                    }
                    LimiterSection::SlidingWindow { limit, window } => {
                        PerKeyRateLimiter::sliding_window(SlidingWindowConfig::new(*limit, *window))
                    }
                };
                RateLimitMiddleware::per_model(Arc::new(limiters), rl.wait)
            } else {
                let limiter: Arc<dyn RateLimiter> = match &rl.limiter {
                    LimiterSection::TokenBucket { rps, burst } => {
                        Arc::new(TokenBucketLimiter::new(token_bucket_config(*rps, *burst)))
                    }
                    LimiterSection::SlidingWindow { limit, window } => Arc::new(
                        SlidingWindowLimiter::new(SlidingWindowConfig::new(*limit, *window)),
                    ),
                };
                RateLimitMiddleware::new(limiter, rl.wait)
            };
            out.push(Arc::new(mw));
        }
        if let Some(cb) = &self.circuit_breaker {
            let mw = if cb.per_model {
                CircuitBreakerMiddleware::per_model(Arc::new(PerModelCircuitBreaker::new(
                    cb.to_config(),
                )))
            } else {
                CircuitBreakerMiddleware::new(Arc::new(CircuitBreaker::new(cb.to_config())))
            };
            out.push(Arc::new(mw));
        }
        if let Some(retry) = &self.retry {
            out.push(Arc::new(RetryMiddleware::new(retry.to_config())));
        }
        if let Some(timeout) = &self.timeout {
            out.push(Arc::new(timeout.middleware()));
        }

        tracing::debug!(count = out.len(), "resilience middlewares configured");
        Ok(out)
    }

    pub fn builder(&self) -> Result<PipelineBuilder> {
        Ok(crate::pipeline::chain(self.middlewares()?))
    }

    pub fn build(&self, base: BoxHandler) -> Result<Pipeline> {
        Ok(self.builder()?.build(base))
    }
}

fn token_bucket_config(rps: f64, burst: Option<u32>) -> TokenBucketConfig {
    let cfg = TokenBucketConfig::new().with_rps(rps);
    match burst {
        Some(b) => cfg.with_burst(b),
        None => cfg.with_burst(rps.max(1.0).ceil() as u32),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CallContext;
    use crate::pipeline::{handler_fn, Handler};
    use crate::types::{ChatRequest, ChatResponse, Message};

    fn ok_base() -> BoxHandler {
        handler_fn(|_ctx, _req| async { Ok(ChatResponse::new("ok")) })
    }

    #[test]
    fn test_full_document_builds_in_fixed_order() {
        let cfg = ResilienceConfig::from_json(
            r#"{
                "timeout": { "mode": "adaptive", "base_ms": 10000, "per_tool_ms": 3000 },
                "retry": { "max_attempts": 4, "base_ms": 100, "max_ms": 2000 },
                "circuit_breaker": { "failure_threshold": 3, "per_model": true },
                "rate_limit": {
                    "limiter": { "algorithm": "sliding_window", "limit": 60, "window_ms": 60000 },
                    "per_model": true
                },
                "cache": { "ttl_ms": 5000, "prefix": "llm" },
                "telemetry": true,
                "logging": true
            }"#,
        )
        .unwrap();

        let pipeline = cfg.build(ok_base()).unwrap();
        assert_eq!(
            pipeline.names(),
            [
                "logging",
                "telemetry",
                "cache",
                "rate_limit_per_model",
                "circuit_breaker_per_model",
                "retry",
                "adaptive_timeout",
            ]
        );

        let Some(TimeoutSection::Adaptive(adaptive)) = &cfg.timeout else {
            panic!("expected adaptive timeout");
        };
        assert_eq!(adaptive.base, Duration::from_secs(10));
        assert_eq!(adaptive.per_message, Duration::from_secs(2));
        assert_eq!(adaptive.per_tool, Duration::from_secs(3));
    }

    #[test]
    fn test_empty_document_is_valid() {
        let cfg = ResilienceConfig::from_json("{}").unwrap();
        assert!(cfg.validate().is_ok());
        assert!(cfg.middlewares().unwrap().is_empty());
    }

    #[test]
    fn test_section_defaults() {
        let cfg = ResilienceConfig::from_json(r#"{ "circuit_breaker": {}, "retry": {} }"#).unwrap();
        let cb = cfg.circuit_breaker.unwrap();
        assert_eq!(cb.failure_threshold, 5);
        assert_eq!(cb.reset_successes, 2);
        assert_eq!(cb.half_open_requests, 3);
        assert_eq!(cb.open_timeout, Duration::from_secs(30));
        let retry = cfg.retry.unwrap();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.base, Duration::from_secs(1));
        assert_eq!(retry.max, Duration::from_secs(30));
    }

    #[test]
    fn test_reset_successes_above_probe_budget_rejected() {
        let cfg = ResilienceConfig::from_json(
            r#"{ "circuit_breaker": { "reset_successes": 4, "half_open_requests": 3 } }"#,
        )
        .unwrap();
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
        assert_eq!(
            err.context().and_then(|c| c.field_path.as_deref()),
            Some("circuit_breaker.reset_successes")
        );
    }

    #[test]
    fn test_invalid_values_report_field_path() {
        let cases = [
            (r#"{ "retry": { "max_attempts": 0 } }"#, "retry.max_attempts"),
            (
                r#"{ "rate_limit": { "limiter": { "algorithm": "token_bucket", "rps": -1.0 } } }"#,
                "rate_limit.limiter.rps",
            ),
            (
                r#"{ "timeout": { "mode": "per_model", "default_ms": 1000, "models": { "gpt-4o": 0 } } }"#,
                "timeout.models.gpt-4o",
            ),
            (r#"{ "cache": { "max_entries": 0 } }"#, "cache.max_entries"),
            (
                r#"{ "rate_limit": { "limiter": { "algorithm": "token_bucket", "rps": 1e-300, "burst": 1 } } }"#,
                "rate_limit.limiter.rps",
            ),
        ];
        for (json, field) in cases {
            let err = ResilienceConfig::from_json(json).unwrap().validate().unwrap_err();
            assert_eq!(
                err.context().and_then(|c| c.field_path.as_deref()),
                Some(field),
                "{}",
                json
            );
        }
    }

    #[test]
    fn test_malformed_json_is_configuration_error() {
        let err = ResilienceConfig::from_json(r#"{ "retry": "#).unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_built_pipeline_rejects_over_limit() {
        let cfg = ResilienceConfig::from_json(
            r#"{ "rate_limit": { "limiter": { "algorithm": "token_bucket", "rps": 1.0, "burst": 1 } } }"#,
        )
        .unwrap();
        let pipeline = cfg.build(ok_base()).unwrap();
        let req = ChatRequest::new("m").message(Message::user("x"));

        assert!(pipeline.call(&CallContext::new(), &req).await.is_ok());
        let err = pipeline.call(&CallContext::new(), &req).await.unwrap_err();
        assert!(matches!(err, Error::RateLimited { .. }));
    }
}
