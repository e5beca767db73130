//! Latency bounds: fixed, per model, or sized to the request.

use crate::context::CallContext;
use crate::pipeline::{BoxHandler, Handler, Middleware};
use crate::types::{ChatRequest, ChatResponse};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Timeout derived from request size:
/// `base + messages * per_message + tools * per_tool`, capped at `max`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AdaptiveTimeout {
    #[serde(rename = "base_ms", with = "crate::config::millis")]
    pub base: Duration,
    #[serde(rename = "per_message_ms", with = "crate::config::millis")]
    pub per_message: Duration,
    #[serde(rename = "per_tool_ms", with = "crate::config::millis")]
    pub per_tool: Duration,
    #[serde(rename = "max_ms", with = "crate::config::millis")]
    pub max: Duration,
}

impl Default for AdaptiveTimeout {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(30),
            per_message: Duration::from_secs(2),
            per_tool: Duration::from_secs(5),
            max: Duration::from_secs(300),
        }
    }
}

impl AdaptiveTimeout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base(mut self, d: Duration) -> Self {
        self.base = d;
        self
    }

    pub fn with_per_message(mut self, d: Duration) -> Self {
        self.per_message = d;
        self
    }

    pub fn with_per_tool(mut self, d: Duration) -> Self {
        self.per_tool = d;
        self
    }

    pub fn with_max(mut self, d: Duration) -> Self {
        self.max = d;
        self
    }

    pub fn calculate(&self, request: &ChatRequest) -> Duration {
        let messages = u32::try_from(request.messages.len()).unwrap_or(u32::MAX);
        let tools = u32::try_from(request.tools.len()).unwrap_or(u32::MAX);
        self.base
            .saturating_add(self.per_message.saturating_mul(messages))
            .saturating_add(self.per_tool.saturating_mul(tools))
            .min(self.max)
    }

    pub fn middleware(self) -> TimeoutMiddleware {
        TimeoutMiddleware::adaptive(self)
    }
}

#[derive(Debug, Clone)]
enum Mode {
    Fixed(Duration),
    PerModel {
        timeouts: HashMap<String, Duration>,
        default: Duration,
    },
    Adaptive(AdaptiveTimeout),
}

/// Races the wrapped call against a deadline derived from the caller's
/// context, so a tighter inbound deadline still wins. When the deadline fires
/// first the inner call is cancelled and dropped, and the caller gets an
/// internal error wrapping `DeadlineExceeded`.
#[derive(Debug, Clone)]
pub struct TimeoutMiddleware {
    mode: Arc<Mode>,
}

impl TimeoutMiddleware {
    pub fn fixed(timeout: Duration) -> Self {
        Self {
            mode: Arc::new(Mode::Fixed(timeout)),
        }
    }

    /// Models missing from `timeouts` get `default`.
    pub fn per_model(timeouts: HashMap<String, Duration>, default: Duration) -> Self {
        Self {
            mode: Arc::new(Mode::PerModel { timeouts, default }),
        }
    }

    pub fn adaptive(config: AdaptiveTimeout) -> Self {
        Self {
            mode: Arc::new(Mode::Adaptive(config)),
        }
    }

    /// Timeout that would apply to `request`.
    pub fn timeout_for(&self, request: &ChatRequest) -> Duration {
        match self.mode.as_ref() {
            Mode::Fixed(d) => *d,
            Mode::PerModel { timeouts, default } => {
                timeouts.get(&request.model).copied().unwrap_or(*default)
            }
            Mode::Adaptive(cfg) => cfg.calculate(request),
        }
    }

    fn timeout_message(&self, request: &ChatRequest, timeout: Duration) -> String {
        match self.mode.as_ref() {
            Mode::Fixed(_) => format!("request timeout after {:?}", timeout),
            Mode::PerModel { .. } => {
                format!("request timeout for model {} after {:?}", request.model, timeout)
            }
            Mode::Adaptive(_) => format!(
                "adaptive timeout after {:?} (messages: {}, tools: {})",
                timeout,
                request.messages.len(),
                request.tools.len()
            ),
        }
    }
}

impl Middleware for TimeoutMiddleware {
    fn wrap(&self, next: BoxHandler) -> BoxHandler {
        Arc::new(TimeoutHandler {
            middleware: self.clone(),
            next,
        })
    }

    fn name(&self) -> &str {
        match self.mode.as_ref() {
            Mode::Fixed(_) => "timeout",
            Mode::PerModel { .. } => "timeout_per_model",
            Mode::Adaptive(_) => "adaptive_timeout",
        }
    }
}

struct TimeoutHandler {
    middleware: TimeoutMiddleware,
    next: BoxHandler,
}

#[async_trait]
impl Handler for TimeoutHandler {
    async fn call(&self, ctx: &CallContext, request: &ChatRequest) -> Result<ChatResponse> {
        let timeout = self.middleware.timeout_for(request);
        let bounded = ctx.with_timeout(timeout);

        let cause = tokio::select! {
            biased;
            cause = bounded.done() => cause,
            res = self.next.call(&bounded, request) => return res,
        };
        bounded.cancel();

        match cause {
            Error::DeadlineExceeded if ctx.err().is_some() => {
                tracing::warn!(model = %request.model, "caller deadline exceeded");
                Err(Error::internal_with_source("caller deadline exceeded", cause))
            }
            Error::DeadlineExceeded => {
                let message = self.middleware.timeout_message(request, timeout);
                tracing::warn!(model = %request.model, timeout_ms = timeout.as_millis() as u64, "{}", message);
                Err(Error::internal_with_source(message, cause))
            }
            other => Err(other),
        }
    }
}
