//! Admission control in front of the wrapped handler.

use crate::context::CallContext;
use crate::pipeline::{BoxHandler, Handler, Middleware};
use crate::resilience::{PerKeyRateLimiter, RateLimiter};
use crate::types::{ChatRequest, ChatResponse};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Suggested delay attached to non-blocking rejections.
pub const REJECT_RETRY_AFTER: Duration = Duration::from_secs(1);

#[derive(Clone)]
enum Source {
    Single(Arc<dyn RateLimiter>),
    PerModel(Arc<PerKeyRateLimiter>),
}

/// Blocking mode waits for a permit; non-blocking mode fails fast with
/// `Error::RateLimited` carrying [`REJECT_RETRY_AFTER`].
#[derive(Clone)]
pub struct RateLimitMiddleware {
    source: Source,
    wait: bool,
}

impl RateLimitMiddleware {
    pub fn new(limiter: Arc<dyn RateLimiter>, wait: bool) -> Self {
        Self {
            source: Source::Single(limiter),
            wait,
        }
    }

    /// Limiter chosen by the request's model name.
    pub fn per_model(limiters: Arc<PerKeyRateLimiter>, wait: bool) -> Self {
        Self {
            source: Source::PerModel(limiters),
            wait,
        }
    }
}

impl Middleware for RateLimitMiddleware {
    fn wrap(&self, next: BoxHandler) -> BoxHandler {
        Arc::new(RateLimitHandler {
            source: self.source.clone(),
            wait: self.wait,
            next,
        })
    }

    fn name(&self) -> &str {
        match self.source {
            Source::Single(_) => "rate_limit",
            Source::PerModel(_) => "rate_limit_per_model",
        }
    }
}

struct RateLimitHandler {
    source: Source,
    wait: bool,
    next: BoxHandler,
}

#[async_trait]
impl Handler for RateLimitHandler {
    async fn call(&self, ctx: &CallContext, request: &ChatRequest) -> Result<ChatResponse> {
        let (limiter, model) = match &self.source {
            Source::Single(l) => (l.clone(), None),
            Source::PerModel(m) => (m.limiter(&request.model), Some(request.model.as_str())),
        };

        if self.wait {
            if let Err(cause) = limiter.wait(ctx).await {
                tracing::debug!(model = ?model, error = %cause, "rate limit wait gave up");
                return Err(Error::rate_limited_with_source("rate limit wait failed", cause));
            }
        } else if !limiter.allow() {
            tracing::debug!(model = ?model, "rate limit rejected request");
            let message = match model {
                Some(m) => format!("rate limit exceeded for model: {}", m),
                None => "rate limit exceeded".to_string(),
            };
            return Err(Error::rate_limited(message, Some(REJECT_RETRY_AFTER)));
        }

        self.next.call(ctx, request).await
    }
}
