//! Re-invokes the wrapped handler on retryable failures.

use crate::context::CallContext;
use crate::pipeline::{BoxHandler, Handler, Middleware};
use crate::resilience::{ResiliencePolicy, RetryConfig};
use crate::types::{ChatRequest, ChatResponse};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Clone)]
pub struct RetryMiddleware {
    policy: Arc<dyn ResiliencePolicy>,
}

impl RetryMiddleware {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            policy: Arc::new(config),
        }
    }

    pub fn with_policy(policy: Arc<dyn ResiliencePolicy>) -> Self {
        Self { policy }
    }
}

impl Middleware for RetryMiddleware {
    fn wrap(&self, next: BoxHandler) -> BoxHandler {
        Arc::new(RetryHandler {
            policy: self.policy.clone(),
            next,
        })
    }

    fn name(&self) -> &str {
        "retry"
    }
}

struct RetryHandler {
    policy: Arc<dyn ResiliencePolicy>,
    next: BoxHandler,
}

#[async_trait]
impl Handler for RetryHandler {
    async fn call(&self, ctx: &CallContext, request: &ChatRequest) -> Result<ChatResponse> {
        let mut attempt: u32 = 0;
        loop {
            let err = match self.next.call(ctx, request).await {
                Ok(resp) => return Ok(resp),
                Err(e) => e,
            };

            let Some(delay) = self.policy.should_retry(attempt, &err).await else {
                return Err(err);
            };
            tracing::warn!(
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "retrying request"
            );
            // A cancelled wait reports the cancellation, not `err`.
            ctx.sleep(delay).await?;
            attempt += 1;
        }
    }
}
