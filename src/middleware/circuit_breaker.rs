//! Fail-fast isolation around the wrapped handler.

use crate::context::CallContext;
use crate::pipeline::{BoxHandler, Handler, Middleware};
use crate::resilience::{CircuitBreaker, PerModelCircuitBreaker};
use crate::types::{ChatRequest, ChatResponse};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Clone)]
enum Breakers {
    Single(Arc<CircuitBreaker>),
    PerModel(Arc<PerModelCircuitBreaker>),
}

/// Rejected calls fail with an internal error and never reach the handler.
/// Every error from the handler counts as a failure, whatever its kind.
#[derive(Clone)]
pub struct CircuitBreakerMiddleware {
    breakers: Breakers,
}

impl CircuitBreakerMiddleware {
    pub fn new(breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            breakers: Breakers::Single(breaker),
        }
    }

    pub fn per_model(breakers: Arc<PerModelCircuitBreaker>) -> Self {
        Self {
            breakers: Breakers::PerModel(breakers),
        }
    }
}

impl Middleware for CircuitBreakerMiddleware {
    fn wrap(&self, next: BoxHandler) -> BoxHandler {
        Arc::new(CircuitBreakerHandler {
            breakers: self.breakers.clone(),
            next,
        })
    }

    fn name(&self) -> &str {
        match self.breakers {
            Breakers::Single(_) => "circuit_breaker",
            Breakers::PerModel(_) => "circuit_breaker_per_model",
        }
    }
}

struct CircuitBreakerHandler {
    breakers: Breakers,
    next: BoxHandler,
}

#[async_trait]
impl Handler for CircuitBreakerHandler {
    async fn call(&self, ctx: &CallContext, request: &ChatRequest) -> Result<ChatResponse> {
        let breaker = match &self.breakers {
            Breakers::Single(b) => b.clone(),
            Breakers::PerModel(p) => p.breaker(&request.model),
        };

        if let Err(rejection) = breaker.allow() {
            let message = match self.breakers {
                Breakers::Single(_) => format!("circuit breaker: {}", rejection),
                Breakers::PerModel(_) => {
                    format!("circuit breaker for model {}: {}", request.model, rejection)
                }
            };
            return Err(Error::internal(message));
        }

        match self.next.call(ctx, request).await {
            Ok(resp) => {
                breaker.record_success();
                Ok(resp)
            }
            Err(e) => {
                breaker.record_failure();
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::handler_fn;
    use crate::resilience::{CircuitBreakerConfig, CircuitState};
    use crate::types::Message;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_non_retryable_errors_still_trip() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let base = handler_fn(move |_ctx, _req| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<ChatResponse, _>(Error::authentication("bad key"))
            }
        });
        let breaker = Arc::new(CircuitBreaker::new(
            CircuitBreakerConfig::new()
                .with_failure_threshold(2)
                .with_open_timeout(Duration::from_secs(60)),
        ));
        let h = CircuitBreakerMiddleware::new(breaker.clone()).wrap(base);
        let req = ChatRequest::new("gpt-4o").message(Message::user("hi"));

        for _ in 0..2 {
            assert!(matches!(
                h.call(&CallContext::new(), &req).await,
                Err(Error::Authentication { .. })
            ));
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        let err = h.call(&CallContext::new(), &req).await.unwrap_err();
        assert!(err.to_string().starts_with("circuit breaker: circuit open"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_per_model_rejection_names_model() {
        let base = handler_fn(|_ctx, req: ChatRequest| async move {
            if req.model == "flaky" {
                Err(Error::internal("boom"))
            } else {
                Ok(ChatResponse::new("fine"))
            }
        });
        let breakers = Arc::new(PerModelCircuitBreaker::new(
            CircuitBreakerConfig::new().with_failure_threshold(1),
        ));
        let h = CircuitBreakerMiddleware::per_model(breakers).wrap(base);

        let flaky = ChatRequest::new("flaky").message(Message::user("hi"));
        let stable = ChatRequest::new("stable").message(Message::user("hi"));
        assert!(h.call(&CallContext::new(), &flaky).await.is_err());

        let err = h.call(&CallContext::new(), &flaky).await.unwrap_err();
        assert!(err.to_string().contains("circuit breaker for model flaky"));
        assert!(h.call(&CallContext::new(), &stable).await.is_ok());
    }
}
