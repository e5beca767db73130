use crate::context::CallContext;
use crate::logging::{default_logger, LogLevel, SharedLogger};
use crate::pipeline::{BoxHandler, Handler, Middleware};
use crate::types::{ChatRequest, ChatResponse};
use crate::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;

/// Logs the start and outcome of every call.
#[derive(Clone)]
pub struct LoggingMiddleware {
    logger: SharedLogger,
}

impl LoggingMiddleware {
    pub fn new(logger: SharedLogger) -> Self {
        Self { logger }
    }
}

impl Default for LoggingMiddleware {
    fn default() -> Self {
        Self::new(default_logger())
    }
}

impl Middleware for LoggingMiddleware {
    fn wrap(&self, next: BoxHandler) -> BoxHandler {
        Arc::new(LoggingHandler {
            logger: self.logger.clone(),
            next,
        })
    }

    fn name(&self) -> &str {
        "logging"
    }
}

struct LoggingHandler {
    logger: SharedLogger,
    next: BoxHandler,
}

#[async_trait]
impl Handler for LoggingHandler {
    async fn call(&self, ctx: &CallContext, request: &ChatRequest) -> Result<ChatResponse> {
        let started = Instant::now();
        self.logger.log(
            LogLevel::Info,
            "request started",
            &[
                ("model", Value::from(request.model.as_str())),
                ("messages", Value::from(request.messages.len())),
                ("tools", Value::from(request.tools.len())),
                ("has_tools", Value::from(!request.tools.is_empty())),
            ],
        );

        let res = self.next.call(ctx, request).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match &res {
            Err(e) => self.logger.log(
                LogLevel::Error,
                "request failed",
                &[
                    ("model", Value::from(request.model.as_str())),
                    ("duration_ms", Value::from(duration_ms)),
                    ("error", Value::from(e.to_string())),
                    ("error_kind", Value::from(e.code())),
                ],
            ),
            Ok(resp) => self.logger.log(
                LogLevel::Info,
                "request completed",
                &[
                    ("model", Value::from(request.model.as_str())),
                    ("duration_ms", Value::from(duration_ms)),
                    ("total_tokens", Value::from(resp.usage.total_tokens)),
                    ("finish_reason", json!(resp.finish_reason)),
                ],
            ),
        }
        res
    }
}
