use crate::context::CallContext;
use crate::pipeline::{BoxHandler, Handler, Middleware};
use crate::telemetry::{provider_for_model, Telemetry};
use crate::types::{ChatRequest, ChatResponse};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

/// Opens a `llmx.chat` span per call and records request, duration, error
/// and token metrics.
#[derive(Clone)]
pub struct TelemetryMiddleware {
    telemetry: Telemetry,
    provider: Option<String>,
}

impl TelemetryMiddleware {
    pub fn new(telemetry: Telemetry) -> Self {
        Self {
            telemetry,
            provider: None,
        }
    }

    /// Report every call under `provider` instead of guessing from the model.
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }
}

impl Middleware for TelemetryMiddleware {
    fn wrap(&self, next: BoxHandler) -> BoxHandler {
        Arc::new(TelemetryHandler {
            mw: self.clone(),
            next,
        })
    }

    fn name(&self) -> &str {
        "telemetry"
    }
}

struct TelemetryHandler {
    mw: TelemetryMiddleware,
    next: BoxHandler,
}

#[async_trait]
impl Handler for TelemetryHandler {
    async fn call(&self, ctx: &CallContext, request: &ChatRequest) -> Result<ChatResponse> {
        let t = &self.mw.telemetry;
        let provider = self
            .mw
            .provider
            .as_deref()
            .unwrap_or_else(|| provider_for_model(&request.model));
        let model = request.model.as_str();

        let span = t.start_span("chat", model, request.messages.len(), request.tools.len());
        let request_id = uuid::Uuid::new_v4().to_string();
        span.record("request_id", request_id.as_str());
        span.record("provider", provider);

        let started = Instant::now();
        let res = self.next.call(ctx, request).instrument(span.clone()).await;
        let millis = started.elapsed().as_millis() as u64;

        match &res {
            Err(e) => {
                t.record_request(provider, model, false);
                t.record_error(provider, model, e.code());
                t.record_duration(provider, model, millis);
                span.in_scope(|| tracing::debug!(error = %e, "chat call failed"));
            }
            Ok(resp) => {
                t.record_request(provider, model, true);
                t.record_duration(provider, model, millis);
                let usage = resp.usage;
                for (kind, count) in [
                    ("prompt", usage.prompt_tokens),
                    ("completion", usage.completion_tokens),
                    ("total", usage.total_tokens),
                ] {
                    if count > 0 {
                        t.record_tokens(provider, model, kind, count as u64);
                    }
                }
            }
        }
        res
    }
}
