//! The seam between the client and a concrete vendor adapter.

use crate::context::CallContext;
use crate::pipeline::Handler;
use crate::stream::EventStream;
use crate::types::{ChatRequest, ChatResponse};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// A vendor adapter. Implementations translate [`ChatRequest`] into their
/// wire format and back; they must honour `ctx` cancellation.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    async fn chat(&self, ctx: &CallContext, request: &ChatRequest) -> Result<ChatResponse>;

    /// Open a streaming call. The returned stream owns its producer task.
    async fn chat_stream(&self, ctx: &CallContext, request: &ChatRequest) -> Result<EventStream>;
}

/// Innermost handler of every client pipeline.
pub(crate) struct ProviderHandler {
    provider: Arc<dyn Provider>,
}

impl ProviderHandler {
    pub(crate) fn new(provider: Arc<dyn Provider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Handler for ProviderHandler {
    async fn call(&self, ctx: &CallContext, request: &ChatRequest) -> Result<ChatResponse> {
        if let Some(cause) = ctx.err() {
            return Err(cause);
        }
        self.provider.chat(ctx, request).await
    }
}
