//! Automatic tool-calling loop.

use super::{ToolOutput, ToolRegistry};
use crate::client::Client;
use crate::context::CallContext;
use crate::types::{ChatRequest, ChatResponse, Message, MessageRole, ToolCall};
use crate::{Error, Result};
use std::sync::Arc;

/// Model round trips allowed before [`ToolExecutor::execute_loop`] gives up.
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Runs the tools a model asks for and feeds the results back until the
/// model answers without tool calls.
///
/// Each round trip goes through [`Client::chat`], so the client's middleware
/// chain (retry, breaker, limiter, timeout) applies to every call. A failing
/// or unknown tool does not abort the loop: the failure is sent back to the
/// model as an error-flagged tool result. Cancellation of `ctx` does abort it.
#[derive(Clone)]
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    max_depth: usize,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Look up and run one tool call.
    pub async fn execute_single(&self, ctx: &CallContext, call: &ToolCall) -> Result<ToolOutput> {
        let tool = self.registry.get(&call.name).ok_or_else(|| {
            Error::not_found(format!("tool {}", call.name), Some(call.name.clone()))
        })?;
        tool.execute(ctx, &call.arguments).await
    }

    /// Chat until the model stops calling tools, or fail after `max_depth`
    /// round trips that all ended in tool calls.
    pub async fn execute_loop(
        &self,
        client: &Client,
        ctx: &CallContext,
        request: ChatRequest,
    ) -> Result<ChatResponse> {
        let mut request = request;
        for depth in 0..self.max_depth {
            let response = client.chat(ctx, request.clone()).await?;
            if response.tool_calls.is_empty() {
                return Ok(response);
            }
            tracing::debug!(
                depth,
                calls = response.tool_calls.len(),
                "model requested tool calls"
            );

            let assistant = if response.content.is_empty() {
                Message::with_parts(MessageRole::Assistant, Vec::new())
            } else {
                Message::assistant(response.content.clone())
            };
            request
                .messages
                .push(assistant.with_tool_calls(response.tool_calls.clone()));

            for call in &response.tool_calls {
                let output = match self.execute_single(ctx, call).await {
                    Ok(output) => output,
                    Err(err) => {
                        if let Some(cause) = ctx.err() {
                            return Err(cause);
                        }
                        tracing::warn!(tool = %call.name, error = %err, "tool call failed");
                        ToolOutput::error(format!("Error: {}", err))
                    }
                };
                request.messages.push(output.into_message(call.id.clone()));
            }
        }

        Err(Error::internal(format!(
            "max tool call depth reached: {}",
            self.max_depth
        )))
    }
}
