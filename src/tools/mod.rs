//! 工具模块：注册可执行工具，并在对话中自动完成工具调用循环。
//!
//! # Tools
//!
//! A [`Tool`] pairs a [`ToolDefinition`] (what the model is told) with an
//! async `execute` (what runs when the model calls it). Tools live in a
//! [`ToolRegistry`]; a [`ToolExecutor`] drives the call loop through a
//! [`Client`](crate::client::Client), so every round trip passes the full
//! middleware chain.
//!
//! ```rust
//! use llmx::tools::{tool_fn, ToolOutput, ToolRegistry};
//! use llmx::types::ToolDefinition;
//! use std::sync::Arc;
//!
//! let registry = ToolRegistry::new();
//! registry
//!     .register(tool_fn(
//!         ToolDefinition::new("echo").with_description("Repeat the input"),
//!         |_ctx, args| async move { Ok(ToolOutput::ok(args.to_string())) },
//!     ))
//!     .unwrap();
//! assert!(registry.has("echo"));
//! assert_eq!(registry.definitions()[0].name, "echo");
//! ```

mod executor;
mod registry;

pub use executor::{ToolExecutor, DEFAULT_MAX_DEPTH};
pub use registry::{global_registry, ToolRegistry};

use crate::context::CallContext;
use crate::types::{Message, ToolDefinition};
use crate::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// Result of one tool invocation, fed back to the model as a tool message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub output: String,
    /// The tool ran but reports failure; the model sees the output as an error.
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: false,
        }
    }

    pub fn error(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: true,
        }
    }

    pub fn into_message(self, tool_call_id: impl Into<String>) -> Message {
        Message::tool_output(tool_call_id, self.output, self.is_error)
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> &ToolDefinition;

    /// `arguments` is the model's argument object, or a JSON string when the
    /// model produced text that does not parse.
    async fn execute(&self, ctx: &CallContext, arguments: &Value) -> Result<ToolOutput>;

    fn name(&self) -> &str {
        &self.definition().name
    }
}

/// Tool backed by a closure.
pub struct FnTool<F> {
    definition: ToolDefinition,
    f: F,
}

#[async_trait]
impl<F, Fut> Tool for FnTool<F>
where
    F: Fn(CallContext, Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ToolOutput>> + Send + 'static,
{
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(&self, ctx: &CallContext, arguments: &Value) -> Result<ToolOutput> {
        (self.f)(ctx.clone(), arguments.clone()).await
    }
}

pub fn tool_fn<F, Fut>(definition: ToolDefinition, f: F) -> Arc<dyn Tool>
where
    F: Fn(CallContext, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ToolOutput>> + Send + 'static,
{
    Arc::new(FnTool { definition, f })
}
