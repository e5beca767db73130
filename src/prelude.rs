//! Minimal prelude for application code.
//!
//! Goal: reduce import noise without hiding important concepts.

pub use crate::client::{Client, ClientBuilder, ClientConfig, Provider};
pub use crate::config::ResilienceConfig;
pub use crate::context::CallContext;
pub use crate::pipeline::{handler_fn, middleware_fn, Handler, Middleware, PipelineBuilder};
pub use crate::tools::{tool_fn, Tool, ToolExecutor, ToolOutput, ToolRegistry};
pub use crate::types::{ChatRequest, ChatResponse, Message, MessageRole, StreamEvent, Usage};
