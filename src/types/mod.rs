//! 类型系统模块：定义请求、响应与流式事件的核心数据类型。
//!
//! # Types Module
//!
//! Provider-neutral request/response shapes. Adapters translate these to and
//! from vendor wire formats; the pipeline only ever sees these types.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ChatRequest`] | Model, ordered messages, sampling parameters, tool declarations |
//! | [`ChatResponse`] | Generated content, usage, finish reason, creation time |
//! | [`Message`] | Chat message with role and content parts |
//! | [`StreamEvent`] | Tagged incremental event delivered through an event stream |
//! | [`ToolDefinition`] / [`ToolCall`] | Tool declaration and invocation |
//!
//! ## Example
//!
//! ```rust
//! use llmx::types::{ChatRequest, Message, ToolDefinition};
//!
//! let request = ChatRequest::new("gpt-4o")
//!     .message(Message::system("You are a helpful assistant"))
//!     .message(Message::user("What's the weather?"))
//!     .tool(ToolDefinition::new("get_weather").with_description("Current weather"));
//! assert_eq!(request.messages.len(), 2);
//! ```

pub mod events;
pub mod message;
pub mod request;
pub mod tool;

pub use events::StreamEvent;
pub use message::{ContentPart, Message, MessageRole};
pub use request::{ChatRequest, ChatResponse, Usage};
pub use tool::{ToolCall, ToolDefinition};
