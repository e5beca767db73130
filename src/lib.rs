//! # llmx
//!
//! 统一的 LLM 客户端核心：可组合的弹性中间件与有界事件流。
//!
//! Provider-neutral LLM client core. Every non-streaming call passes through
//! a chain of middlewares (rate limiting, circuit breaking, retry, timeouts,
//! caching, logging, telemetry) wrapped around a provider adapter; streaming
//! calls hand the caller a bounded, cancellable [`EventStream`].
//!
//! ## Core Ideas
//!
//! - **One cancellation signal**: a [`CallContext`] threads through every
//!   layer, and every wait (limiter, backoff, blocked stream send) races it.
//! - **Classification by kind**: retry decisions use [`Error::retryable`],
//!   never message text.
//! - **Shared state is explicit**: limiters, breakers and caches live behind
//!   `Arc` and can be shared across pipelines; a built pipeline is immutable.
//!
//! ## Quick Start
//!
//! ```rust
//! use llmx::context::CallContext;
//! use llmx::middleware::{CircuitBreakerMiddleware, RetryMiddleware, TimeoutMiddleware};
//! use llmx::pipeline::{handler_fn, Handler, PipelineBuilder};
//! use llmx::resilience::{CircuitBreaker, CircuitBreakerConfig, RetryConfig};
//! use llmx::types::{ChatRequest, ChatResponse, Message};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> llmx::Result<()> {
//! let provider = handler_fn(|_ctx, req: ChatRequest| async move {
//!     Ok(ChatResponse::new(format!("{} says hi", req.model)))
//! });
//!
//! let pipeline = PipelineBuilder::new()
//!     .add_middleware(CircuitBreakerMiddleware::new(Arc::new(CircuitBreaker::new(
//!         CircuitBreakerConfig::new(),
//!     ))))
//!     .add_middleware(RetryMiddleware::new(RetryConfig::new(3)))
//!     .add_middleware(TimeoutMiddleware::fixed(Duration::from_secs(30)))
//!     .build(provider);
//!
//! let request = ChatRequest::new("gpt-4o-mini").message(Message::user("Hello"));
//! let response = pipeline.call(&CallContext::new(), &request).await?;
//! assert_eq!(response.text(), "gpt-4o-mini says hi");
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`pipeline`] | Handler / middleware contracts and composition |
//! | [`middleware`] | Rate limit, circuit breaker, retry, timeout, cache, logging, telemetry |
//! | [`resilience`] | Token bucket, sliding window, circuit breaker, backoff, retry policy |
//! | [`cache`] | Request fingerprinting, cache backends, typed cache manager |
//! | [`stream`] | Bounded event stream and accumulator |
//! | [`client`] | Provider seam and the unified [`Client`] |
//! | [`config`] | Declarative [`ResilienceConfig`] |
//! | [`context`] | Per-call cancellation and deadlines |
//! | [`telemetry`] | Metric sink interface and spans |
//! | [`tools`] | Tool registry and the automatic tool-calling loop |
//! | [`logging`] | Structured logger interface |
//! | [`types`] | Requests, responses, messages, stream events |

pub mod cache;
pub mod client;
pub mod config;
pub mod context;
pub mod error_code;
pub mod logging;
pub mod middleware;
pub mod pipeline;
pub mod prelude;
pub mod resilience;
pub mod stream;
pub mod telemetry;
pub mod tools;
pub mod types;

// Re-export main types for convenience
pub use client::{Client, ClientBuilder, ClientConfig, Provider};
pub use config::ResilienceConfig;
pub use context::CallContext;
pub use pipeline::{Handler, Middleware, Pipeline, PipelineBuilder};
pub use stream::EventStream;
pub use types::{
    events::StreamEvent,
    message::{Message, MessageRole},
    request::{ChatRequest, ChatResponse, Usage},
    tool::{ToolCall, ToolDefinition},
};

use futures::Stream;
use std::pin::Pin;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// A unified pinned, boxed stream that emits `Result<T>`
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = Result<T>> + Send + 'a>>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
