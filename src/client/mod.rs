//! 客户端模块：在中间件流水线之上提供统一的对话入口。
//!
//! # Client
//!
//! [`Client`] owns one [`Provider`] and a middleware chain. Non-streaming
//! calls are validated, completed with the defaults from [`ClientConfig`],
//! then routed through the chain; streaming calls go straight to the
//! provider. Middlewares can be added at any time; in-flight calls keep the
//! chain they started with.
//!
//! ```rust,no_run
//! use llmx::client::{Client, ClientConfig, Provider};
//! use llmx::context::CallContext;
//! use llmx::middleware::RetryMiddleware;
//! use llmx::resilience::RetryConfig;
//! use std::sync::Arc;
//!
//! # async fn run(provider: Arc<dyn Provider>) -> llmx::Result<()> {
//! let client = Client::builder()
//!     .provider(provider)
//!     .config(ClientConfig::new().with_default_model("gpt-4o-mini"))
//!     .middleware(RetryMiddleware::new(RetryConfig::new(3)))
//!     .build()?;
//!
//! let answer = client.simple_chat(&CallContext::new(), "Hello!").await?;
//! println!("{answer}");
//! client.close();
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod core;
pub mod provider;
mod validation;

pub use builder::ClientBuilder;
pub use core::Client;
pub use provider::Provider;

use crate::types::ChatRequest;

/// Defaults applied to requests that leave the corresponding field unset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientConfig {
    pub default_model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f64>,
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, t: f64) -> Self {
        self.temperature = Some(t);
        self
    }

    pub fn with_max_tokens(mut self, n: u32) -> Self {
        self.max_tokens = Some(n);
        self
    }

    pub fn with_top_p(mut self, p: f64) -> Self {
        self.top_p = Some(p);
        self
    }

    /// Fill unset fields of `request`. Explicit request values always win.
    pub fn apply_defaults(&self, request: &mut ChatRequest) {
        if request.model.is_empty() {
            if let Some(model) = &self.default_model {
                request.model = model.clone();
            }
        }
        if request.temperature.is_none() {
            request.temperature = self.temperature;
        }
        if request.max_tokens.is_none() {
            request.max_tokens = self.max_tokens;
        }
        if request.top_p.is_none() {
            request.top_p = self.top_p;
        }
    }
}
