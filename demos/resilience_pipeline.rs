//! Resilience pipeline example
//!
//! Wires a deliberately flaky in-process provider behind a middleware stack
//! described in JSON: logging, response cache, token-bucket rate limiting,
//! circuit breaker, retry with exponential backoff and an adaptive timeout.
//!
//! Usage:
//!   RUST_LOG=llmx=debug cargo run --example resilience_pipeline

use async_trait::async_trait;
use llmx::prelude::*;
use llmx::stream::EventStream;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const STACK: &str = r#"{
    "logging": true,
    "cache": { "ttl_ms": 60000, "max_entries": 256 },
    "rate_limit": {
        "limiter": { "algorithm": "token_bucket", "rps": 5, "burst": 2 },
        "wait": true
    },
    "circuit_breaker": { "failure_threshold": 4, "open_timeout_ms": 2000 },
    "retry": { "max_attempts": 4, "base_ms": 50, "max_ms": 400 },
    "timeout": { "mode": "adaptive", "base_ms": 2000, "per_message_ms": 100 }
}"#;

/// Fails every third call with an overloaded status.
#[derive(Default)]
struct FlakyProvider {
    calls: AtomicUsize,
}

#[async_trait]
impl llmx::Provider for FlakyProvider {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn chat(&self, ctx: &CallContext, request: &ChatRequest) -> llmx::Result<ChatResponse> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        ctx.sleep(std::time::Duration::from_millis(20)).await?;
        if n % 3 == 0 {
            return Err(llmx::Error::provider("flaky", 529, "overloaded, try again"));
        }
        let question = request
            .messages
            .last()
            .map(|m| m.text_content())
            .unwrap_or_default();
        Ok(ChatResponse::new(format!("[{}] you asked: {}", request.model, question))
            .with_usage(Usage::new(12, 8))
            .with_finish_reason("stop"))
    }

    async fn chat_stream(&self, ctx: &CallContext, _request: &ChatRequest) -> llmx::Result<EventStream> {
        let (_producer, stream) = EventStream::new(ctx.clone());
        Ok(stream)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let provider = Arc::new(FlakyProvider::default());
    let resilience = ResilienceConfig::from_json(STACK)?;
    let client = Client::builder()
        .provider(provider.clone())
        .default_model("flaky-large")
        .temperature(0.3)
        .resilience(resilience)
        .build()?;

    println!("middlewares: {:?}", client.middleware_names());

    let questions = ["What is a token bucket?", "Why retry?", "What is a token bucket?"];
    for q in questions {
        let ctx = CallContext::new().with_timeout(std::time::Duration::from_secs(10));
        match client.simple_chat(&ctx, q).await {
            Ok(answer) => println!("ok   -> {}", answer),
            Err(e) => println!("fail -> {} (code {})", e, e.code()),
        }
    }

    println!("provider calls: {}", provider.calls.load(Ordering::SeqCst));
    client.close();
    Ok(())
}
