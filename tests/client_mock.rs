//! Client behaviour against a scripted in-process provider.

use async_trait::async_trait;
use llmx::client::{Client, ClientConfig, Provider};
use llmx::config::ResilienceConfig;
use llmx::context::CallContext;
use llmx::middleware::{CircuitBreakerMiddleware, TimeoutMiddleware};
use llmx::resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use llmx::stream::EventStream;
use llmx::types::{ChatRequest, ChatResponse, Message, StreamEvent, Usage};
use llmx::{Error, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Plays back queued outcomes; answers "ok" once the script runs out.
#[derive(Default)]
struct ScriptedProvider {
    script: Mutex<VecDeque<Result<ChatResponse>>>,
    seen: Mutex<Vec<ChatRequest>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    fn with_script(outcomes: Vec<Result<ChatResponse>>) -> Self {
        Self {
            script: Mutex::new(outcomes.into()),
            ..Default::default()
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn chat(&self, ctx: &CallContext, request: &ChatRequest) -> Result<ChatResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            ctx.sleep(delay).await?;
        }
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ChatResponse::new("ok").with_usage(Usage::new(5, 2))))
    }

    async fn chat_stream(&self, ctx: &CallContext, _request: &ChatRequest) -> Result<EventStream> {
        let (producer, stream) = EventStream::new(ctx.clone());
        tokio::spawn(async move {
            for word in ["streamed ", "reply"] {
                if producer.send(StreamEvent::text(word)).await.is_err() {
                    return;
                }
            }
            let _ = producer
                .send(StreamEvent::Finish {
                    finish_reason: Some("stop".into()),
                    usage: Some(Usage::new(3, 2)),
                })
                .await;
        });
        Ok(stream)
    }
}

#[tokio::test]
async fn test_retry_config_recovers_from_transient_errors() {
    let provider = Arc::new(ScriptedProvider::with_script(vec![
        Err(Error::provider("scripted", 503, "overloaded")),
        Err(Error::rate_limited("slow down", None)),
    ]));
    let resilience = ResilienceConfig::from_json(
        r#"{ "retry": { "max_attempts": 3, "base_ms": 1, "max_ms": 5 } }"#,
    )
    .unwrap();
    let client = Client::builder()
        .provider(provider.clone())
        .default_model("scripted-1")
        .resilience(resilience)
        .build()
        .unwrap();

    let answer = client.simple_chat(&CallContext::new(), "hello").await.unwrap();
    assert_eq!(answer, "ok");
    assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_defaults_reach_provider() {
    let provider = Arc::new(ScriptedProvider::default());
    let client = Client::builder()
        .provider(provider.clone())
        .config(
            ClientConfig::new()
                .with_default_model("scripted-1")
                .with_temperature(0.2)
                .with_max_tokens(128),
        )
        .build()
        .unwrap();

    client
        .chat(
            &CallContext::new(),
            ChatRequest::default()
                .message(Message::user("hi"))
                .max_tokens(16),
        )
        .await
        .unwrap();

    let seen = provider.seen.lock().unwrap();
    assert_eq!(seen[0].model, "scripted-1");
    assert_eq!(seen[0].temperature, Some(0.2));
    assert_eq!(seen[0].max_tokens, Some(16));
}

#[tokio::test]
async fn test_timeout_applies_through_client() {
    let provider = Arc::new(ScriptedProvider::slow(Duration::from_secs(5)));
    let client = Client::builder()
        .provider(provider)
        .default_model("scripted-1")
        .middleware(TimeoutMiddleware::fixed(Duration::from_millis(20)))
        .build()
        .unwrap();

    let err = client.simple_chat(&CallContext::new(), "hi").await.unwrap_err();
    assert!(err.to_string().starts_with("request timeout after"));
    assert!(matches!(err.cause(), Some(Error::DeadlineExceeded)));
}

#[tokio::test]
async fn test_middleware_added_after_build() {
    let provider = Arc::new(ScriptedProvider::with_script(vec![
        Err(Error::internal("boom")),
        Err(Error::internal("boom")),
    ]));
    let client = Client::builder()
        .provider(provider.clone())
        .default_model("scripted-1")
        .build()
        .unwrap();

    let breaker = Arc::new(CircuitBreaker::new(
        CircuitBreakerConfig::new().with_failure_threshold(2),
    ));
    client.use_middleware(CircuitBreakerMiddleware::new(breaker.clone()));
    assert_eq!(client.middleware_names(), vec!["circuit_breaker"]);

    for _ in 0..2 {
        assert!(client.simple_chat(&CallContext::new(), "hi").await.is_err());
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    let err = client.simple_chat(&CallContext::new(), "hi").await.unwrap_err();
    assert!(err.to_string().starts_with("circuit breaker:"));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_streaming_bypasses_chain() {
    let provider = Arc::new(ScriptedProvider::default());
    let client = Client::builder()
        .provider(provider.clone())
        .default_model("scripted-1")
        .middleware(TimeoutMiddleware::fixed(Duration::from_millis(1)))
        .build()
        .unwrap();

    let stream = client
        .chat_stream(&CallContext::new(), ChatRequest::default().message(Message::user("go")))
        .await
        .unwrap();
    let resp = stream.accumulate().await.unwrap();
    assert_eq!(resp.content, "streamed reply");
    assert_eq!(resp.usage.total_tokens, 5);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 0);

    let mut chunks = String::new();
    client
        .simple_stream_chat(&CallContext::new(), "go", |t| chunks.push_str(t))
        .await
        .unwrap();
    assert_eq!(chunks, "streamed reply");
}

#[tokio::test]
async fn test_closed_client_rejects_everything() {
    let client = Client::builder()
        .provider(Arc::new(ScriptedProvider::default()))
        .build()
        .unwrap();
    client.close();
    client.close();

    assert!(client.simple_chat(&CallContext::new(), "hi").await.is_err());
    assert!(client
        .chat_stream(&CallContext::new(), ChatRequest::default().message(Message::user("hi")))
        .await
        .is_err());
}
