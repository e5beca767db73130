//! Streaming example
//!
//! A local provider streams a reply word by word, followed by a tool call
//! whose arguments arrive in fragments. The consumer prints deltas as they
//! arrive, then reads the accumulated response. A second request is
//! cancelled half way through to show the producer stopping.
//!
//! Usage:
//!   RUST_LOG=llmx=debug cargo run --example streaming

use async_trait::async_trait;
use llmx::prelude::*;
use llmx::stream::{EventStream, StreamObserver};
use llmx::telemetry::{InMemoryTelemetrySink, Telemetry};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

struct TypewriterProvider {
    telemetry: Telemetry,
}

#[async_trait]
impl llmx::Provider for TypewriterProvider {
    fn name(&self) -> &str {
        "typewriter"
    }

    async fn chat(&self, ctx: &CallContext, request: &ChatRequest) -> llmx::Result<ChatResponse> {
        self.chat_stream(ctx, request).await?.accumulate().await
    }

    async fn chat_stream(&self, ctx: &CallContext, request: &ChatRequest) -> llmx::Result<EventStream> {
        let observer = StreamObserver::new("typewriter", request.model.clone(), self.telemetry.clone());
        let (producer, stream) = EventStream::with_observer(ctx.clone(), observer);
        let model = request.model.clone();

        tokio::spawn(async move {
            let opening = StreamEvent::Start {
                id: Some("resp_1".into()),
                model: Some(model),
            };
            if producer.send(opening).await.is_err() {
                return;
            }
            for word in "Checking the forecast for you. ".split_inclusive(' ') {
                if producer.context().sleep(Duration::from_millis(40)).await.is_err() {
                    return;
                }
                if producer.send(StreamEvent::text(word)).await.is_err() {
                    return;
                }
            }
            for fragment in ["{\"city\":", "\"Lisbon\",", "\"unit\":\"c\"}"] {
                let delta = StreamEvent::ToolCallDelta {
                    id: "call_weather".into(),
                    name: Some("get_weather".into()),
                    arguments: fragment.into(),
                };
                if producer.send(delta).await.is_err() {
                    return;
                }
            }
            let _ = producer
                .send(StreamEvent::Finish {
                    finish_reason: Some("tool_calls".into()),
                    usage: Some(Usage::new(18, 11)),
                })
                .await;
        });

        Ok(stream)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let sink = Arc::new(InMemoryTelemetrySink::new(1000));
    let client = Client::builder()
        .provider(Arc::new(TypewriterProvider {
            telemetry: Telemetry::new(sink.clone()),
        }))
        .default_model("typewriter-mini")
        .build()?;

    let ctx = CallContext::new();
    let mut stream = client
        .chat_stream(&ctx, ChatRequest::default().message(Message::user("Weather in Lisbon?")))
        .await?;
    while let Some(event) = stream.next().await {
        match event? {
            StreamEvent::TextDelta { text } => print!("{}", text),
            StreamEvent::ToolCallDelta { arguments, .. } => print!("<{}>", arguments),
            StreamEvent::Finish { finish_reason, .. } => println!("\n[finish: {:?}]", finish_reason),
            _ => {}
        }
    }
    let resp = stream.accumulated();
    for call in &resp.tool_calls {
        println!("tool call {} -> {}", call.name, call.arguments);
    }
    println!("usage: {:?}", resp.usage);
    println!("telemetry records: {}", sink.len());

    // Cancel mid-stream; the producer task notices and stops.
    let ctx = CallContext::new();
    let mut stream = client
        .chat_stream(&ctx, ChatRequest::default().message(Message::user("again")))
        .await?;
    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(90)).await;
        canceller.cancel();
    });
    while let Some(event) = stream.next().await {
        if let Err(e) = event {
            println!("stream ended: {}", e);
        }
    }

    let mut text = String::new();
    client
        .simple_stream_chat(&CallContext::new(), "once more", |chunk| text.push_str(chunk))
        .await?;
    println!("collected: {}", text.trim_end());

    client.close();
    Ok(())
}
