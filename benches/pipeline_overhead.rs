//! Benchmarks for middleware pipeline overhead
//!
//! This benchmark measures:
//! - Cost of an empty pipeline vs. a direct handler call
//! - Per-middleware overhead of a full resilience stack
//! - Cache hit path (fingerprint + lookup + decode)
//! - Request fingerprinting alone

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use llmx::cache::{CacheConfig, CacheKeyGenerator, CacheManager, MemoryCache};
use llmx::context::CallContext;
use llmx::middleware::{
    CacheMiddleware, CircuitBreakerMiddleware, RateLimitMiddleware, RetryMiddleware,
    TimeoutMiddleware,
};
use llmx::pipeline::{handler_fn, BoxHandler, Handler, PipelineBuilder};
use llmx::resilience::{
    CircuitBreaker, CircuitBreakerConfig, RateLimiter, RetryConfig, TokenBucketLimiter,
};
use llmx::types::{ChatRequest, ChatResponse, Message, ToolDefinition};
use std::sync::Arc;
use std::time::Duration;

fn base() -> BoxHandler {
    handler_fn(|_ctx, _req| async { Ok(ChatResponse::new("benchmark response")) })
}

fn sample_request() -> ChatRequest {
    ChatRequest::new("gpt-4o-mini")
        .message(Message::system("You are a concise assistant."))
        .message(Message::user("Summarize the plot of Hamlet in one sentence."))
        .temperature(0.2)
        .tool(ToolDefinition::new("search").with_description("Web search"))
}

fn bench_pipeline(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("tokio runtime");
    let req = sample_request();
    let ctx = CallContext::new();

    let mut group = c.benchmark_group("pipeline");

    let direct = base();
    group.bench_function("direct_handler", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(direct.call(&ctx, &req).await.unwrap());
        })
    });

    let empty = PipelineBuilder::new().build(base());
    group.bench_function("empty_pipeline", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(empty.call(&ctx, &req).await.unwrap());
        })
    });

    let limiter: Arc<dyn RateLimiter> = Arc::new(TokenBucketLimiter::with_rate(1.0e9, u32::MAX));
    let full = PipelineBuilder::new()
        .add_middleware(RateLimitMiddleware::new(limiter, false))
        .add_middleware(CircuitBreakerMiddleware::new(Arc::new(CircuitBreaker::new(
            CircuitBreakerConfig::new(),
        ))))
        .add_middleware(RetryMiddleware::new(RetryConfig::new(3)))
        .add_middleware(TimeoutMiddleware::fixed(Duration::from_secs(30)))
        .build(base());
    group.bench_function("resilience_stack", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(full.call(&ctx, &req).await.unwrap());
        })
    });

    let cached = rt.block_on(async {
        let manager = Arc::new(CacheManager::new(
            CacheConfig::new(),
            Arc::new(MemoryCache::new(1024)),
        ));
        let p = PipelineBuilder::new()
            .add_middleware(CacheMiddleware::new(manager))
            .build(base());
        p.call(&ctx, &req).await.unwrap();
        p
    });
    group.bench_function("cache_hit", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(cached.call(&ctx, &req).await.unwrap());
        })
    });

    group.finish();
}

fn bench_fingerprint(c: &mut Criterion) {
    let keys = CacheKeyGenerator::new();
    let req = sample_request();
    c.bench_function("fingerprint_request", |b| {
        b.iter(|| black_box(keys.generate(black_box(&req)).unwrap()))
    });
}

criterion_group!(benches, bench_pipeline, bench_fingerprint);
criterion_main!(benches);
