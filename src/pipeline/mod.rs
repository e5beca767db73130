//! 中间件流水线模块：定义 Handler / Middleware 契约并组合调用链。
//!
//! # Middleware Pipeline
//!
//! Every provider call passes through a chain of middlewares wrapped around a
//! base [`Handler`]. A [`Middleware`] turns one handler into another; the
//! [`PipelineBuilder`] folds an ordered list of them around a base handler.
//!
//! ```text
//! caller → m1 → m2 → … → mn → base handler → provider adapter
//!        ←    ←    ←      ←
//! ```
//!
//! The first-registered middleware is outermost: it runs first on the way in
//! and last on the way out. A built [`Pipeline`] is immutable and can be
//! shared across concurrent calls; the chain itself holds no mutable state,
//! so calls only contend on the state owned by individual middlewares.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`Handler`] | One logical chat call |
//! | [`Middleware`] | Handler → Handler transformer |
//! | [`PipelineBuilder`] | Ordered middleware registration |
//! | [`Pipeline`] | Composed, shareable handler |
//! | [`handler_fn`] / [`middleware_fn`] | Closure adapters |

#[cfg(test)]
mod tests;

use crate::context::CallContext;
use crate::types::{ChatRequest, ChatResponse};
use crate::Result;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

/// Performs one logical chat call.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, ctx: &CallContext, request: &ChatRequest) -> Result<ChatResponse>;
}

/// Shared, type-erased handler.
pub type BoxHandler = Arc<dyn Handler>;

/// Wraps a handler to produce another handler.
pub trait Middleware: Send + Sync {
    fn wrap(&self, next: BoxHandler) -> BoxHandler;

    fn name(&self) -> &str {
        "unnamed"
    }
}

impl<M: Middleware + ?Sized> Middleware for Arc<M> {
    fn wrap(&self, next: BoxHandler) -> BoxHandler {
        (**self).wrap(next)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Handler backed by an async closure. The closure receives owned copies of
/// the context and request.
pub struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(CallContext, ChatRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ChatResponse>> + Send,
{
    async fn call(&self, ctx: &CallContext, request: &ChatRequest) -> Result<ChatResponse> {
        (self.f)(ctx.clone(), request.clone()).await
    }
}

pub fn handler_fn<F, Fut>(f: F) -> BoxHandler
where
    F: Fn(CallContext, ChatRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ChatResponse>> + Send + 'static,
{
    Arc::new(FnHandler { f })
}

/// Middleware backed by a plain `Fn(BoxHandler) -> BoxHandler`.
pub struct FnMiddleware<F> {
    name: String,
    f: F,
}

impl<F> Middleware for FnMiddleware<F>
where
    F: Fn(BoxHandler) -> BoxHandler + Send + Sync,
{
    fn wrap(&self, next: BoxHandler) -> BoxHandler {
        (self.f)(next)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

pub fn middleware_fn<F>(name: impl Into<String>, f: F) -> Arc<dyn Middleware>
where
    F: Fn(BoxHandler) -> BoxHandler + Send + Sync + 'static,
{
    Arc::new(FnMiddleware {
        name: name.into(),
        f,
    })
}

/// Ordered middleware registration.
#[derive(Clone, Default)]
pub struct PipelineBuilder {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            middlewares: Vec::new(),
        }
    }

    pub fn add_middleware<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    pub fn add_shared(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    pub fn push(&mut self, middleware: Arc<dyn Middleware>) {
        self.middlewares.push(middleware);
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Registered middleware names, outermost first.
    pub fn names(&self) -> Vec<String> {
        self.middlewares.iter().map(|m| m.name().to_string()).collect()
    }

    pub fn middlewares(&self) -> &[Arc<dyn Middleware>] {
        &self.middlewares
    }

    /// Fold the registered middlewares around `base`.
    pub fn build(&self, base: BoxHandler) -> Pipeline {
        Pipeline {
            handler: apply(base, &self.middlewares),
            names: self.names(),
        }
    }
}

impl Middleware for PipelineBuilder {
    fn wrap(&self, next: BoxHandler) -> BoxHandler {
        apply(next, &self.middlewares)
    }

    fn name(&self) -> &str {
        "chain"
    }
}

/// A composed chain. Cheap to clone; rebuild through [`PipelineBuilder`] when
/// the middleware list changes.
#[derive(Clone)]
pub struct Pipeline {
    handler: BoxHandler,
    names: Vec<String>,
}

impl Pipeline {
    pub fn handler(&self) -> BoxHandler {
        self.handler.clone()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

#[async_trait]
impl Handler for Pipeline {
    async fn call(&self, ctx: &CallContext, request: &ChatRequest) -> Result<ChatResponse> {
        self.handler.call(ctx, request).await
    }
}

/// Equivalent to `middlewares[0](middlewares[1](…(handler)…))`.
pub fn apply(handler: BoxHandler, middlewares: &[Arc<dyn Middleware>]) -> BoxHandler {
    middlewares
        .iter()
        .rev()
        .fold(handler, |next, m| m.wrap(next))
}

/// Combine several middlewares into one, preserving registration order.
pub fn chain(middlewares: Vec<Arc<dyn Middleware>>) -> PipelineBuilder {
    PipelineBuilder { middlewares }
}
