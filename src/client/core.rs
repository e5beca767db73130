use super::provider::{Provider, ProviderHandler};
use super::validation::validate_request;
use super::{ClientBuilder, ClientConfig};
use crate::context::CallContext;
use crate::pipeline::{chain, Handler, Middleware, Pipeline};
use crate::stream::EventStream;
use crate::types::{ChatRequest, ChatResponse, Message, StreamEvent};
use crate::{Error, ErrorContext, Result};
use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Unified chat client over a single provider.
pub struct Client {
    provider: Arc<dyn Provider>,
    config: ClientConfig,
    middlewares: Mutex<Vec<Arc<dyn Middleware>>>,
    pipeline: ArcSwap<Pipeline>,
    closed: AtomicBool,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub(crate) fn from_parts(
        provider: Arc<dyn Provider>,
        config: ClientConfig,
        middlewares: Vec<Arc<dyn Middleware>>,
    ) -> Self {
        let pipeline = build_pipeline(&provider, &middlewares);
        Self {
            provider,
            config,
            middlewares: Mutex::new(middlewares),
            pipeline: ArcSwap::from_pointee(pipeline),
            closed: AtomicBool::new(false),
        }
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Names of the active middlewares, outermost first.
    pub fn middleware_names(&self) -> Vec<String> {
        self.pipeline.load().names().to_vec()
    }

    /// Append a middleware (innermost position) and swap in the rebuilt chain.
    pub fn use_middleware<M: Middleware + 'static>(&self, middleware: M) -> &Self {
        self.use_shared(Arc::new(middleware))
    }

    pub fn use_shared(&self, middleware: Arc<dyn Middleware>) -> &Self {
        let mut list = self.middlewares.lock().unwrap_or_else(|e| e.into_inner());
        list.push(middleware);
        self.pipeline
            .store(Arc::new(build_pipeline(&self.provider, &list)));
        tracing::debug!(
            provider = self.provider.name(),
            middlewares = list.len(),
            "client middleware chain rebuilt"
        );
        self
    }

    fn prepare(&self, mut request: ChatRequest) -> Result<ChatRequest> {
        self.check_closed()?;
        validate_request(&request)?;
        self.config.apply_defaults(&mut request);
        Ok(request)
    }

    /// Run a chat call through the middleware chain.
    pub async fn chat(&self, ctx: &CallContext, request: ChatRequest) -> Result<ChatResponse> {
        let request = self.prepare(request)?;
        let pipeline = self.pipeline.load_full();
        pipeline.call(ctx, &request).await
    }

    /// Open a streaming call. Streaming bypasses the middleware chain.
    pub async fn chat_stream(&self, ctx: &CallContext, request: ChatRequest) -> Result<EventStream> {
        let request = self.prepare(request)?;
        self.provider.chat_stream(ctx, &request).await
    }

    /// Single user turn; returns the generated text only.
    pub async fn simple_chat(&self, ctx: &CallContext, text: impl Into<String>) -> Result<String> {
        let request = ChatRequest::default().message(Message::user(text));
        Ok(self.chat(ctx, request).await?.content)
    }

    /// Single user turn, streamed. `on_chunk` sees every text delta; the call
    /// returns at the finish event, at stream end, or on the first error.
    pub async fn simple_stream_chat<F>(
        &self,
        ctx: &CallContext,
        text: impl Into<String>,
        mut on_chunk: F,
    ) -> Result<()>
    where
        F: FnMut(&str) + Send,
    {
        let request = ChatRequest::default().message(Message::user(text));
        let mut stream = self.chat_stream(ctx, request).await?;
        while let Some(item) = stream.next().await {
            match item? {
                StreamEvent::TextDelta { text } => on_chunk(&text),
                StreamEvent::Error { message } => return Err(Error::internal(message)),
                StreamEvent::Finish { .. } => break,
                _ => {}
            }
        }
        stream.close();
        Ok(())
    }

    /// Release the client. Idempotent; later calls fail with an invalid-request error.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!(provider = self.provider.name(), "client closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn check_closed(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::invalid_request_with_context(
                "client is closed",
                ErrorContext::new().with_source("client"),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("provider", &self.provider.name())
            .field("config", &self.config)
            .field("middlewares", &self.middleware_names())
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn build_pipeline(provider: &Arc<dyn Provider>, middlewares: &[Arc<dyn Middleware>]) -> Pipeline {
    chain(middlewares.to_vec()).build(Arc::new(ProviderHandler::new(provider.clone())))
}
