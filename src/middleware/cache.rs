//! Response cache in front of the wrapped handler.

use crate::cache::{CacheKeyGenerator, CacheManager};
use crate::context::CallContext;
use crate::pipeline::{BoxHandler, Handler, Middleware};
use crate::types::{ChatRequest, ChatResponse};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Hits return the stored response without calling the handler. Only
/// successful responses are stored. Backend failures degrade to a miss.
#[derive(Clone)]
pub struct CacheMiddleware {
    cache: Arc<CacheManager>,
    keys: Arc<CacheKeyGenerator>,
    ttl: Option<Duration>,
}

impl CacheMiddleware {
    /// Entries use the manager's default TTL.
    pub fn new(cache: Arc<CacheManager>) -> Self {
        Self {
            cache,
            keys: Arc::new(CacheKeyGenerator::new()),
            ttl: None,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_key_generator(mut self, keys: CacheKeyGenerator) -> Self {
        self.keys = Arc::new(keys);
        self
    }

    pub fn manager(&self) -> &Arc<CacheManager> {
        &self.cache
    }
}

impl Middleware for CacheMiddleware {
    fn wrap(&self, next: BoxHandler) -> BoxHandler {
        Arc::new(CacheHandler {
            mw: self.clone(),
            next,
        })
    }

    fn name(&self) -> &str {
        "cache"
    }
}

struct CacheHandler {
    mw: CacheMiddleware,
    next: BoxHandler,
}

#[async_trait]
impl Handler for CacheHandler {
    async fn call(&self, ctx: &CallContext, request: &ChatRequest) -> Result<ChatResponse> {
        let key = match self.mw.keys.generate(request) {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(error = %e, "cannot fingerprint request, bypassing cache");
                return self.next.call(ctx, request).await;
            }
        };

        match self.mw.cache.get::<ChatResponse>(&key).await {
            Ok(Some(hit)) => {
                tracing::debug!(key = %key, model = %request.model, "cache hit");
                return Ok(hit);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "cache lookup failed"),
        }

        let resp = self.next.call(ctx, request).await?;

        let stored = match self.mw.ttl {
            Some(ttl) => self.mw.cache.set_with_ttl(&key, &resp, ttl).await,
            None => self.mw.cache.set(&key, &resp).await,
        };
        if let Err(e) = stored {
            tracing::warn!(error = %e, "cache store failed");
        }
        Ok(resp)
    }
}
