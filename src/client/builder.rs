use super::validation::validate_config;
use super::{Client, ClientConfig, Provider};
use crate::config::ResilienceConfig;
use crate::pipeline::Middleware;
use crate::{Error, ErrorContext, Result};
use std::sync::Arc;

/// Builder for [`Client`].
///
/// Middlewares registered here are stacked in registration order, first
/// registered outermost, same as [`PipelineBuilder`](crate::pipeline::PipelineBuilder).
#[derive(Default)]
pub struct ClientBuilder {
    provider: Option<Arc<dyn Provider>>,
    config: ClientConfig,
    middlewares: Vec<Arc<dyn Middleware>>,
    resilience: Option<ResilienceConfig>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn default_model(mut self, model: impl Into<String>) -> Self {
        self.config.default_model = Some(model.into());
        self
    }

    pub fn temperature(mut self, t: f64) -> Self {
        self.config.temperature = Some(t);
        self
    }

    pub fn max_tokens(mut self, n: u32) -> Self {
        self.config.max_tokens = Some(n);
        self
    }

    pub fn middleware<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    pub fn shared_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    /// Declarative stack, placed inside any middlewares registered directly.
    pub fn resilience(mut self, config: ResilienceConfig) -> Self {
        self.resilience = Some(config);
        self
    }

    pub fn build(self) -> Result<Client> {
        let provider = self.provider.ok_or_else(|| {
            Error::configuration_with_context(
                "a provider is required",
                ErrorContext::new()
                    .with_field_path("provider")
                    .with_source("client_builder"),
            )
        })?;
        validate_config(&self.config)?;

        let mut middlewares = self.middlewares;
        if let Some(resilience) = &self.resilience {
            middlewares.extend(resilience.middlewares()?);
        }

        tracing::debug!(
            provider = provider.name(),
            middlewares = middlewares.len(),
            "client built"
        );
        Ok(Client::from_parts(provider, self.config, middlewares))
    }
}
