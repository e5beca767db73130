//! Retry policy: how many attempts, which errors, how long to wait.

use crate::resilience::backoff::{BackoffStrategy, ExponentialBackoff};
use crate::Error;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Decides whether a failed attempt is retried and after what delay.
#[async_trait]
pub trait ResiliencePolicy: Send + Sync {
    /// `attempt` is the 0-based index of the attempt that just failed.
    async fn should_retry(&self, attempt: u32, error: &Error) -> Option<Duration>;
}

type Classifier = Arc<dyn Fn(&Error) -> bool + Send + Sync>;

#[derive(Clone)]
pub struct RetryConfig {
    /// Total invocations, including the first.
    pub max_attempts: u32,
    pub backoff: Arc<dyn BackoffStrategy>,
    classifier: Classifier,
}

impl std::fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Arc::new(ExponentialBackoff::default()),
            classifier: Arc::new(Error::retryable),
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    pub fn with_backoff(mut self, backoff: impl BackoffStrategy + 'static) -> Self {
        self.backoff = Arc::new(backoff);
        self
    }

    /// Replace the default classifier ([`Error::retryable`]).
    pub fn with_classifier<F>(mut self, classifier: F) -> Self
    where
        F: Fn(&Error) -> bool + Send + Sync + 'static,
    {
        self.classifier = Arc::new(classifier);
        self
    }

    pub fn is_retryable(&self, error: &Error) -> bool {
        (self.classifier)(error)
    }
}

#[async_trait]
impl ResiliencePolicy for RetryConfig {
    async fn should_retry(&self, attempt: u32, error: &Error) -> Option<Duration> {
        if attempt + 1 >= self.max_attempts || !self.is_retryable(error) {
            return None;
        }
        Some(self.backoff.next(attempt))
    }
}
