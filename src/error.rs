use crate::error_code::ErrorKind;
use std::time::Duration;
use thiserror::Error;

/// Structured error context for validation and configuration failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path that caused the error (e.g., "retry.max_attempts", "messages[0].content")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected range, actual value)
    pub details: Option<String>,
    /// Component that raised the error (e.g., "request_validator", "config")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Unified error type for every call that passes through the pipeline.
///
/// Each variant maps onto one [`ErrorKind`]; retry decisions are made from
/// [`Error::retryable`], never from the message text.
#[derive(Debug, Error)]
pub enum Error {
    #[error("rate limit: {message}{}", format_source(.source))]
    RateLimited {
        message: String,
        /// Suggested wait before trying again, if the refusing layer knows one.
        retry_after: Option<Duration>,
        /// Why a blocking wait gave up.
        #[source]
        source: Option<Box<Error>>,
    },

    #[error("authentication failed: {message}")]
    Authentication { message: String },

    #[error("invalid request: {message}{}", format_context(.context))]
    InvalidRequest {
        message: String,
        context: ErrorContext,
    },

    #[error("not found: {message}")]
    NotFound {
        message: String,
        resource: Option<String>,
    },

    #[error("{message}{}", format_source(.source))]
    Internal {
        message: String,
        #[source]
        source: Option<Box<Error>>,
    },

    #[error("provider {provider} returned HTTP {status}: {message}")]
    Provider {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("call cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

fn format_source(source: &Option<Box<Error>>) -> String {
    match source {
        Some(cause) => format!(": {}", cause),
        None => String::new(),
    }
}

impl Error {
    pub fn rate_limited(msg: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Error::RateLimited {
            message: msg.into(),
            retry_after,
            source: None,
        }
    }

    /// Rate-limit refusal caused by a failed wait; carries no `retry_after`.
    pub fn rate_limited_with_source(msg: impl Into<String>, cause: Error) -> Self {
        Error::RateLimited {
            message: msg.into(),
            retry_after: None,
            source: Some(Box::new(cause)),
        }
    }

    pub fn authentication(msg: impl Into<String>) -> Self {
        Error::Authentication {
            message: msg.into(),
        }
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::invalid_request_with_context(msg, ErrorContext::new())
    }

    pub fn invalid_request_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::InvalidRequest {
            message: msg.into(),
            context,
        }
    }

    pub fn not_found(msg: impl Into<String>, resource: Option<String>) -> Self {
        Error::NotFound {
            message: msg.into(),
            resource,
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal {
            message: msg.into(),
            source: None,
        }
    }

    /// Internal error that keeps the underlying cause reachable through `source()`.
    pub fn internal_with_source(msg: impl Into<String>, cause: Error) -> Self {
        Error::Internal {
            message: msg.into(),
            source: Some(Box::new(cause)),
        }
    }

    pub fn provider(provider: impl Into<String>, status: u16, msg: impl Into<String>) -> Self {
        Error::Provider {
            provider: provider.into(),
            status,
            message: msg.into(),
        }
    }

    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::RateLimited { .. } => ErrorKind::RateLimit,
            Error::Authentication { .. } => ErrorKind::Authentication,
            Error::InvalidRequest { .. } => ErrorKind::InvalidRequest,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::Internal { .. } => ErrorKind::Internal,
            Error::Provider { .. } => ErrorKind::Provider,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::DeadlineExceeded => ErrorKind::DeadlineExceeded,
            Error::Configuration { .. } => ErrorKind::Configuration,
            Error::Serialization(_) | Error::Other(_) => ErrorKind::Unknown,
        }
    }

    /// Stable code string, as reported to telemetry.
    pub fn code(&self) -> &'static str {
        self.kind().code()
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Error::Provider { status, .. } => *status,
            other => other.kind().status_code(),
        }
    }

    /// Whether the originating layer tagged this failure as transient.
    ///
    /// Untagged errors (`Other`, `Serialization`) are never retryable.
    pub fn retryable(&self) -> bool {
        match self {
            Error::Provider { status, .. } => *status >= 500,
            other => other.kind().retryable(),
        }
    }

    /// Suggested wait before retrying, when known.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::InvalidRequest { context, .. } | Error::Configuration { context, .. } => {
                Some(context)
            }
            _ => None,
        }
    }

    /// Underlying cause of a synthesized error, if one was wrapped.
    pub fn cause(&self) -> Option<&Error> {
        match self {
            Error::Internal {
                source: Some(cause),
                ..
            }
            | Error::RateLimited {
                source: Some(cause),
                ..
            } => Some(cause),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::rate_limited("slow down", None).retryable());
        assert!(Error::internal("boom").retryable());
        assert!(Error::provider("openai", 503, "overloaded").retryable());
        assert!(!Error::provider("openai", 400, "bad").retryable());
        assert!(!Error::authentication("bad key").retryable());
        assert!(!Error::invalid_request("no messages").retryable());
        assert!(!Error::not_found("no such model", Some("gpt-9".into())).retryable());
        assert!(!Error::Cancelled.retryable());
        assert!(!Error::Other(anyhow::anyhow!("generic")).retryable());
    }

    #[test]
    fn test_internal_wraps_cause() {
        let err = Error::internal_with_source("request timeout after 1s", Error::DeadlineExceeded);
        assert_eq!(err.to_string(), "request timeout after 1s: deadline exceeded");
        assert!(matches!(err.cause(), Some(Error::DeadlineExceeded)));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_context_formatting() {
        let err = Error::invalid_request_with_context(
            "at least one message is required",
            ErrorContext::new()
                .with_field_path("messages")
                .with_source("request_validator"),
        );
        assert_eq!(
            err.to_string(),
            "invalid request: at least one message is required (field: messages, source: request_validator)"
        );
        assert_eq!(
            err.context().and_then(|c| c.field_path.as_deref()),
            Some("messages")
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::rate_limited("x", None).status_code(), 429);
        assert_eq!(Error::provider("p", 502, "bad gateway").status_code(), 502);
        assert_eq!(Error::Cancelled.code(), "cancelled");
    }
}
