//! 错误分类：定义错误种类及其默认重试语义。
//!
//! Error kind taxonomy.
//!
//! Every [`Error`](crate::Error) maps onto one [`ErrorKind`]. The kind carries the
//! stable code string reported to telemetry, an HTTP-like status, and whether the
//! failure is retryable by default.
//!
//! | Kind            | Status | Retryable |
//! |-----------------|--------|-----------|
//! | rate_limit      | 429    | yes       |
//! | authentication  | 401    | no        |
//! | invalid_request | 400    | no        |
//! | not_found       | 404    | no        |
//! | internal        | 500    | yes       |
//! | provider_error  | varies | >= 500    |
//! | cancelled       | 499    | no        |
//! | deadline        | 504    | no        |
//! | configuration   | 400    | no        |
//! | unknown         | 500    | no        |
//!
//! ## Example
//!
//! ```rust
//! use llmx::error_code::ErrorKind;
//!
//! let kind = ErrorKind::from_http_status(429);
//! assert_eq!(kind.code(), "rate_limit");
//! assert!(kind.retryable());
//! ```

use std::fmt;

/// Coarse classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Admission denied by a local limiter or by the provider.
    RateLimit,
    /// Invalid, expired, or missing credentials.
    Authentication,
    /// Malformed request or missing required fields.
    InvalidRequest,
    /// Requested model or resource does not exist.
    NotFound,
    /// Internal failure, including timeouts and open circuit breakers.
    Internal,
    /// Provider-side failure carrying its own status code.
    Provider,
    /// The caller cancelled the call.
    Cancelled,
    /// The caller's deadline elapsed.
    DeadlineExceeded,
    /// Invalid local configuration.
    Configuration,
    /// Could not be classified.
    Unknown,
}

impl ErrorKind {
    /// Returns the stable code string (e.g. `"rate_limit"`).
    #[inline]
    pub fn code(&self) -> &'static str {
        match self {
            Self::RateLimit => "rate_limit",
            Self::Authentication => "authentication",
            Self::InvalidRequest => "invalid_request",
            Self::NotFound => "not_found",
            Self::Internal => "internal",
            Self::Provider => "provider_error",
            Self::Cancelled => "cancelled",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::Configuration => "configuration",
            Self::Unknown => "unknown",
        }
    }

    /// Returns the default HTTP-like status for this kind.
    #[inline]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::RateLimit => 429,
            Self::Authentication => 401,
            Self::InvalidRequest | Self::Configuration => 400,
            Self::NotFound => 404,
            Self::Cancelled => 499,
            Self::DeadlineExceeded => 504,
            Self::Internal | Self::Provider | Self::Unknown => 500,
        }
    }

    /// Returns whether this kind is retryable by default.
    ///
    /// `Provider` errors decide per status code, see [`crate::Error::retryable`].
    #[inline]
    pub fn retryable(&self) -> bool {
        matches!(self, Self::RateLimit | Self::Internal)
    }

    /// Maps an HTTP status code to the most likely kind.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            400 | 413 | 422 => Self::InvalidRequest,
            401 | 403 => Self::Authentication,
            404 => Self::NotFound,
            408 | 504 => Self::DeadlineExceeded,
            429 => Self::RateLimit,
            499 => Self::Cancelled,
            500..=599 => Self::Provider,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
