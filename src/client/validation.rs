//! 请求校验：在进入中间件链之前拒绝结构上无效的请求。
//!
//! Request and client configuration validation.

use super::ClientConfig;
use crate::types::ChatRequest;
use crate::{Error, ErrorContext, Result};

pub(crate) fn validate_request(request: &ChatRequest) -> Result<()> {
    if request.messages.is_empty() {
        return Err(Error::invalid_request_with_context(
            "at least one message is required",
            ErrorContext::new()
                .with_field_path("messages")
                .with_source("request_validator"),
        ));
    }

    for (i, msg) in request.messages.iter().enumerate() {
        if msg.content.is_empty() && msg.tool_calls.is_empty() {
            return Err(Error::invalid_request_with_context(
                "message must have content or tool calls",
                ErrorContext::new()
                    .with_field_path(format!("messages[{}]", i))
                    .with_source("request_validator"),
            ));
        }
    }

    Ok(())
}

pub(crate) fn validate_config(config: &ClientConfig) -> Result<()> {
    if let Some(t) = config.temperature {
        if !(0.0..=2.0).contains(&t) {
            return Err(Error::configuration_with_context(
                "temperature must be between 0 and 2",
                ErrorContext::new()
                    .with_field_path("temperature")
                    .with_details(format!("got {}", t))
                    .with_source("client_config"),
            ));
        }
    }
    if config.max_tokens == Some(0) {
        return Err(Error::configuration_with_context(
            "max_tokens must be positive",
            ErrorContext::new()
                .with_field_path("max_tokens")
                .with_source("client_config"),
        ));
    }
    if let Some(p) = config.top_p {
        if !(0.0..=1.0).contains(&p) {
            return Err(Error::configuration_with_context(
                "top_p must be between 0 and 1",
                ErrorContext::new()
                    .with_field_path("top_p")
                    .with_details(format!("got {}", p))
                    .with_source("client_config"),
            ));
        }
    }
    Ok(())
}
