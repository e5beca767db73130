//! Incremental streaming events

use super::request::Usage;
use super::tool::ToolCall;
use serde::{Deserialize, Serialize};

/// Unified streaming event enum
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StreamEvent {
    /// Stream opened by the provider
    Start {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },

    /// Partial text content
    TextDelta { text: String },

    /// Complete tool call
    ToolCall { call: ToolCall },

    /// Partial tool call (arguments streaming)
    ToolCallDelta {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        arguments: String, // partial JSON string
    },

    /// Reasoning / thinking delta
    ReasoningDelta { text: String },

    /// Generation finished
    Finish {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        finish_reason: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },

    /// In-band error; terminal for the stream
    Error { message: String },
}

impl StreamEvent {
    pub fn text(text: impl Into<String>) -> Self {
        StreamEvent::TextDelta { text: text.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        StreamEvent::Error {
            message: message.into(),
        }
    }

    /// Tag name as reported to telemetry.
    pub fn event_type(&self) -> &'static str {
        match self {
            StreamEvent::Start { .. } => "start",
            StreamEvent::TextDelta { .. } => "text-delta",
            StreamEvent::ToolCall { .. } => "tool-call",
            StreamEvent::ToolCallDelta { .. } => "tool-call-delta",
            StreamEvent::ReasoningDelta { .. } => "reasoning-delta",
            StreamEvent::Finish { .. } => "finish",
            StreamEvent::Error { .. } => "error",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, StreamEvent::Error { .. })
    }
}
