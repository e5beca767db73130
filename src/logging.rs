//! Structured logger seam.
//!
//! The pipeline logs through [`Logger`] so applications can route request
//! logs somewhere other than `tracing`. The default forwards to `tracing`.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(s)
    }
}

/// Ordered structured fields attached to a log line.
pub type Fields = Vec<(&'static str, Value)>;

pub trait Logger: Send + Sync {
    fn log(&self, level: LogLevel, message: &str, fields: &[(&'static str, Value)]);
}

pub type SharedLogger = Arc<dyn Logger>;

/// Forwards to `tracing` events; fields are rendered as one JSON object.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: LogLevel, message: &str, fields: &[(&'static str, Value)]) {
        let rendered = render(fields);
        match level {
            LogLevel::Debug => tracing::debug!(target: "llmx", fields = %rendered, "{}", message),
            LogLevel::Info => tracing::info!(target: "llmx", fields = %rendered, "{}", message),
            LogLevel::Warn => tracing::warn!(target: "llmx", fields = %rendered, "{}", message),
            LogLevel::Error => tracing::error!(target: "llmx", fields = %rendered, "{}", message),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn log(&self, _level: LogLevel, _message: &str, _fields: &[(&'static str, Value)]) {}
}

fn render(fields: &[(&'static str, Value)]) -> Value {
    let map = fields
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect::<serde_json::Map<String, Value>>();
    Value::Object(map)
}

pub fn default_logger() -> SharedLogger {
    Arc::new(TracingLogger)
}
