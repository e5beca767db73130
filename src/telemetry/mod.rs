//! 遥测模块：为流水线调用点提供可插拔的指标记录接口。
//!
//! # Telemetry Module
//!
//! The pipeline records requests, durations, token counts, errors and stream
//! events through a [`TelemetrySink`]. Exporter wiring is left to the
//! application: without a sink every call is a no-op.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`TelemetrySink`] | Trait for metric destinations (all methods default to no-ops) |
//! | [`Telemetry`] | Facade over an optional sink plus span creation |
//! | [`NoopTelemetrySink`] | Default sink (no collection) |
//! | [`InMemoryTelemetrySink`] | Bounded in-memory sink for testing |
//! | [`CompositeTelemetrySink`] | Fan-out to several sinks |

use std::sync::{Arc, RwLock};

/// Destination for pipeline metrics. Implementations must be cheap and must
/// not block: they run inline on the request path.
pub trait TelemetrySink: Send + Sync {
    fn record_request(&self, _provider: &str, _model: &str, _success: bool) {}
    fn record_duration(&self, _provider: &str, _model: &str, _millis: u64) {}
    /// `kind` is one of `prompt`, `completion`, `total`.
    fn record_tokens(&self, _provider: &str, _model: &str, _kind: &str, _count: u64) {}
    fn record_error(&self, _provider: &str, _model: &str, _error_code: &str) {}
    fn record_stream_event(&self, _provider: &str, _model: &str, _event_type: &str) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTelemetrySink;

impl TelemetrySink for NoopTelemetrySink {}

/// One recorded call, as captured by [`InMemoryTelemetrySink`].
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryRecord {
    Request {
        provider: String,
        model: String,
        success: bool,
    },
    Duration {
        provider: String,
        model: String,
        millis: u64,
    },
    Tokens {
        provider: String,
        model: String,
        kind: String,
        count: u64,
    },
    Error {
        provider: String,
        model: String,
        code: String,
    },
    StreamEvent {
        provider: String,
        model: String,
        event_type: String,
    },
}

/// In-memory sink for testing.
pub struct InMemoryTelemetrySink {
    records: RwLock<Vec<TelemetryRecord>>,
    max_records: usize,
}

impl InMemoryTelemetrySink {
    pub fn new(max: usize) -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            max_records: max,
        }
    }

    fn push(&self, record: TelemetryRecord) {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records.push(record);
        if records.len() > self.max_records {
            records.remove(0);
        }
    }

    pub fn records(&self) -> Vec<TelemetryRecord> {
        self.records
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn clear(&self) {
        self.records
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryTelemetrySink {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl TelemetrySink for InMemoryTelemetrySink {
    fn record_request(&self, provider: &str, model: &str, success: bool) {
        self.push(TelemetryRecord::Request {
            provider: provider.into(),
            model: model.into(),
            success,
        });
    }

    fn record_duration(&self, provider: &str, model: &str, millis: u64) {
        self.push(TelemetryRecord::Duration {
            provider: provider.into(),
            model: model.into(),
            millis,
        });
    }

    fn record_tokens(&self, provider: &str, model: &str, kind: &str, count: u64) {
        self.push(TelemetryRecord::Tokens {
            provider: provider.into(),
            model: model.into(),
            kind: kind.into(),
            count,
        });
    }

    fn record_error(&self, provider: &str, model: &str, error_code: &str) {
        self.push(TelemetryRecord::Error {
            provider: provider.into(),
            model: model.into(),
            code: error_code.into(),
        });
    }

    fn record_stream_event(&self, provider: &str, model: &str, event_type: &str) {
        self.push(TelemetryRecord::StreamEvent {
            provider: provider.into(),
            model: model.into(),
            event_type: event_type.into(),
        });
    }
}

/// Composite sink for multiple destinations.
#[derive(Default)]
pub struct CompositeTelemetrySink {
    sinks: Vec<Arc<dyn TelemetrySink>>,
}

impl CompositeTelemetrySink {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn add_sink(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl TelemetrySink for CompositeTelemetrySink {
    fn record_request(&self, provider: &str, model: &str, success: bool) {
        for s in &self.sinks {
            s.record_request(provider, model, success);
        }
    }
    fn record_duration(&self, provider: &str, model: &str, millis: u64) {
        for s in &self.sinks {
            s.record_duration(provider, model, millis);
        }
    }
    fn record_tokens(&self, provider: &str, model: &str, kind: &str, count: u64) {
        for s in &self.sinks {
            s.record_tokens(provider, model, kind, count);
        }
    }
    fn record_error(&self, provider: &str, model: &str, error_code: &str) {
        for s in &self.sinks {
            s.record_error(provider, model, error_code);
        }
    }
    fn record_stream_event(&self, provider: &str, model: &str, event_type: &str) {
        for s in &self.sinks {
            s.record_stream_event(provider, model, event_type);
        }
    }
}

/// Facade over an optional sink. A missing sink turns every call into a no-op.
#[derive(Clone, Default)]
pub struct Telemetry {
    sink: Option<Arc<dyn TelemetrySink>>,
}

impl Telemetry {
    pub fn new(sink: Arc<dyn TelemetrySink>) -> Self {
        Self { sink: Some(sink) }
    }

    pub fn disabled() -> Self {
        Self { sink: None }
    }

    /// Facade over whatever sink is installed globally at call time.
    pub fn global() -> Self {
        Self::new(get_telemetry_sink())
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// Span covering one chat call. `request_id` is filled in by the caller.
    pub fn start_span(
        &self,
        operation: &str,
        model: &str,
        messages: usize,
        tools: usize,
    ) -> tracing::Span {
        tracing::info_span!(
            "llmx.chat",
            operation,
            model,
            messages,
            tools,
            request_id = tracing::field::Empty,
            provider = tracing::field::Empty,
        )
    }

    pub fn record_request(&self, provider: &str, model: &str, success: bool) {
        if let Some(sink) = &self.sink {
            sink.record_request(provider, model, success);
        }
    }

    pub fn record_duration(&self, provider: &str, model: &str, millis: u64) {
        if let Some(sink) = &self.sink {
            sink.record_duration(provider, model, millis);
        }
    }

    pub fn record_tokens(&self, provider: &str, model: &str, kind: &str, count: u64) {
        if let Some(sink) = &self.sink {
            sink.record_tokens(provider, model, kind, count);
        }
    }

    pub fn record_error(&self, provider: &str, model: &str, error_code: &str) {
        if let Some(sink) = &self.sink {
            sink.record_error(provider, model, error_code);
        }
    }

    pub fn record_stream_event(&self, provider: &str, model: &str, event_type: &str) {
        if let Some(sink) = &self.sink {
            sink.record_stream_event(provider, model, event_type);
        }
    }
}

impl std::fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Telemetry")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

/// Best-effort provider name from a model identifier.
pub fn provider_for_model(model: &str) -> &'static str {
    let m = model.to_ascii_lowercase();
    if m.starts_with("gpt") || m.starts_with("o1") || m.starts_with("o3") {
        "openai"
    } else if m.starts_with("claude") {
        "anthropic"
    } else if m.starts_with("gemini") {
        "google"
    } else {
        "unknown"
    }
}

static GLOBAL_SINK: once_cell::sync::Lazy<RwLock<Arc<dyn TelemetrySink>>> =
    once_cell::sync::Lazy::new(|| RwLock::new(Arc::new(NoopTelemetrySink)));

/// Returns the globally configured telemetry sink.
pub fn get_telemetry_sink() -> Arc<dyn TelemetrySink> {
    GLOBAL_SINK
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .clone()
}

/// Sets the global telemetry sink.
pub fn set_telemetry_sink(sink: Arc<dyn TelemetrySink>) {
    *GLOBAL_SINK.write().unwrap_or_else(|e| e.into_inner()) = sink;
}
