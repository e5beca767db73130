//! Folds stream events into a running response.

use crate::types::{ChatResponse, StreamEvent, ToolCall, Usage};
use serde_json::Value;

/// Running totals for one stream.
///
/// Text deltas are concatenated in arrival order. Tool call deltas are
/// assembled per id and their argument fragments parsed as JSON when the
/// response is built; fragments that never form valid JSON stay as a string.
#[derive(Debug, Clone, Default)]
pub struct Accumulator {
    id: Option<String>,
    model: Option<String>,
    content: String,
    reasoning: String,
    tool_calls: Vec<ToolCall>,
    usage: Option<Usage>,
    finish_reason: Option<String>,
    events: usize,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: &StreamEvent) {
        self.events += 1;
        match event {
            StreamEvent::Start { id, model } => {
                if id.is_some() {
                    self.id = id.clone();
                }
                if model.is_some() {
                    self.model = model.clone();
                }
            }
            StreamEvent::TextDelta { text } => self.content.push_str(text),
            StreamEvent::ReasoningDelta { text } => self.reasoning.push_str(text),
            StreamEvent::ToolCall { call } => {
                match self.tool_calls.iter_mut().find(|t| t.id == call.id) {
                    Some(existing) => *existing = call.clone(),
                    None => self.tool_calls.push(call.clone()),
                }
            }
            StreamEvent::ToolCallDelta {
                id,
                name,
                arguments,
            } => self.on_tool_delta(id, name.as_deref(), arguments),
            StreamEvent::Finish {
                finish_reason,
                usage,
            } => {
                if finish_reason.is_some() {
                    self.finish_reason = finish_reason.clone();
                }
                if usage.is_some() {
                    self.usage = *usage;
                }
            }
            StreamEvent::Error { .. } => {}
        }
    }

    fn on_tool_delta(&mut self, id: &str, name: Option<&str>, fragment: &str) {
        let tc = match self.tool_calls.iter().position(|t| t.id == id) {
            Some(i) => &mut self.tool_calls[i],
            None => {
                self.tool_calls.push(ToolCall {
                    id: id.to_string(),
                    name: String::new(),
                    arguments: Value::String(String::new()),
                });
                let last = self.tool_calls.len() - 1;
                &mut self.tool_calls[last]
            }
        };
        if let Some(name) = name {
            if tc.name.is_empty() {
                tc.name = name.to_string();
            }
        }
        match &mut tc.arguments {
            Value::String(s) => s.push_str(fragment),
            _ => tc.arguments = Value::String(fragment.to_string()),
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    /// Number of events folded so far.
    pub fn events(&self) -> usize {
        self.events
    }

    pub fn response(&self) -> ChatResponse {
        let tool_calls = self
            .tool_calls
            .iter()
            .cloned()
            .map(|mut tc| {
                if let Value::String(s) = &tc.arguments {
                    let trimmed = s.trim();
                    if !trimmed.is_empty() {
                        if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
                            tc.arguments = v;
                        }
                    }
                }
                tc
            })
            .collect();

        ChatResponse {
            id: self.id.clone().unwrap_or_default(),
            model: self.model.clone().unwrap_or_default(),
            content: self.content.clone(),
            reasoning: (!self.reasoning.is_empty()).then(|| self.reasoning.clone()),
            tool_calls,
            usage: self.usage.unwrap_or_default(),
            finish_reason: self.finish_reason.clone(),
            ..ChatResponse::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_deltas_concatenate() {
        let mut acc = Accumulator::new();
        acc.apply(&StreamEvent::Start {
            id: Some("resp_1".into()),
            model: Some("gpt-4o".into()),
        });
        acc.apply(&StreamEvent::text("Hel"));
        acc.apply(&StreamEvent::text("lo"));
        acc.apply(&StreamEvent::Finish {
            finish_reason: Some("stop".into()),
            usage: Some(Usage::new(5, 2)),
        });

        let resp = acc.response();
        assert_eq!(resp.content, "Hello");
        assert_eq!(resp.id, "resp_1");
        assert_eq!(resp.finish_reason.as_deref(), Some("stop"));
        assert_eq!(resp.usage.total_tokens, 7);
        assert_eq!(resp.reasoning, None);
        assert_eq!(acc.events(), 4);
    }

    #[test]
    fn test_reasoning_reaches_response() {
        let mut acc = Accumulator::new();
        acc.apply(&StreamEvent::ReasoningDelta {
            text: "compare both ".into(),
        });
        acc.apply(&StreamEvent::ReasoningDelta {
            text: "options".into(),
        });
        acc.apply(&StreamEvent::text("Option B."));

        let resp = acc.response();
        assert_eq!(resp.reasoning.as_deref(), Some("compare both options"));
        assert_eq!(resp.content, "Option B.");
        assert_eq!(acc.reasoning(), "compare both options");
    }

    #[test]
    fn test_tool_call_fragments_assemble() {
        let mut acc = Accumulator::new();
        acc.apply(&StreamEvent::ToolCallDelta {
            id: "call_1".into(),
            name: Some("get_weather".into()),
            arguments: "{\"city\":".into(),
        });
        acc.apply(&StreamEvent::ToolCallDelta {
            id: "call_1".into(),
            name: None,
            arguments: "\"Paris\"}".into(),
        });
        acc.apply(&StreamEvent::ToolCallDelta {
            id: "call_2".into(),
            name: Some("broken".into()),
            arguments: "{not json".into(),
        });

        let calls = acc.response().tool_calls;
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "get_weather");
        assert_eq!(calls[0].arguments, serde_json::json!({"city": "Paris"}));
        assert_eq!(calls[1].arguments, Value::String("{not json".into()));
    }
}
