//! OpenAI chat/completions SSE parser for streaming responses
//!
//! Groq and most hosted open-model endpoints speak this format.

use serde_json::Value;

use crate::ai::sse::{parse_finish_reason, SseEvent, SseParser};

/// OpenAI-compatible chat completion chunk parser
///
/// Parses the streaming chunk format:
/// ```json
/// {"choices": [{"index": 0, "delta": {"content": "..."}, "finish_reason": null}]}
/// ```
#[derive(Debug, Default)]
pub struct OpenAIParser;

impl OpenAIParser {
    pub fn new() -> Self {
        Self
    }
}

impl SseParser for OpenAIParser {
    fn parse_event(&self, json: &Value) -> Vec<SseEvent> {
        // Errors can arrive in-band after the stream has started
        if let Some(error) = json.get("error") {
            let detail = error
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return vec![SseEvent::Error(detail)];
        }

        let Some(choice) = json
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|arr| arr.first())
        else {
            return Vec::new();
        };

        let mut events = Vec::new();

        if let Some(text) = choice
            .get("delta")
            .and_then(|d| d.get("content"))
            .and_then(|t| t.as_str())
            .filter(|t| !t.is_empty())
        {
            events.push(SseEvent::TextDelta(text.to_string()));
        }

        // Some providers put the last fragment and the finish reason in one chunk
        if let Some(reason) = choice.get("finish_reason").and_then(|f| f.as_str()) {
            events.push(SseEvent::Finish {
                reason: parse_finish_reason(reason),
            });
        }

        events
    }
}
