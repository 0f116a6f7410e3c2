//! Simple (non-streaming) API calls
//!
//! Used by batch generation, where several personas run side by side and
//! incremental output would only interleave.

use serde_json::Value;
use std::time::Instant;
use tracing::{debug, info};

use super::core::AiClient;
use crate::ai::types::{ApiKey, CompletionRequest};
use crate::error::UpstreamError;

impl AiClient {
    /// Make a non-streaming chat completion call and return the text content.
    pub async fn call_simple(
        &self,
        request: &CompletionRequest,
        credentials: &ApiKey,
    ) -> Result<String, UpstreamError> {
        let call_start = Instant::now();
        info!(
            model = %request.model,
            system_chars = request.system.len(),
            user_chars = request.user.len(),
            "Simple API call start"
        );

        let body = request.to_body(false);
        let response = self.send(&body, credentials).await?;
        let json: Value = response.json().await?;

        let text = extract_message_content(&json).ok_or_else(|| {
            debug!("Unexpected completion body: {}", json);
            UpstreamError::Api {
                status: 200,
                message: "response contained no message content".to_string(),
                retry_after: None,
            }
        })?;

        info!(
            chars = text.len(),
            elapsed_ms = call_start.elapsed().as_millis() as u64,
            "Simple API call complete"
        );
        Ok(text)
    }
}

/// Extract `choices[0].message.content` from an OpenAI response body
pub(crate) fn extract_message_content(json: &Value) -> Option<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|arr| arr.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|msg| msg.get("content"))
        .and_then(|t| t.as_str())
        .map(str::to_string)
}
