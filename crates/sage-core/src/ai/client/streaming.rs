//! Streaming API calls
//!
//! Handles SSE streaming responses from the chat/completions endpoint.

use futures::StreamExt;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::core::AiClient;
use crate::ai::parsers::OpenAIParser;
use crate::ai::sse::SseStreamProcessor;
use crate::ai::streaming::StreamPart;
use crate::ai::types::{ApiKey, CompletionRequest};
use crate::error::UpstreamError;

impl AiClient {
    /// Call the API with streaming response
    ///
    /// Connection and HTTP status failures are returned directly. Once the
    /// response is accepted, text arrives on the receiver and a broken stream
    /// ends with a single `StreamPart::Error`.
    pub async fn call_streaming(
        &self,
        request: &CompletionRequest,
        credentials: &ApiKey,
    ) -> Result<mpsc::UnboundedReceiver<StreamPart>, UpstreamError> {
        let call_start = Instant::now();
        info!("=== API CALL START ===");
        info!(
            "Model: {}, System: {} chars, User: {} chars, Max tokens: {}",
            request.model,
            request.system.len(),
            request.user.len(),
            request.max_tokens
        );

        let body = request.to_body(true);

        info!("Sending API request...");
        let response = self.send(&body, credentials).await?;
        info!("API stream accepted in {:?}", call_start.elapsed());

        let (tx, rx) = mpsc::unbounded_channel::<StreamPart>();
        let mut processor = SseStreamProcessor::new(tx);
        let parser = OpenAIParser::new();

        // Spawn task to process the stream
        let stream = response.bytes_stream();
        tokio::spawn(async move {
            tokio::pin!(stream);
            let mut chunk_count = 0;
            while let Some(chunk) = stream.next().await {
                if processor.is_closed() {
                    info!("Stream consumer dropped after {} chunks", chunk_count);
                    break;
                }
                chunk_count += 1;
                match chunk {
                    Ok(bytes) => {
                        if let Err(detail) = processor.process_chunk(bytes, &parser) {
                            warn!("Stream error at chunk #{}: {}", chunk_count, detail);
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Stream read error at chunk #{}: {}", chunk_count, e);
                        processor.fail(format!("stream read error: {}", e));
                        break;
                    }
                }
            }
            info!("Stream ended after {} chunks", chunk_count);
            // Closing without [DONE] or finish_reason becomes a terminal error here
            processor.finish(&parser);
        });

        Ok(rx)
    }
}
