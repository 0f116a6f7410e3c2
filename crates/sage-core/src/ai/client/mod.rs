//! AI Client module
//!
//! HTTP client for OpenAI-compatible chat/completions endpoints, with a
//! simple (whole response) path and an SSE streaming path. Both are exposed
//! to the pipeline through [`CompletionBackend`].

pub mod config;
pub mod core;
pub mod simple;
pub mod streaming;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::ai::backend::CompletionBackend;
use crate::ai::streaming::StreamPart;
use crate::ai::types::{ApiKey, CompletionRequest};
use crate::error::UpstreamError;

// Re-export main types
pub use config::AiClientConfig;
pub use core::AiClient;

#[async_trait]
impl CompletionBackend for AiClient {
    async fn complete(
        &self,
        request: &CompletionRequest,
        credentials: &ApiKey,
    ) -> Result<String, UpstreamError> {
        self.call_simple(request, credentials).await
    }

    async fn complete_streaming(
        &self,
        request: &CompletionRequest,
        credentials: &ApiKey,
    ) -> Result<mpsc::UnboundedReceiver<StreamPart>, UpstreamError> {
        self.call_streaming(request, credentials).await
    }
}
