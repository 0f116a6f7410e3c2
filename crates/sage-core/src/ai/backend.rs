//! Completion backend seam
//!
//! The orchestrator only talks to this trait. `AiClient` implements it over
//! HTTP; tests plug in scripted doubles.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::streaming::StreamPart;
use super::types::{ApiKey, CompletionRequest};
use crate::error::UpstreamError;

#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Run a completion to the end and return the full text.
    async fn complete(
        &self,
        request: &CompletionRequest,
        credentials: &ApiKey,
    ) -> Result<String, UpstreamError>;

    /// Start a streaming completion.
    ///
    /// Failures before the first byte are returned as `Err`. Failures after
    /// that arrive as a single terminal [`StreamPart::Error`].
    async fn complete_streaming(
        &self,
        request: &CompletionRequest,
        credentials: &ApiKey,
    ) -> Result<mpsc::UnboundedReceiver<StreamPart>, UpstreamError>;
}
