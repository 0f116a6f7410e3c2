//! AI provider layer
//!
//! Handles communication with OpenAI-compatible chat completion endpoints
//! (Groq by default), in whole-response and streaming modes.

pub mod backend;
pub mod client;
pub mod parsers;
pub mod retry;
pub mod sse;
pub mod streaming;
pub mod types;

pub use backend::CompletionBackend;
pub use client::{AiClient, AiClientConfig};
pub use streaming::{FinishReason, StreamPart};
pub use types::{ApiKey, ChatMessage, CompletionRequest, Role};
