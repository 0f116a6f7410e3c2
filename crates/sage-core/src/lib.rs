//! Sage Core - persona-conditioned two-stage advice generation
//!
//! This crate provides:
//! - An OpenAI-compatible completion client (whole-response and SSE streaming)
//! - The persona registry and quote library
//! - The chain-of-thought pipeline: reasoning chain first, advice second
//! - User configuration and a caller-owned generation log

pub mod ai;
pub mod config;
pub mod constants;
pub mod error;
pub mod paths;
pub mod persona;
pub mod pipeline;

// Re-exports for convenience
pub use ai::{AiClient, AiClientConfig, ApiKey, CompletionBackend, StreamPart};
pub use config::SageConfig;
pub use error::{ConfigError, CotError, RegistryError, UpstreamError};
pub use persona::{pick_quote, Persona, PersonaRegistry, Quote};
pub use pipeline::{
    Cancellation, CotOptions, CotOrchestrator, GenerationLog, GenerationRequest,
    GenerationResult, HistoryEntry, HistorySubject, Stage,
};
