//! SSE parser implementations for completion providers

mod openai;

pub use openai::OpenAIParser;
