//! Application constants and configuration defaults
//!
//! Centralized location for magic numbers and default values

use std::time::Duration;

/// HTTP client configuration
pub mod http {
    use super::*;

    /// Connection timeout for HTTP requests
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Whole-request ceiling for the HTTP client. Per-stage timeouts are
    /// enforced by the orchestrator and are normally much shorter.
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

    /// User agent sent with every completion request
    pub const USER_AGENT: &str = "Sage/0.1";
}

/// AI/LLM configuration
pub mod ai {
    /// Default chat completions endpoint (Groq, OpenAI-compatible)
    pub const DEFAULT_API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

    /// Default model ID
    pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";

    /// Maximum output tokens per stage
    pub const MAX_OUTPUT_TOKENS: usize = 1024;

    /// Sampling temperature for both stages
    pub const TEMPERATURE: f32 = 0.7;

    /// Environment variable holding the API key
    pub const API_KEY_ENV: &str = "GROQ_API_KEY";
}

/// Pipeline configuration
pub mod pipeline {
    use super::*;

    /// Default timeout applied to each stage independently
    pub const STAGE_TIMEOUT: Duration = Duration::from_secs(120);

    /// Maximum personas evaluated at once in comparison mode
    pub const MAX_PARALLEL_PERSONAS: usize = 3;

    /// Number of history entries shown by default
    pub const RECENT_HISTORY: usize = 5;
}

/// Paths configuration
pub mod paths {
    /// Config directory name
    pub const CONFIG_DIR_NAME: &str = ".sage";

    /// Config file name inside the config directory
    pub const CONFIG_FILE_NAME: &str = "config.toml";

    /// Log subdirectory name
    pub const LOGS_DIR_NAME: &str = "logs";
}
