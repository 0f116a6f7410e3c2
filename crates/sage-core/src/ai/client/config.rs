//! AI Client configuration

use crate::ai::retry::RetryConfig;
use crate::constants;

/// Configuration for the AI client
#[derive(Debug, Clone)]
pub struct AiClientConfig {
    /// Optional endpoint override (defaults to Groq chat/completions)
    pub base_url: Option<String>,
    /// Retry policy for the initial request of each call
    pub retry: RetryConfig,
}

impl Default for AiClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            retry: RetryConfig::none(),
        }
    }
}

impl AiClientConfig {
    /// Get the API URL to use
    pub fn api_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| constants::ai::DEFAULT_API_URL.to_string())
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}
