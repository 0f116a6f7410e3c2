//! Core AI Client
//!
//! The AiClient struct that handles HTTP communication with an
//! OpenAI-compatible chat/completions endpoint.

use reqwest::Client;
use serde_json::Value;
use tracing::{error, info};

use super::config::AiClientConfig;
use crate::ai::retry::parse_retry_after;
use crate::ai::types::ApiKey;
use crate::constants;
use crate::error::UpstreamError;

/// AI API client. Credentials are supplied per call, never stored.
pub struct AiClient {
    http: Client,
    config: AiClientConfig,
}

impl AiClient {
    /// Create the HTTP client with configuration suited to SSE streaming
    fn create_http_client() -> Client {
        Client::builder()
            .user_agent(constants::http::USER_AGENT)
            .connect_timeout(constants::http::CONNECT_TIMEOUT)
            .timeout(constants::http::REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                error!("Failed to build HTTP client: {}. Using default client.", e);
                Client::new()
            })
    }

    pub fn new(config: AiClientConfig) -> Self {
        Self {
            http: Self::create_http_client(),
            config,
        }
    }

    /// Get the current configuration
    pub fn config(&self) -> &AiClientConfig {
        &self.config
    }

    /// Build a POST request with bearer authentication
    pub(crate) fn build_request(
        &self,
        credentials: &ApiKey,
    ) -> Result<reqwest::RequestBuilder, UpstreamError> {
        if credentials.is_empty() {
            return Err(UpstreamError::MissingCredentials);
        }

        Ok(self
            .http
            .post(self.config.api_url())
            .header("authorization", format!("Bearer {}", credentials.expose()))
            .header("content-type", "application/json"))
    }

    /// Send a JSON body, retrying the initial request per the retry policy
    pub(crate) async fn send(
        &self,
        body: &Value,
        credentials: &ApiKey,
    ) -> Result<reqwest::Response, UpstreamError> {
        crate::ai::retry::with_retry(&self.config.retry, || async move {
            let response = self.build_request(credentials)?.json(body).send().await?;
            self.handle_error_response(response).await
        })
        .await
    }

    /// Map a non-success response to an `UpstreamError`
    pub(crate) async fn handle_error_response(
        &self,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, UpstreamError> {
        let status = response.status();
        if status.is_success() {
            info!("API response: {}", status);
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let error_text = response.text().await.unwrap_or_default();
        error!("API error response: {} - {}", status, error_text);

        Err(map_http_error(status.as_u16(), &error_text, retry_after))
    }
}

/// Pull `error.message` out of an OpenAI-style error body, or fall back to
/// the raw body.
pub(crate) fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| {
            json.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

/// Map an HTTP status and body to an `UpstreamError`
pub(crate) fn map_http_error(
    status: u16,
    body: &str,
    retry_after: Option<std::time::Duration>,
) -> UpstreamError {
    let message = extract_error_message(body);
    match status {
        401 | 403 => UpstreamError::Authentication(message),
        _ => UpstreamError::Api {
            status,
            message,
            retry_after,
        },
    }
}
