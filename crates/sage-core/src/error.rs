//! Error types for the Sage core
//!
//! Upstream failures travel on their own channel. Nothing in this crate ever
//! returns error text as if it were model output.

use std::time::Duration;

use thiserror::Error;

use crate::ai::retry::{is_retryable_status, IsRetryable};
use crate::pipeline::Stage;

/// Failure of a single completion call
#[derive(Debug, Clone, Error, PartialEq)]
pub enum UpstreamError {
    /// Connection, DNS, TLS or body read failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Rejected credentials (HTTP 401/403)
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Any other non-success HTTP status
    #[error("API error {status}: {message}")]
    Api {
        status: u16,
        message: String,
        retry_after: Option<Duration>,
    },

    /// The stream broke after it started delivering text
    #[error("stream error: {0}")]
    Stream(String),

    /// The stage did not finish within its time budget
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The caller cancelled the call
    #[error("cancelled")]
    Cancelled,

    /// No API key was supplied
    #[error("no API key configured")]
    MissingCredentials,
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        UpstreamError::Transport(err.to_string())
    }
}

impl IsRetryable for UpstreamError {
    fn is_retryable(&self) -> bool {
        match self {
            UpstreamError::Transport(_) => true,
            UpstreamError::Api { status, .. } => is_retryable_status(*status),
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            UpstreamError::Api { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Failure of a two-stage generation
#[derive(Debug, Clone, Error)]
pub enum CotError {
    /// Blank or whitespace-only question, rejected before any API call
    #[error("question must not be empty")]
    EmptyQuestion,

    /// Persona key not present in the registry
    #[error("unknown persona: {0}")]
    UnknownPersona(String),

    /// A completion call failed. Stage 2 failures keep the finished
    /// reasoning chain.
    #[error("{stage} failed: {source}")]
    Upstream {
        stage: Stage,
        reasoning_chain: Option<String>,
        #[source]
        source: UpstreamError,
    },

    /// A comparison task ended without producing a result
    #[error("generation task aborted: {0}")]
    Aborted(String),
}

impl CotError {
    /// Stage that failed, if the failure came from upstream
    pub fn stage(&self) -> Option<Stage> {
        match self {
            CotError::Upstream { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Reasoning chain completed before the failure, if any
    pub fn reasoning_chain(&self) -> Option<&str> {
        match self {
            CotError::Upstream {
                reasoning_chain, ..
            } => reasoning_chain.as_deref(),
            _ => None,
        }
    }

    /// Underlying upstream error, if any
    pub fn upstream(&self) -> Option<&UpstreamError> {
        match self {
            CotError::Upstream { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Invalid persona data
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read persona file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse persona table: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("duplicate persona key: {0}")]
    DuplicateKey(String),

    #[error("persona {key:?} has an empty {field}")]
    EmptyField { key: String, field: &'static str },

    #[error("persona table defines no personas")]
    Empty,
}

/// Invalid configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
