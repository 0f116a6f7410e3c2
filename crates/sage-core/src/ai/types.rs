//! Request and credential types shared by every completion path

use std::fmt;

use serde::{Deserialize, Serialize};

/// Role of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// One role-tagged chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// A single chat completion: exactly one system message and one user message
/// plus the fixed decoding parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub system: String,
    pub user: String,
    pub max_tokens: usize,
    pub temperature: f32,
}

impl CompletionRequest {
    /// The two messages in wire order
    pub fn messages(&self) -> [ChatMessage; 2] {
        [
            ChatMessage {
                role: Role::System,
                content: self.system.clone(),
            },
            ChatMessage {
                role: Role::User,
                content: self.user.clone(),
            },
        ]
    }

    /// OpenAI chat/completions request body
    pub fn to_body(&self, stream: bool) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": self.messages(),
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "stream": stream,
        })
    }
}

/// Opaque API key, passed per call. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Read the key from an environment variable, ignoring blank values
    pub fn from_env(var: &str) -> Option<Self> {
        std::env::var(var)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .map(Self)
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(****)")
    }
}
