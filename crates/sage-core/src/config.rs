//! User configuration
//!
//! Read from `~/.sage/config.toml`. Every field is optional; anything left
//! out falls back to the defaults in `constants`. The `GROQ_API_KEY`
//! environment variable wins over a key stored in the file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ai::retry::RetryConfig;
use crate::ai::{AiClientConfig, ApiKey};
use crate::constants;
use crate::error::ConfigError;
use crate::paths;
use crate::pipeline::CotOptions;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SageConfig {
    /// API key, used when the environment variable is unset
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<usize>,
    pub temperature: Option<f32>,
    /// Chat completions endpoint override
    pub base_url: Option<String>,
    /// Per-stage timeout; 0 disables it
    pub stage_timeout_secs: Option<u64>,
    /// Automatic retries of the initial request
    pub max_retries: Option<u32>,
    /// Persona table replacing the built-in thinkers
    pub personas_file: Option<PathBuf>,
}

impl SageConfig {
    /// Load the default config file, or defaults if it does not exist
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path(&paths::config_file())
    }

    /// Load from a specific path, or defaults if it does not exist
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)?;
        let config: SageConfig = toml::from_str(&contents)?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Credentials from the environment, falling back to the file
    pub fn credentials(&self) -> Option<ApiKey> {
        self.credentials_with(ApiKey::from_env(constants::ai::API_KEY_ENV))
    }

    fn credentials_with(&self, from_env: Option<ApiKey>) -> Option<ApiKey> {
        from_env.or_else(|| {
            self.api_key
                .as_deref()
                .map(ApiKey::new)
                .filter(|key| !key.is_empty())
        })
    }

    pub fn stage_timeout(&self) -> Option<Duration> {
        match self.stage_timeout_secs {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => Some(constants::pipeline::STAGE_TIMEOUT),
        }
    }

    pub fn cot_options(&self) -> CotOptions {
        let defaults = CotOptions::default();
        CotOptions {
            model: self.model.clone().unwrap_or(defaults.model),
            max_tokens: self.max_tokens.unwrap_or(defaults.max_tokens),
            temperature: self.temperature.unwrap_or(defaults.temperature),
            stage_timeout: self.stage_timeout(),
            max_parallel: defaults.max_parallel,
        }
    }

    pub fn client_config(&self) -> AiClientConfig {
        let retry = match self.max_retries {
            Some(n) if n > 0 => RetryConfig::with_max_retries(n),
            _ => RetryConfig::none(),
        };
        let config = AiClientConfig::default().with_retry(retry);
        match &self.base_url {
            Some(url) => config.with_base_url(url.clone()),
            None => config,
        }
    }
}
