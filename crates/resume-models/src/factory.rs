//! Provider factory for creating clients from configuration.
//!
//! This module builds `ProviderClient` instances, loading API keys from
//! environment variables when they are not supplied explicitly.

use crate::{ClaudeClient, GeminiClient, OpenAiCompatibleClient, claude, gemini};
use resume_abstraction::{ProviderClient, ProviderError, ProviderId};
use std::env;
use std::sync::Arc;
use tracing::{debug, error};

/// Conventional environment variable holding each provider's API key.
#[must_use]
pub const fn default_api_key_env(provider: ProviderId) -> &'static str {
    match provider {
        ProviderId::OpenAi => "OPENAI_API_KEY",
        ProviderId::Anthropic => "ANTHROPIC_API_KEY",
        ProviderId::Gemini => "GEMINI_API_KEY",
        ProviderId::DeepSeek => "DEEPSEEK_API_KEY",
        ProviderId::Groq => "GROQ_API_KEY",
        ProviderId::Grok => "XAI_API_KEY",
    }
}

/// Provider client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// The backend to create a client for.
    pub provider: ProviderId,
    /// Optional API key (if not provided, will be loaded from environment).
    pub api_key: Option<String>,
    /// Optional name of the environment variable to read the key from.
    pub api_key_env: Option<String>,
    /// Optional base URL override.
    pub base_url: Option<String>,
}

impl ProviderConfig {
    /// Creates a configuration with defaults for `provider`.
    #[must_use]
    pub const fn new(provider: ProviderId) -> Self {
        Self { provider, api_key: None, api_key_env: None, base_url: None }
    }

    /// Sets the API key for this configuration.
    #[must_use]
    pub fn with_api_key(mut self, api_key: String) -> Self {
        self.api_key = Some(api_key);
        self
    }

    /// Reads the API key from `var` instead of the conventional variable.
    #[must_use]
    pub fn with_api_key_env(mut self, var: String) -> Self {
        self.api_key_env = Some(var);
        self
    }

    /// Sets the base URL for this configuration.
    #[must_use]
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = Some(base_url);
        self
    }

    fn resolve_api_key(&self) -> Result<String, ProviderError> {
        if let Some(key) = &self.api_key {
            return Ok(key.clone());
        }
        let var = self.api_key_env.as_deref().unwrap_or(default_api_key_env(self.provider));
        env::var(var).map_err(|_| {
            error!(provider = %self.provider, env = %var, "API key not configured");
            ProviderError::AuthError(format!("{var} environment variable not set"))
        })
    }
}

/// Factory for creating provider clients.
pub struct ProviderFactory;

impl ProviderFactory {
    /// Creates a provider client from the given configuration.
    ///
    /// # Errors
    /// Returns `ProviderError::AuthError` if no API key can be found.
    pub fn create(config: &ProviderConfig) -> Result<Arc<dyn ProviderClient>, ProviderError> {
        debug!(provider = %config.provider, base_url = ?config.base_url, "Creating provider client");

        let api_key = config.resolve_api_key()?;
        let client: Arc<dyn ProviderClient> = match config.provider {
            ProviderId::Anthropic => {
                let base_url = config.base_url.as_deref().unwrap_or(claude::DEFAULT_BASE_URL);
                Arc::new(ClaudeClient::with_base_url(api_key, base_url))
            }
            ProviderId::Gemini => {
                let base_url = config.base_url.as_deref().unwrap_or(gemini::DEFAULT_BASE_URL);
                Arc::new(GeminiClient::with_base_url(api_key, base_url))
            }
            provider @ (ProviderId::OpenAi
            | ProviderId::DeepSeek
            | ProviderId::Groq
            | ProviderId::Grok) => {
                let base_url = config
                    .base_url
                    .as_deref()
                    .or_else(|| OpenAiCompatibleClient::default_base_url(provider))
                    .unwrap_or_default()
                    .to_string();
                Arc::new(OpenAiCompatibleClient::new(provider, api_key, base_url))
            }
        };
        Ok(client)
    }
}
