//! Provider abstraction layer for the resume optimizer.
//!
//! This crate defines the capability interface every AI backend implements
//! (`ProviderClient`), the normalized error taxonomy shared by all of them,
//! and the small value types passed across that seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Identifies an AI backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    /// OpenAI (GPT models).
    OpenAi,
    /// Anthropic (Claude models).
    Anthropic,
    /// Google (Gemini models).
    Gemini,
    /// DeepSeek.
    DeepSeek,
    /// Groq hosted open-weight models.
    Groq,
    /// xAI Grok.
    Grok,
}

impl ProviderId {
    /// All known providers, in a stable order.
    pub const ALL: [Self; 6] =
        [Self::OpenAi, Self::Anthropic, Self::Gemini, Self::DeepSeek, Self::Groq, Self::Grok];

    /// Returns the canonical lowercase identifier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
            Self::DeepSeek => "deepseek",
            Self::Groq => "groq",
            Self::Grok => "grok",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "gemini" | "google" => Ok(Self::Gemini),
            "deepseek" => Ok(Self::DeepSeek),
            "groq" => Ok(Self::Groq),
            "grok" | "xai" => Ok(Self::Grok),
            _ => Err(()),
        }
    }
}

/// Normalized error returned by every provider client.
///
/// Provider-specific failure shapes (HTTP status codes, error bodies,
/// transport errors) are mapped onto these variants so the orchestrator can
/// apply one retry policy regardless of backend.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderError {
    /// Credentials are missing, invalid, or lack permission.
    #[error("Authentication error: {0}")]
    AuthError(String),

    /// The provider throttled the request.
    #[error("Rate limited: {message}")]
    RateLimited {
        /// Provider message.
        message: String,
        /// Seconds the provider asked us to wait, when it said so.
        #[serde(skip_serializing_if = "Option::is_none")]
        retry_after_secs: Option<u64>,
    },

    /// The request was rejected as malformed or unsupported.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The provider could not be reached or reported a server-side failure.
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// No response arrived within the caller's deadline.
    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    /// Anything that does not fit the categories above.
    #[error("Unknown provider error: {0}")]
    Unknown(String),
}

impl ProviderError {
    /// Shorthand for a `RateLimited` error without a retry hint.
    #[must_use]
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::RateLimited { message: message.into(), retry_after_secs: None }
    }

    /// Returns the fieldless kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ProviderErrorKind {
        match self {
            Self::AuthError(_) => ProviderErrorKind::AuthError,
            Self::RateLimited { .. } => ProviderErrorKind::RateLimited,
            Self::InvalidRequest(_) => ProviderErrorKind::InvalidRequest,
            Self::ProviderUnavailable(_) => ProviderErrorKind::ProviderUnavailable,
            Self::Timeout(_) => ProviderErrorKind::Timeout,
            Self::Unknown(_) => ProviderErrorKind::Unknown,
        }
    }

    /// Whether a fresh attempt may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// How long the provider asked callers to wait before retrying.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after_secs: Some(secs), .. } => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }
}

/// Fieldless classification of a [`ProviderError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    /// See [`ProviderError::AuthError`].
    AuthError,
    /// See [`ProviderError::RateLimited`].
    RateLimited,
    /// See [`ProviderError::InvalidRequest`].
    InvalidRequest,
    /// See [`ProviderError::ProviderUnavailable`].
    ProviderUnavailable,
    /// See [`ProviderError::Timeout`].
    Timeout,
    /// See [`ProviderError::Unknown`].
    Unknown,
}

impl ProviderErrorKind {
    /// Transient kinds: throttling, outages and deadlines.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::RateLimited | Self::ProviderUnavailable | Self::Timeout)
    }
}

/// Token accounting for one provider call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Number of tokens in the prompt.
    pub prompt_tokens: u32,
    /// Number of tokens in the completion.
    pub completion_tokens: u32,
}

impl TokenUsage {
    /// Creates a usage record.
    #[must_use]
    pub const fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self { prompt_tokens, completion_tokens }
    }

    /// Prompt plus completion tokens.
    #[must_use]
    pub const fn total(&self) -> u32 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }
}

/// Text generated by a provider together with its token usage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    /// The generated content.
    pub text: String,
    /// Token usage reported (or estimated) for the call.
    pub usage: TokenUsage,
    /// Optional: the upstream model that actually served the request.
    pub model_id: Option<String>,
}

/// Capability interface over one AI backend.
///
/// Implementations perform exactly one network call per `invoke` and never
/// retry; retry policy belongs to the caller.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Returns which backend this client talks to.
    fn provider(&self) -> ProviderId;

    /// Generates a completion for `prompt` with the given upstream model.
    ///
    /// # Arguments
    /// * `model_id` - Upstream model name (e.g., "gpt-4-turbo")
    /// * `prompt` - The full prompt text
    /// * `max_tokens` - Upper bound on completion tokens
    ///
    /// # Errors
    /// Returns a normalized `ProviderError` if the call fails.
    async fn invoke(
        &self,
        model_id: &str,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<Completion, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_id_from_str() {
        assert_eq!(ProviderId::from_str("openai"), Ok(ProviderId::OpenAi));
        assert_eq!(ProviderId::from_str("Claude"), Ok(ProviderId::Anthropic));
        assert_eq!(ProviderId::from_str("ANTHROPIC"), Ok(ProviderId::Anthropic));
        assert_eq!(ProviderId::from_str("xai"), Ok(ProviderId::Grok));
        assert_eq!(ProviderId::from_str("groq"), Ok(ProviderId::Groq));
        assert_eq!(ProviderId::from_str("mistral"), Err(()));
    }

    #[test]
    fn test_provider_id_display_roundtrips() {
        for provider in ProviderId::ALL {
            assert_eq!(ProviderId::from_str(&provider.to_string()), Ok(provider));
        }
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(ProviderError::rate_limited("slow down").is_retryable());
        assert!(ProviderError::ProviderUnavailable("503".to_string()).is_retryable());
        assert!(ProviderError::Timeout(1000).is_retryable());
        assert!(!ProviderError::AuthError("bad key".to_string()).is_retryable());
        assert!(!ProviderError::InvalidRequest("too long".to_string()).is_retryable());
        assert!(!ProviderError::Unknown("?".to_string()).is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = ProviderError::Timeout(2500);
        assert_eq!(err.to_string(), "Request timed out after 2500 ms");
        let err = ProviderError::RateLimited {
            message: "quota".to_string(),
            retry_after_secs: Some(3),
        };
        assert_eq!(err.to_string(), "Rate limited: quota");
        assert_eq!(err.kind(), ProviderErrorKind::RateLimited);
    }

    #[test]
    fn test_retry_after_only_from_rate_limit_hint() {
        let err = ProviderError::RateLimited { message: "wait".to_string(), retry_after_secs: Some(12) };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(12)));
        assert_eq!(ProviderError::rate_limited("wait").retry_after(), None);
        assert_eq!(ProviderError::ProviderUnavailable("503".to_string()).retry_after(), None);
    }

    #[test]
    fn test_error_serializes_kind_snake_case() {
        let json = serde_json::to_string(&ProviderErrorKind::ProviderUnavailable).unwrap();
        assert_eq!(json, "\"provider_unavailable\"");
    }

    #[test]
    fn test_token_usage_total_saturates() {
        assert_eq!(TokenUsage::new(10, 5).total(), 15);
        assert_eq!(TokenUsage::new(u32::MAX, 5).total(), u32::MAX);
    }
}
