//! OpenAI-compatible chat completions client.
//!
//! OpenAI, DeepSeek, Groq and xAI Grok all expose the same
//! `/chat/completions` wire format and bearer-token auth; they differ only in
//! base URL. One client type serves all four.

use async_trait::async_trait;
use reqwest::Client;
use resume_abstraction::{Completion, ProviderClient, ProviderError, ProviderId, TokenUsage};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::http;

/// Client for any backend speaking the OpenAI chat completions protocol.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleClient {
    /// Which backend this instance represents.
    provider: ProviderId,
    /// The API key for authentication.
    api_key: String,
    /// The base URL, without the `/chat/completions` suffix.
    base_url: String,
    /// HTTP client for making requests.
    client: Client,
}

impl OpenAiCompatibleClient {
    /// Creates a client for `provider` at `base_url`.
    #[must_use]
    pub fn new(provider: ProviderId, api_key: String, base_url: impl Into<String>) -> Self {
        Self {
            provider,
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    /// Default base URL for providers that speak this protocol.
    ///
    /// Returns `None` for providers with their own wire format.
    #[must_use]
    pub const fn default_base_url(provider: ProviderId) -> Option<&'static str> {
        match provider {
            ProviderId::OpenAi => Some("https://api.openai.com/v1"),
            ProviderId::DeepSeek => Some("https://api.deepseek.com/v1"),
            ProviderId::Groq => Some("https://api.groq.com/openai/v1"),
            ProviderId::Grok => Some("https://api.x.ai/v1"),
            ProviderId::Anthropic | ProviderId::Gemini => None,
        }
    }
}

#[async_trait]
impl ProviderClient for OpenAiCompatibleClient {
    fn provider(&self) -> ProviderId {
        self.provider
    }

    async fn invoke(
        &self,
        model_id: &str,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<Completion, ProviderError> {
        debug!(
            provider = %self.provider,
            model_id = %model_id,
            prompt_len = prompt.len(),
            max_tokens,
            "Invoking chat completion"
        );

        let url = format!("{}/chat/completions", self.base_url);
        let request_body = ChatRequest {
            model: model_id,
            messages: vec![ChatMessage { role: "user", content: prompt }],
            max_tokens,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| http::classify_transport(self.provider, &e))?;

        if !response.status().is_success() {
            return Err(http::error_from_response(self.provider, response).await);
        }

        let chat_response: ChatResponse = response.json().await.map_err(|e| {
            error!(provider = %self.provider, error = %e, "Failed to parse chat completion response");
            ProviderError::Unknown(format!("Failed to parse response: {e}"))
        })?;

        let text = chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        let usage = chat_response.usage.map_or_else(
            || {
                debug!(provider = %self.provider, "Response carried no usage; estimating from text");
                crate::estimated_usage(prompt, &text)
            },
            |u| TokenUsage::new(u.prompt_tokens, u.completion_tokens),
        );

        Ok(Completion { text, usage, model_id: chat_response.model })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    model: Option<String>,
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_base_urls() {
        assert_eq!(
            OpenAiCompatibleClient::default_base_url(ProviderId::Groq),
            Some("https://api.groq.com/openai/v1")
        );
        assert_eq!(OpenAiCompatibleClient::default_base_url(ProviderId::Anthropic), None);
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client =
            OpenAiCompatibleClient::new(ProviderId::OpenAi, "k".to_string(), "http://x/v1/");
        assert_eq!(client.base_url, "http://x/v1");
    }
}
