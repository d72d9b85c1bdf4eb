//! Claude (Anthropic) client.
//!
//! Uses the Messages API with `x-api-key` auth and a pinned
//! `anthropic-version` header.

use async_trait::async_trait;
use reqwest::Client;
use resume_abstraction::{Completion, ProviderClient, ProviderError, ProviderId, TokenUsage};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::http;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Default Anthropic API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";

/// Claude client.
#[derive(Debug, Clone)]
pub struct ClaudeClient {
    /// The API key for authentication.
    api_key: String,
    /// The base URL for the Claude API.
    base_url: String,
    /// HTTP client for making requests.
    client: Client,
}

impl ClaudeClient {
    /// Creates a client against the public Anthropic endpoint.
    #[must_use]
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Creates a client against a custom endpoint (proxies, tests).
    #[must_use]
    pub fn with_base_url(api_key: String, base_url: impl Into<String>) -> Self {
        Self {
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }
}

#[async_trait]
impl ProviderClient for ClaudeClient {
    fn provider(&self) -> ProviderId {
        ProviderId::Anthropic
    }

    async fn invoke(
        &self,
        model_id: &str,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<Completion, ProviderError> {
        debug!(
            model_id = %model_id,
            prompt_len = prompt.len(),
            max_tokens,
            "ClaudeClient invoking messages API"
        );

        let url = format!("{}/messages", self.base_url);
        let request_body = ClaudeRequest {
            model: model_id,
            max_tokens,
            messages: vec![ClaudeMessage { role: "user", content: prompt }],
        };

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| http::classify_transport(ProviderId::Anthropic, &e))?;

        if !response.status().is_success() {
            return Err(http::error_from_response(ProviderId::Anthropic, response).await);
        }

        let claude_response: ClaudeResponse = response.json().await.map_err(|e| {
            error!(error = %e, "Failed to parse Claude API response");
            ProviderError::Unknown(format!("Failed to parse response: {e}"))
        })?;

        // Concatenate every text block; tool-use blocks are not requested.
        let text = claude_response
            .content
            .iter()
            .filter(|block| block.block_type == "text")
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("");

        Ok(Completion {
            text,
            usage: TokenUsage::new(
                claude_response.usage.input_tokens,
                claude_response.usage.output_tokens,
            ),
            model_id: claude_response.model,
        })
    }
}

#[derive(Debug, Serialize)]
struct ClaudeRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ClaudeMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ClaudeMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ClaudeResponse {
    model: Option<String>,
    content: Vec<ContentBlock>,
    usage: ClaudeUsage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClaudeUsage {
    input_tokens: u32,
    output_tokens: u32,
}
