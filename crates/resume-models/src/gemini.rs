//! Gemini (Google) client using the `generateContent` REST endpoint.

use async_trait::async_trait;
use reqwest::Client;
use resume_abstraction::{Completion, ProviderClient, ProviderError, ProviderId, TokenUsage};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::http;

/// Default Gemini API base URL.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini client.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    api_key: String,
    base_url: String,
    client: Client,
}

impl GeminiClient {
    /// Creates a client against the public Gemini endpoint.
    #[must_use]
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Creates a client against a custom endpoint.
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
impl ProviderClient for GeminiClient {
    fn provider(&self) -> ProviderId {
        ProviderId::Gemini
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
            "GeminiClient generating content"
        );

        let url = format!("{}/models/{}:generateContent", self.base_url, model_id);
        let request_body = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts: vec![GeminiPart { text: Some(prompt.to_string()) }],
            }],
            generation_config: GeminiGenerationConfig { max_output_tokens: max_tokens },
        };

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request_body)
            .send()
            .await
            .map_err(|e| http::classify_transport(ProviderId::Gemini, &e))?;

        if !response.status().is_success() {
            return Err(http::error_from_response(ProviderId::Gemini, response).await);
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            error!(error = %e, "Failed to parse Gemini API response");
            ProviderError::Unknown(format!("Failed to parse response: {e}"))
        })?;

        let text = gemini_response
            .candidates
            .unwrap_or_default()
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content.parts.into_iter().filter_map(|part| part.text).collect::<String>()
            })
            .unwrap_or_default();

        let usage = gemini_response.usage_metadata.map_or_else(
            || {
                debug!("Gemini response carried no usageMetadata; estimating from text");
                crate::estimated_usage(prompt, &text)
            },
            |meta| TokenUsage::new(meta.prompt_token_count, meta.candidates_token_count),
        );

        Ok(Completion { text, usage, model_id: gemini_response.model_version })
    }
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<GeminiUsageMetadata>,
    #[serde(rename = "modelVersion")]
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiUsageMetadata {
    #[serde(rename = "promptTokenCount", default)]
    prompt_token_count: u32,
    #[serde(rename = "candidatesTokenCount", default)]
    candidates_token_count: u32,
}
