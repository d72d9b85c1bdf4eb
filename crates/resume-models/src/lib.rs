//! Provider client implementations for the resume optimizer.
//!
//! This crate provides concrete implementations of the `ProviderClient` trait.
//!
//! # Supported Providers
//!
//! - **OpenAI-compatible**: OpenAI, DeepSeek, Groq and xAI Grok (API key required)
//! - **Claude**: Anthropic's Claude models (API key required)
//! - **Gemini**: Google's Gemini models (API key required)
//! - **Mock**: Scripted responses for testing and offline runs

pub mod claude;
pub mod factory;
pub mod gemini;
mod http;
pub mod mock;
pub mod openai;

pub use claude::ClaudeClient;
pub use factory::{ProviderConfig, ProviderFactory, default_api_key_env};
pub use gemini::GeminiClient;
pub use mock::{MockCall, MockOutcome, MockProvider};
pub use openai::OpenAiCompatibleClient;

/// Count tokens in a string (simplified: word count).
///
/// Used only where a backend does not report usage.
#[must_use]
pub fn count_tokens(text: &str) -> u32 {
    u32::try_from(text.split_whitespace().count()).unwrap_or(u32::MAX)
}

/// Usage estimated from word counts, for responses that omit a usage block.
pub(crate) fn estimated_usage(prompt: &str, completion: &str) -> resume_abstraction::TokenUsage {
    resume_abstraction::TokenUsage::new(count_tokens(prompt), count_tokens(completion))
}
