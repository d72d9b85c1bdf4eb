//! Model registry.
//!
//! Maps the model ids used by strategies (e.g. `groq-mixtral-8x7b`) to the
//! provider that serves them, the upstream model name sent on the wire, and
//! the pricing and latency figures the estimator works from.

use resume_abstraction::ProviderId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::error::{PipelineError, Result};

/// Everything the engine knows about one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelProfile {
    /// Catalog id referenced by strategy steps.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Backend serving the model.
    pub provider: ProviderId,
    /// Model name sent to the provider.
    pub upstream_model: String,
    /// Blended USD cost per 1,000 tokens (prompt + completion).
    pub cost_per_1k_tokens: f64,
    /// Typical wall-clock seconds for one resume-sized call.
    pub avg_latency_secs: f64,
    /// Disabled models are rejected at pre-flight.
    pub enabled: bool,
}

impl ModelProfile {
    /// Creates an enabled profile.
    #[must_use]
    pub fn new(
        id: &str,
        name: &str,
        provider: ProviderId,
        upstream_model: &str,
        cost_per_1k_tokens: f64,
        avg_latency_secs: f64,
    ) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            provider,
            upstream_model: upstream_model.to_string(),
            cost_per_1k_tokens,
            avg_latency_secs,
            enabled: true,
        }
    }

    /// USD cost of `tokens` tokens at this model's rate.
    #[must_use]
    pub fn cost_for_tokens(&self, tokens: u32) -> f64 {
        f64::from(tokens) / 1000.0 * self.cost_per_1k_tokens
    }
}

/// Registry of known models, in registration order.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: Vec<ModelProfile>,
    index: HashMap<String, usize>,
}

impl ModelRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The models referenced by the built-in strategy catalog, plus Grok.
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for profile in [
            ModelProfile::new("groq-mixtral-8x7b", "Mixtral 8x7B (Groq)", ProviderId::Groq, "mixtral-8x7b-32768", 0.0007, 7.0),
            ModelProfile::new("deepseek-chat", "DeepSeek Chat", ProviderId::DeepSeek, "deepseek-chat", 0.0033, 13.0),
            ModelProfile::new("gpt-4-turbo", "GPT-4 Turbo", ProviderId::OpenAi, "gpt-4-turbo", 0.02, 20.0),
            ModelProfile::new("claude-sonnet-4", "Claude Sonnet 4", ProviderId::Anthropic, "claude-sonnet-4-20250514", 0.018, 18.0),
            ModelProfile::new("claude-opus-4", "Claude Opus 4", ProviderId::Anthropic, "claude-opus-4-20250514", 0.075, 30.0),
            ModelProfile::new("gemini-pro", "Gemini Pro", ProviderId::Gemini, "gemini-1.5-pro", 0.005, 15.0),
            ModelProfile::new("grok-2", "Grok 2", ProviderId::Grok, "grok-2-latest", 0.01, 16.0),
        ] {
            registry.register(profile);
        }
        registry
    }

    /// Adds a profile, replacing any existing profile with the same id.
    pub fn register(&mut self, profile: ModelProfile) {
        debug!(model_id = %profile.id, provider = %profile.provider, "Registering model");
        if let Some(&slot) = self.index.get(&profile.id) {
            self.models[slot] = profile;
        } else {
            self.index.insert(profile.id.clone(), self.models.len());
            self.models.push(profile);
        }
    }

    /// Looks up a profile by catalog id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ModelProfile> {
        self.index.get(id).map(|&slot| &self.models[slot])
    }

    /// Looks up an enabled profile.
    ///
    /// # Errors
    /// Returns `PipelineError::UnknownModel` if the id is unregistered or disabled.
    pub fn require(&self, id: &str) -> Result<&ModelProfile> {
        self.get(id)
            .filter(|profile| profile.enabled)
            .ok_or_else(|| PipelineError::UnknownModel(id.to_string()))
    }

    /// All profiles in registration order.
    pub fn list(&self) -> &[ModelProfile] {
        &self.models
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup() {
        let registry = ModelRegistry::builtin();
        let groq = registry.require("groq-mixtral-8x7b").unwrap();
        assert_eq!(groq.provider, ProviderId::Groq);
        assert_eq!(groq.upstream_model, "mixtral-8x7b-32768");
        assert_eq!(registry.list().len(), 7);
    }

    #[test]
    fn test_require_unknown_and_disabled() {
        let mut registry = ModelRegistry::builtin();
        assert_eq!(
            registry.require("llama-99").unwrap_err(),
            PipelineError::UnknownModel("llama-99".to_string())
        );

        let mut grok = registry.get("grok-2").cloned().unwrap();
        grok.enabled = false;
        registry.register(grok);
        assert!(registry.get("grok-2").is_some());
        assert!(registry.require("grok-2").is_err());
        assert_eq!(registry.list().len(), 7);
    }

    #[test]
    fn test_cost_for_tokens() {
        let profile = ModelProfile::new("m", "M", ProviderId::OpenAi, "m", 0.02, 1.0);
        assert!((profile.cost_for_tokens(1500) - 0.03).abs() < 1e-12);
        assert_eq!(profile.cost_for_tokens(0), 0.0);
    }
}
