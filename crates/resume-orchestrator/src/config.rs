//! TOML configuration for the pipeline engine.
//!
//! ```toml
//! [retry]
//! max_retries = 2
//! initial_backoff_ms = 500
//!
//! [execution]
//! step_timeout_secs = 60
//! max_concurrent_provider_calls = 8
//!
//! [providers.groq]
//! api_key_env = "MY_GROQ_KEY"
//!
//! [models.grok-2]
//! enabled = false
//! ```

use resume_abstraction::ProviderId;
use resume_models::{ProviderConfig, ProviderFactory};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::catalog::StrategyCatalog;
use crate::estimator::{CostEstimator, DEFAULT_ASSUMED_TOKENS_PER_STEP};
use crate::executor::{DEFAULT_MAX_TOKENS, StepExecutor};
use crate::gateway::ProviderGateway;
use crate::orchestrator::PipelineOrchestrator;
use crate::registry::ModelRegistry;
use crate::retry::RetryPolicy;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error reading the file.
    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("Failed to parse TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error.
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Engine configuration loaded from TOML.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Step retry settings.
    pub retry: RetrySettings,
    /// Per-call limits.
    pub execution: ExecutionSettings,
    /// Estimator assumptions.
    pub estimator: EstimatorSettings,
    /// Provider credentials and endpoints, keyed by provider id.
    pub providers: BTreeMap<String, ProviderSettings>,
    /// Overrides for built-in model profiles, keyed by model id.
    pub models: BTreeMap<String, ModelOverride>,
}

/// `[retry]` section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_backoff_ms: u64,
    /// Growth factor between retries.
    pub backoff_multiplier: f64,
    /// Cap on any single delay.
    pub max_backoff_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self { max_retries: 2, initial_backoff_ms: 500, backoff_multiplier: 2.0, max_backoff_ms: 8000 }
    }
}

/// `[execution]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExecutionSettings {
    /// Deadline for each provider call.
    pub step_timeout_secs: u64,
    /// Default completion budget per step.
    pub max_tokens: u32,
    /// Global bound on in-flight provider calls.
    pub max_concurrent_provider_calls: Option<usize>,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self { step_timeout_secs: 60, max_tokens: DEFAULT_MAX_TOKENS, max_concurrent_provider_calls: None }
    }
}

/// `[estimator]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EstimatorSettings {
    /// Tokens assumed per step when projecting cost.
    pub assumed_tokens_per_step: u32,
}

impl Default for EstimatorSettings {
    fn default() -> Self {
        Self { assumed_tokens_per_step: DEFAULT_ASSUMED_TOKENS_PER_STEP }
    }
}

/// `[providers.<id>]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Inline API key.
    pub api_key: Option<String>,
    /// Environment variable holding the key.
    pub api_key_env: Option<String>,
    /// Endpoint override.
    pub base_url: Option<String>,
}

/// `[models.<id>]` section.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ModelOverride {
    /// Enable or disable the model.
    pub enabled: Option<bool>,
    /// Upstream model name.
    pub upstream_model: Option<String>,
    /// USD per 1,000 tokens.
    pub cost_per_1k_tokens: Option<f64>,
    /// Typical seconds per call.
    pub avg_latency_secs: Option<f64>,
}

impl PipelineConfig {
    /// Retry policy described by `[retry]`.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_retries,
            Duration::from_millis(self.retry.initial_backoff_ms),
            Duration::from_millis(self.retry.max_backoff_ms),
            self.retry.backoff_multiplier,
        )
    }

    /// Estimator described by `[estimator]`.
    #[must_use]
    pub const fn estimator(&self) -> CostEstimator {
        CostEstimator::new(self.estimator.assumed_tokens_per_step)
    }

    /// Built-in model registry with `[models.*]` overrides applied.
    ///
    /// # Errors
    /// Returns `ConfigError::Validation` when an override names an unknown model.
    pub fn model_registry(&self) -> Result<ModelRegistry> {
        let mut registry = ModelRegistry::builtin();
        for (id, model) in &self.models {
            let mut profile = registry
                .get(id)
                .cloned()
                .ok_or_else(|| ConfigError::Validation(format!("Unknown model in [models]: '{id}'")))?;
            if let Some(enabled) = model.enabled {
                profile.enabled = enabled;
            }
            if let Some(upstream) = &model.upstream_model {
                profile.upstream_model.clone_from(upstream);
            }
            if let Some(rate) = model.cost_per_1k_tokens {
                profile.cost_per_1k_tokens = rate;
            }
            if let Some(latency) = model.avg_latency_secs {
                profile.avg_latency_secs = latency;
            }
            registry.register(profile);
        }
        Ok(registry)
    }

    /// Client settings for `provider`, from `[providers.<id>]` if present.
    #[must_use]
    pub fn provider_config(&self, provider: ProviderId) -> ProviderConfig {
        let settings = self
            .providers
            .iter()
            .find(|(key, _)| ProviderId::from_str(key) == Ok(provider))
            .map(|(_, settings)| settings.clone())
            .unwrap_or_default();

        let mut config = ProviderConfig::new(provider);
        config.api_key = settings.api_key;
        config.api_key_env = settings.api_key_env;
        config.base_url = settings.base_url;
        config
    }

    /// Creates a gateway with a client for every provider whose key resolves.
    ///
    /// Providers without a key are left out; strategies that need them fail
    /// pre-flight with `ProviderNotConfigured`.
    #[must_use]
    pub fn build_gateway(&self) -> ProviderGateway {
        let mut gateway = ProviderGateway::new();
        for provider in ProviderId::ALL {
            match ProviderFactory::create(&self.provider_config(provider)) {
                Ok(client) => gateway.register(client),
                Err(err) => debug!(provider = %provider, error = %err, "Provider not configured"),
            }
        }
        match self.execution.max_concurrent_provider_calls {
            Some(limit) => gateway.with_max_concurrent_calls(limit),
            None => gateway,
        }
    }

    /// Assembles an orchestrator over `gateway` using this configuration.
    ///
    /// # Errors
    /// Returns `ConfigError::Validation` when a model override is invalid.
    pub fn build_orchestrator(&self, gateway: ProviderGateway) -> Result<PipelineOrchestrator> {
        let registry = self.model_registry()?;
        let executor = StepExecutor::new(gateway, Arc::new(registry))
            .with_max_tokens(self.execution.max_tokens)
            .with_timeout(Duration::from_secs(self.execution.step_timeout_secs));

        let providers: Vec<String> = executor.gateway().providers().map(|p| p.to_string()).collect();
        info!(providers = ?providers, "Pipeline engine configured");

        Ok(PipelineOrchestrator::new(StrategyCatalog::builtin(), executor)
            .with_retry_policy(self.retry_policy())
            .with_estimator(self.estimator()))
    }
}

/// Configuration loader for pipeline settings.
pub struct PipelineConfigLoader;

impl PipelineConfigLoader {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read, parsed or validated.
    pub fn load(path: &Path) -> Result<PipelineConfig> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parses and validates TOML text.
    ///
    /// # Errors
    /// Returns error if the text cannot be parsed or validated.
    pub fn parse(content: &str) -> Result<PipelineConfig> {
        let config: PipelineConfig = toml::from_str(content)?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// Validates pipeline configuration.
    ///
    /// # Errors
    /// Returns error if configuration is invalid.
    pub fn validate(config: &PipelineConfig) -> Result<()> {
        if config.retry.backoff_multiplier < 1.0 {
            return Err(ConfigError::Validation(format!(
                "backoff_multiplier must be >= 1.0, got {}",
                config.retry.backoff_multiplier
            )));
        }
        if config.retry.initial_backoff_ms > config.retry.max_backoff_ms {
            return Err(ConfigError::Validation(format!(
                "initial_backoff_ms ({}) must be <= max_backoff_ms ({})",
                config.retry.initial_backoff_ms, config.retry.max_backoff_ms
            )));
        }
        if config.execution.step_timeout_secs == 0 {
            return Err(ConfigError::Validation("step_timeout_secs must be greater than 0".to_string()));
        }
        if config.execution.max_tokens == 0 {
            return Err(ConfigError::Validation("max_tokens must be greater than 0".to_string()));
        }
        if config.execution.max_concurrent_provider_calls == Some(0) {
            return Err(ConfigError::Validation(
                "max_concurrent_provider_calls must be greater than 0".to_string(),
            ));
        }
        if config.estimator.assumed_tokens_per_step == 0 {
            return Err(ConfigError::Validation("assumed_tokens_per_step must be greater than 0".to_string()));
        }

        for key in config.providers.keys() {
            if ProviderId::from_str(key).is_err() {
                return Err(ConfigError::Validation(format!(
                    "Unknown provider '{key}'. Valid providers: openai, anthropic, gemini, deepseek, groq, grok"
                )));
            }
        }

        for (id, model) in &config.models {
            if model.cost_per_1k_tokens.is_some_and(|rate| rate < 0.0) {
                return Err(ConfigError::Validation(format!("Model '{id}': cost_per_1k_tokens must be >= 0")));
            }
            if model.avg_latency_secs.is_some_and(|secs| secs < 0.0) {
                return Err(ConfigError::Validation(format!("Model '{id}': avg_latency_secs must be >= 0")));
            }
        }
        config.model_registry()?;

        Ok(())
    }
}
