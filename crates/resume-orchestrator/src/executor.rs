//! Step execution.
//!
//! A [`StepExecutor`] runs exactly one attempt of one step: it renders the
//! role prompt, calls the gateway, validates the reply and prices it. Retry
//! decisions are left to the orchestrator.

use resume_abstraction::{ProviderError, ProviderErrorKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::catalog::{StepRole, StepSpec};
use crate::gateway::{ProviderGateway, ProviderRequest};
use crate::prompts;
use crate::registry::ModelRegistry;

/// Default completion budget per step.
pub const DEFAULT_MAX_TOKENS: u32 = 2048;

/// Default deadline per provider call.
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(60);

/// Output of an earlier non-draft step (analysis, plan, critique).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepNote {
    /// Role that produced the note.
    pub role: StepRole,
    /// Note text.
    pub text: String,
}

/// Everything a step's prompt is built from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StepContext {
    /// Source resume.
    pub resume_text: String,
    /// Target job description.
    pub job_description: String,
    /// Latest full resume produced so far.
    pub draft: Option<String>,
    /// Notes produced by analysis, planning and critique steps.
    pub notes: Vec<StepNote>,
    /// Branch outputs handed to an aggregator step.
    pub candidates: Vec<String>,
}

impl StepContext {
    /// Context for the first step of a run.
    #[must_use]
    pub fn new(resume_text: impl Into<String>, job_description: impl Into<String>) -> Self {
        Self {
            resume_text: resume_text.into(),
            job_description: job_description.into(),
            ..Self::default()
        }
    }

    /// Folds a successful step's output into the context for the next step.
    pub fn record(&mut self, role: StepRole, output: &str) {
        if role.produces_draft() {
            self.draft = Some(output.to_string());
        } else {
            self.notes.push(StepNote { role, text: output.to_string() });
        }
    }

    /// Context for an aggregator step over `candidates`.
    #[must_use]
    pub fn with_candidates(&self, candidates: Vec<String>) -> Self {
        Self { candidates, ..self.clone() }
    }
}

/// Terminal status of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Output accepted.
    Succeeded,
    /// Provider or validation failure.
    Failed,
    /// The provider call exceeded its deadline.
    TimedOut,
}

/// Why a step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Credentials rejected or missing.
    AuthError,
    /// Provider throttled the call.
    RateLimited,
    /// Provider rejected the request.
    InvalidRequest,
    /// Provider unreachable or overloaded.
    ProviderUnavailable,
    /// Call exceeded its deadline.
    Timeout,
    /// Unclassified provider failure.
    Unknown,
    /// The reply was empty or exceeded the completion budget.
    InvalidResponse,
}

impl FailureKind {
    /// Transient kinds eligible for retry.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::RateLimited | Self::ProviderUnavailable | Self::Timeout)
    }
}

impl From<ProviderErrorKind> for FailureKind {
    fn from(kind: ProviderErrorKind) -> Self {
        match kind {
            ProviderErrorKind::AuthError => Self::AuthError,
            ProviderErrorKind::RateLimited => Self::RateLimited,
            ProviderErrorKind::InvalidRequest => Self::InvalidRequest,
            ProviderErrorKind::ProviderUnavailable => Self::ProviderUnavailable,
            ProviderErrorKind::Timeout => Self::Timeout,
            ProviderErrorKind::Unknown => Self::Unknown,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AuthError => "auth_error",
            Self::RateLimited => "rate_limited",
            Self::InvalidRequest => "invalid_request",
            Self::ProviderUnavailable => "provider_unavailable",
            Self::Timeout => "timeout",
            Self::Unknown => "unknown",
            Self::InvalidResponse => "invalid_response",
        };
        f.pad(name)
    }
}

/// Failure detail recorded on a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
    /// Normalized kind.
    pub kind: FailureKind,
    /// Provider or validation message.
    pub message: String,
    /// Wait the provider requested before the next attempt, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

/// Ledger entry for one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// Position of the step in the strategy.
    pub step_index: usize,
    /// Step role.
    pub role: StepRole,
    /// Catalog model id.
    pub model_id: String,
    /// Generated text (empty unless succeeded).
    pub output: String,
    /// Prompt tokens reported by the provider.
    pub prompt_tokens: u32,
    /// Completion tokens reported by the provider.
    pub completion_tokens: u32,
    /// USD cost of the final attempt.
    pub cost: f64,
    /// Wall-clock milliseconds across all attempts, backoff included.
    pub duration_ms: u64,
    /// Terminal status.
    pub status: StepStatus,
    /// Attempts made.
    pub attempts: u32,
    /// Set when the step did not succeed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<StepFailure>,
}

impl StepResult {
    /// Whether the output was accepted.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Succeeded
    }

    /// Failure kind, if any.
    #[must_use]
    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.failure.as_ref().map(|f| f.kind)
    }

    /// Provider-requested wait before retrying, if any.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        self.failure.as_ref()?.retry_after_ms.map(Duration::from_millis)
    }

    fn failed(step_index: usize, spec: &StepSpec, kind: FailureKind, message: String, elapsed: Duration) -> Self {
        Self {
            step_index,
            role: spec.role,
            model_id: spec.model_id.clone(),
            output: String::new(),
            prompt_tokens: 0,
            completion_tokens: 0,
            cost: 0.0,
            duration_ms: millis(elapsed),
            status: if kind == FailureKind::Timeout { StepStatus::TimedOut } else { StepStatus::Failed },
            attempts: 1,
            failure: Some(StepFailure { kind, message, retry_after_ms: None }),
        }
    }
}

pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Runs single step attempts against the gateway.
#[derive(Debug, Clone)]
pub struct StepExecutor {
    gateway: ProviderGateway,
    models: Arc<ModelRegistry>,
    max_tokens: u32,
    timeout: Duration,
}

impl StepExecutor {
    /// Creates an executor with default token budget and timeout.
    #[must_use]
    pub fn new(gateway: ProviderGateway, models: Arc<ModelRegistry>) -> Self {
        Self { gateway, models, max_tokens: DEFAULT_MAX_TOKENS, timeout: DEFAULT_STEP_TIMEOUT }
    }

    /// Sets the default completion budget.
    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Sets the per-call deadline.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The gateway calls go through.
    #[must_use]
    pub const fn gateway(&self) -> &ProviderGateway {
        &self.gateway
    }

    /// The model registry used for routing and pricing.
    #[must_use]
    pub fn models(&self) -> &ModelRegistry {
        &self.models
    }

    /// Runs one attempt of `spec` at position `step_index`.
    ///
    /// Never returns an error: failures are reported as a `StepResult` with
    /// status `Failed` or `TimedOut`.
    pub async fn run(&self, step_index: usize, spec: &StepSpec, context: &StepContext) -> StepResult {
        let started = Instant::now();

        let profile = match self.models.require(&spec.model_id) {
            Ok(profile) => profile,
            Err(err) => {
                warn!(step_index, model_id = %spec.model_id, "Step references unusable model");
                return StepResult::failed(step_index, spec, FailureKind::InvalidRequest, err.to_string(), started.elapsed());
            }
        };

        let max_tokens = spec.max_tokens.unwrap_or(self.max_tokens);
        let request = ProviderRequest {
            provider: profile.provider,
            model_id: profile.upstream_model.clone(),
            prompt: prompts::build_prompt(spec.role, context),
            max_tokens,
            timeout: self.timeout,
        };

        debug!(
            step_index,
            role = %spec.role,
            model_id = %spec.model_id,
            prompt_len = request.prompt.len(),
            "Running step"
        );

        let response = match self.gateway.invoke(&request).await {
            Ok(response) => response,
            Err(err) => return Self::from_provider_error(step_index, spec, &err, started.elapsed()),
        };

        let usage = response.usage;
        let cost = profile.cost_for_tokens(usage.total());

        let rejection = if response.text.trim().is_empty() {
            Some("provider returned an empty completion".to_string())
        } else if usage.completion_tokens > max_tokens {
            Some(format!(
                "completion used {} tokens, over the {max_tokens} token budget",
                usage.completion_tokens
            ))
        } else {
            None
        };

        let mut result = StepResult {
            step_index,
            role: spec.role,
            model_id: spec.model_id.clone(),
            output: String::new(),
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            cost,
            duration_ms: millis(started.elapsed()),
            status: StepStatus::Succeeded,
            attempts: 1,
            failure: None,
        };

        match rejection {
            Some(message) => {
                warn!(step_index, model_id = %spec.model_id, reason = %message, "Step response rejected");
                result.status = StepStatus::Failed;
                result.failure = Some(StepFailure { kind: FailureKind::InvalidResponse, message, retry_after_ms: None });
            }
            None => {
                debug!(step_index, model_id = %spec.model_id, cost, tokens = usage.total(), "Step succeeded");
                result.output = response.text;
            }
        }
        result
    }

    fn from_provider_error(step_index: usize, spec: &StepSpec, err: &ProviderError, elapsed: Duration) -> StepResult {
        let kind = FailureKind::from(err.kind());
        debug!(step_index, model_id = %spec.model_id, kind = %kind, error = %err, "Step attempt failed");
        let mut result = StepResult::failed(step_index, spec, kind, err.to_string(), elapsed);
        if let Some(failure) = result.failure.as_mut() {
            failure.retry_after_ms = err.retry_after().map(millis);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resume_abstraction::ProviderId;
    use resume_models::{MockOutcome, MockProvider};

    fn executor(mock: MockProvider) -> StepExecutor {
        let gateway = ProviderGateway::new().with_client(Arc::new(mock));
        StepExecutor::new(gateway, Arc::new(ModelRegistry::builtin()))
    }

    fn groq_write() -> StepSpec {
        StepSpec::new(StepRole::Write, "groq-mixtral-8x7b")
    }

    #[tokio::test]
    async fn test_success_is_priced_from_usage() {
        let mock = MockProvider::new(ProviderId::Groq)
            .with_sticky("mixtral-8x7b-32768", MockOutcome::reply_with_usage("New resume", 600, 400));
        let result = executor(mock).run(0, &groq_write(), &StepContext::new("r", "j")).await;

        assert!(result.is_success());
        assert_eq!(result.output, "New resume");
        assert_eq!(result.prompt_tokens, 600);
        assert_eq!(result.completion_tokens, 400);
        assert!((result.cost - 0.0007).abs() < 1e-12);
        assert_eq!(result.attempts, 1);
    }

    #[tokio::test]
    async fn test_prompt_includes_previous_draft() {
        let mock = Arc::new(MockProvider::new(ProviderId::DeepSeek));
        let gateway = ProviderGateway::new().with_client(mock.clone());
        let executor = StepExecutor::new(gateway, Arc::new(ModelRegistry::builtin()));

        let mut context = StepContext::new("resume", "job");
        context.record(StepRole::Write, "First draft text");
        executor.run(1, &StepSpec::new(StepRole::Refine, "deepseek-chat"), &context).await;

        let calls = mock.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].model_id, "deepseek-chat");
        assert!(calls[0].prompt.contains("First draft text"));
        assert_eq!(calls[0].max_tokens, DEFAULT_MAX_TOKENS);
    }

    #[tokio::test]
    async fn test_empty_reply_is_invalid_response() {
        let mock = MockProvider::new(ProviderId::Groq)
            .with_sticky("mixtral-8x7b-32768", MockOutcome::reply_with_usage("   ", 10, 0));
        let result = executor(mock).run(0, &groq_write(), &StepContext::new("r", "j")).await;

        assert_eq!(result.status, StepStatus::Failed);
        assert_eq!(result.failure_kind(), Some(FailureKind::InvalidResponse));
        assert!(result.output.is_empty());
    }

    #[tokio::test]
    async fn test_over_budget_completion_is_invalid_response() {
        let mock = MockProvider::new(ProviderId::Groq)
            .with_sticky("mixtral-8x7b-32768", MockOutcome::reply_with_usage("long", 10, 5000));
        let result = executor(mock).run(0, &groq_write(), &StepContext::new("r", "j")).await;
        assert_eq!(result.failure_kind(), Some(FailureKind::InvalidResponse));
    }

    #[tokio::test]
    async fn test_provider_error_is_normalized() {
        let mock = MockProvider::new(ProviderId::Groq).with_sticky(
            "mixtral-8x7b-32768",
            MockOutcome::fail(ProviderError::AuthError("bad key".to_string())),
        );
        let result = executor(mock).run(0, &groq_write(), &StepContext::new("r", "j")).await;

        assert_eq!(result.status, StepStatus::Failed);
        assert_eq!(result.failure_kind(), Some(FailureKind::AuthError));
        assert_eq!(result.cost, 0.0);
        assert_eq!(result.retry_after(), None);
    }

    #[tokio::test]
    async fn test_rate_limit_keeps_retry_after_hint() {
        let mock = MockProvider::new(ProviderId::Groq).with_sticky(
            "mixtral-8x7b-32768",
            MockOutcome::fail(ProviderError::RateLimited {
                message: "slow down".to_string(),
                retry_after_secs: Some(30),
            }),
        );
        let result = executor(mock).run(0, &groq_write(), &StepContext::new("r", "j")).await;

        assert_eq!(result.failure_kind(), Some(FailureKind::RateLimited));
        assert_eq!(result.retry_after(), Some(Duration::from_secs(30)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_status() {
        let mock = MockProvider::new(ProviderId::Groq).with_latency(Duration::from_secs(120));
        let result = executor(mock)
            .with_timeout(Duration::from_secs(1))
            .run(0, &groq_write(), &StepContext::new("r", "j"))
            .await;

        assert_eq!(result.status, StepStatus::TimedOut);
        assert_eq!(result.failure_kind(), Some(FailureKind::Timeout));
        assert_eq!(result.duration_ms, 1000);
    }

    #[test]
    fn test_context_record() {
        let mut context = StepContext::new("r", "j");
        context.record(StepRole::Analyze, "gaps");
        assert_eq!(context.draft, None);
        assert_eq!(context.notes[0].text, "gaps");
        context.record(StepRole::Write, "draft");
        assert_eq!(context.draft.as_deref(), Some("draft"));
        assert_eq!(context.notes.len(), 1);
    }

    #[test]
    fn test_failure_kind_from_provider_kind() {
        assert_eq!(FailureKind::from(ProviderErrorKind::Timeout), FailureKind::Timeout);
        assert!(FailureKind::RateLimited.is_retryable());
        assert!(!FailureKind::InvalidResponse.is_retryable());
    }
}
