//! Provider gateway.
//!
//! Routes a request to the client registered for its provider, enforces the
//! caller's deadline and reports wall-clock duration. It never retries.

use resume_abstraction::{ProviderClient, ProviderError, ProviderId, TokenUsage};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, error};

/// One outbound model call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRequest {
    /// Backend to call.
    pub provider: ProviderId,
    /// Upstream model name.
    pub model_id: String,
    /// Full prompt.
    pub prompt: String,
    /// Completion budget.
    pub max_tokens: u32,
    /// Deadline for the call itself.
    pub timeout: Duration,
}

/// Result of a successful call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderResponse {
    /// Generated text.
    pub text: String,
    /// Token usage.
    pub usage: TokenUsage,
    /// Wall-clock time spent in the provider call.
    pub duration: Duration,
    /// Model that served the request, as reported by the provider.
    pub model_id: String,
}

/// Uniform entry point over all registered provider clients.
#[derive(Clone, Default)]
pub struct ProviderGateway {
    clients: HashMap<ProviderId, Arc<dyn ProviderClient>>,
    limiter: Option<Arc<Semaphore>>,
}

impl fmt::Debug for ProviderGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut providers: Vec<&str> = self.clients.keys().map(|p| p.as_str()).collect();
        providers.sort_unstable();
        f.debug_struct("ProviderGateway")
            .field("providers", &providers)
            .field("limit", &self.limiter.as_ref().map(|s| s.available_permits()))
            .finish()
    }
}

impl ProviderGateway {
    /// Creates a gateway with no clients.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `client` under the provider it reports, replacing any previous one.
    pub fn register(&mut self, client: Arc<dyn ProviderClient>) {
        let provider = client.provider();
        debug!(provider = %provider, "Registering provider client");
        self.clients.insert(provider, client);
    }

    /// Builder form of [`Self::register`].
    #[must_use]
    pub fn with_client(mut self, client: Arc<dyn ProviderClient>) -> Self {
        self.register(client);
        self
    }

    /// Bounds the number of calls in flight through this gateway (and its clones).
    #[must_use]
    pub fn with_max_concurrent_calls(mut self, limit: usize) -> Self {
        self.limiter = Some(Arc::new(Semaphore::new(limit.max(1))));
        self
    }

    /// Whether a client is registered for `provider`.
    #[must_use]
    pub fn has_provider(&self, provider: ProviderId) -> bool {
        self.clients.contains_key(&provider)
    }

    /// Registered providers.
    pub fn providers(&self) -> impl Iterator<Item = ProviderId> + '_ {
        self.clients.keys().copied()
    }

    /// Performs one call.
    ///
    /// The deadline starts once a concurrency permit is held, so time spent
    /// queueing behind the global limit does not count against the call.
    ///
    /// # Errors
    /// Returns `ProviderError::Timeout` when the deadline passes,
    /// `ProviderError::ProviderUnavailable` when no client is registered, or
    /// the client's own error.
    pub async fn invoke(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let Some(client) = self.clients.get(&request.provider) else {
            error!(provider = %request.provider, "No client registered for provider");
            return Err(ProviderError::ProviderUnavailable(format!(
                "no client registered for provider '{}'",
                request.provider
            )));
        };

        let _permit = match &self.limiter {
            Some(limiter) => Some(Arc::clone(limiter).acquire_owned().await.map_err(|_| {
                ProviderError::ProviderUnavailable("provider gateway is shut down".to_string())
            })?),
            None => None,
        };

        debug!(
            provider = %request.provider,
            model_id = %request.model_id,
            max_tokens = request.max_tokens,
            timeout_ms = request.timeout.as_millis(),
            "Invoking provider"
        );

        let started = Instant::now();
        let outcome = tokio::time::timeout(
            request.timeout,
            client.invoke(&request.model_id, &request.prompt, request.max_tokens),
        )
        .await;
        let duration = started.elapsed();

        match outcome {
            Ok(Ok(completion)) => {
                debug!(
                    provider = %request.provider,
                    model_id = %request.model_id,
                    prompt_tokens = completion.usage.prompt_tokens,
                    completion_tokens = completion.usage.completion_tokens,
                    duration_ms = duration.as_millis(),
                    "Provider call succeeded"
                );
                Ok(ProviderResponse {
                    text: completion.text,
                    usage: completion.usage,
                    duration,
                    model_id: completion.model_id.unwrap_or_else(|| request.model_id.clone()),
                })
            }
            Ok(Err(err)) => {
                debug!(provider = %request.provider, model_id = %request.model_id, error = %err, "Provider call failed");
                Err(err)
            }
            Err(_) => {
                let millis = u64::try_from(request.timeout.as_millis()).unwrap_or(u64::MAX);
                debug!(provider = %request.provider, model_id = %request.model_id, timeout_ms = millis, "Provider call timed out");
                Err(ProviderError::Timeout(millis))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resume_models::{MockOutcome, MockProvider};

    fn request(provider: ProviderId, timeout: Duration) -> ProviderRequest {
        ProviderRequest {
            provider,
            model_id: "mixtral-8x7b-32768".to_string(),
            prompt: "rewrite my resume".to_string(),
            max_tokens: 512,
            timeout,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_invoke_reports_usage_and_duration() {
        let mock = MockProvider::new(ProviderId::Groq)
            .with_latency(Duration::from_millis(250))
            .with_sticky("mixtral-8x7b-32768", MockOutcome::reply_with_usage("better resume", 40, 12));
        let gateway = ProviderGateway::new().with_client(Arc::new(mock));

        let response = gateway.invoke(&request(ProviderId::Groq, Duration::from_secs(5))).await.unwrap();
        assert_eq!(response.text, "better resume");
        assert_eq!(response.usage, TokenUsage::new(40, 12));
        assert_eq!(response.duration, Duration::from_millis(250));
        assert_eq!(response.model_id, "mixtral-8x7b-32768");
    }

    #[tokio::test(start_paused = true)]
    async fn test_invoke_times_out() {
        let mock = MockProvider::new(ProviderId::Groq).with_latency(Duration::from_secs(30));
        let gateway = ProviderGateway::new().with_client(Arc::new(mock));

        let err = gateway.invoke(&request(ProviderId::Groq, Duration::from_secs(2))).await.unwrap_err();
        assert_eq!(err, ProviderError::Timeout(2000));
    }

    #[tokio::test]
    async fn test_missing_client_is_unavailable() {
        let gateway = ProviderGateway::new();
        let err = gateway.invoke(&request(ProviderId::Gemini, Duration::from_secs(1))).await.unwrap_err();
        assert!(matches!(err, ProviderError::ProviderUnavailable(_)));
        assert!(!gateway.has_provider(ProviderId::Gemini));
    }

    #[tokio::test]
    async fn test_errors_pass_through_without_retry() {
        let mock = Arc::new(
            MockProvider::new(ProviderId::Groq)
                .with_sticky("mixtral-8x7b-32768", MockOutcome::fail(ProviderError::rate_limited("slow down"))),
        );
        let gateway = ProviderGateway::new().with_client(mock.clone());

        let err = gateway.invoke(&request(ProviderId::Groq, Duration::from_secs(1))).await.unwrap_err();
        assert_eq!(err, ProviderError::rate_limited("slow down"));
        assert_eq!(mock.call_count("mixtral-8x7b-32768"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_limiter_bounds_in_flight_calls() {
        let mock = Arc::new(MockProvider::new(ProviderId::Groq).with_latency(Duration::from_millis(100)));
        let gateway = ProviderGateway::new().with_client(mock.clone()).with_max_concurrent_calls(2);

        let mut handles = Vec::new();
        for _ in 0..5 {
            let gateway = gateway.clone();
            handles.push(tokio::spawn(async move {
                gateway.invoke(&request(ProviderId::Groq, Duration::from_secs(1))).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(mock.max_in_flight(), 2);
    }
}
