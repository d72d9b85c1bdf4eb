//! Scriptable in-process provider for tests, demos and offline runs.

use async_trait::async_trait;
use resume_abstraction::{Completion, ProviderClient, ProviderError, ProviderId, TokenUsage};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

use crate::count_tokens;

/// What a [`MockProvider`] does for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOutcome {
    /// Return `text`. Usage is estimated from word counts unless given.
    Reply {
        /// Generated text.
        text: String,
        /// Explicit usage to report.
        usage: Option<TokenUsage>,
    },
    /// Fail with the given error.
    Fail(ProviderError),
}

impl MockOutcome {
    /// A successful reply with estimated usage.
    #[must_use]
    pub fn reply(text: impl Into<String>) -> Self {
        Self::Reply { text: text.into(), usage: None }
    }

    /// A successful reply reporting exact usage.
    #[must_use]
    pub fn reply_with_usage(text: impl Into<String>, prompt: u32, completion: u32) -> Self {
        Self::Reply { text: text.into(), usage: Some(TokenUsage::new(prompt, completion)) }
    }

    /// A failure.
    #[must_use]
    pub const fn fail(error: ProviderError) -> Self {
        Self::Fail(error)
    }
}

/// One recorded invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    /// Upstream model requested.
    pub model_id: String,
    /// Prompt received.
    pub prompt: String,
    /// Completion budget requested.
    pub max_tokens: u32,
}

/// A provider that answers from per-model scripts.
///
/// For each model, scripted outcomes are consumed in order; once a script is
/// exhausted the model's sticky outcome (if any) is used, otherwise a
/// deterministic echo reply.
#[derive(Debug)]
pub struct MockProvider {
    provider: ProviderId,
    latency: Duration,
    latencies: HashMap<String, Duration>,
    scripts: Mutex<HashMap<String, VecDeque<MockOutcome>>>,
    sticky: HashMap<String, MockOutcome>,
    calls: Mutex<Vec<MockCall>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockProvider {
    /// Creates a mock standing in for `provider`.
    #[must_use]
    pub fn new(provider: ProviderId) -> Self {
        Self {
            provider,
            latency: Duration::ZERO,
            latencies: HashMap::new(),
            scripts: Mutex::new(HashMap::new()),
            sticky: HashMap::new(),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Simulated latency for every call.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Simulated latency for calls to one model, overriding the default.
    #[must_use]
    pub fn with_model_latency(mut self, model_id: impl Into<String>, latency: Duration) -> Self {
        self.latencies.insert(model_id.into(), latency);
        self
    }

    /// Queues outcomes for successive calls to `model_id`.
    #[must_use]
    pub fn with_script(
        self,
        model_id: impl Into<String>,
        outcomes: impl IntoIterator<Item = MockOutcome>,
    ) -> Self {
        lock(&self.scripts).entry(model_id.into()).or_default().extend(outcomes);
        self
    }

    /// Outcome returned for every call to `model_id` once its script is empty.
    #[must_use]
    pub fn with_sticky(mut self, model_id: impl Into<String>, outcome: MockOutcome) -> Self {
        self.sticky.insert(model_id.into(), outcome);
        self
    }

    /// All calls received so far, in arrival order.
    pub fn calls(&self) -> Vec<MockCall> {
        lock(&self.calls).clone()
    }

    /// Number of calls received for `model_id`.
    pub fn call_count(&self, model_id: &str) -> usize {
        lock(&self.calls).iter().filter(|c| c.model_id == model_id).count()
    }

    /// Calls currently waiting out their simulated latency.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of calls that were in flight at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_outcome(&self, model_id: &str, prompt: &str) -> MockOutcome {
        if let Some(outcome) = lock(&self.scripts).get_mut(model_id).and_then(VecDeque::pop_front)
        {
            return outcome;
        }
        self.sticky.get(model_id).cloned().unwrap_or_else(|| {
            MockOutcome::reply(format!(
                "Mock response from {model_id} ({} prompt words)",
                count_tokens(prompt)
            ))
        })
    }
}

#[async_trait]
impl ProviderClient for MockProvider {
    fn provider(&self) -> ProviderId {
        self.provider
    }

    async fn invoke(
        &self,
        model_id: &str,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<Completion, ProviderError> {
        debug!(provider = %self.provider, model_id = %model_id, "MockProvider invoked");

        lock(&self.calls).push(MockCall {
            model_id: model_id.to_string(),
            prompt: prompt.to_string(),
            max_tokens,
        });
        let outcome = self.next_outcome(model_id, prompt);

        let guard = InFlight::enter(&self.in_flight);
        self.max_in_flight.fetch_max(guard.count, Ordering::SeqCst);
        let latency = self.latencies.get(model_id).copied().unwrap_or(self.latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        drop(guard);

        match outcome {
            MockOutcome::Reply { text, usage } => {
                let usage = usage.unwrap_or_else(|| crate::estimated_usage(prompt, &text));
                Ok(Completion { text, usage, model_id: Some(model_id.to_string()) })
            }
            MockOutcome::Fail(error) => Err(error),
        }
    }
}

/// Counts a call as in flight until dropped, including when the caller
/// abandons the future mid-latency.
struct InFlight<'a> {
    counter: &'a AtomicUsize,
    count: usize,
}

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        let count = counter.fetch_add(1, Ordering::SeqCst) + 1;
        Self { counter, count }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_reply_echoes_model() {
        let mock = MockProvider::new(ProviderId::Groq);
        let completion = mock.invoke("mixtral", "one two three", 100).await.unwrap();
        assert_eq!(completion.text, "Mock response from mixtral (3 prompt words)");
        assert_eq!(completion.usage.prompt_tokens, 3);
        assert_eq!(mock.call_count("mixtral"), 1);
    }

    #[tokio::test]
    async fn test_script_then_sticky() {
        let mock = MockProvider::new(ProviderId::OpenAi)
            .with_script("gpt", [MockOutcome::fail(ProviderError::rate_limited("busy"))])
            .with_sticky("gpt", MockOutcome::reply_with_usage("done", 10, 2));

        let first = mock.invoke("gpt", "p", 10).await;
        assert_eq!(first.unwrap_err().kind(), resume_abstraction::ProviderErrorKind::RateLimited);

        for _ in 0..2 {
            let next = mock.invoke("gpt", "p", 10).await.unwrap();
            assert_eq!(next.text, "done");
            assert_eq!(next.usage, TokenUsage::new(10, 2));
        }
        assert_eq!(mock.call_count("gpt"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_is_simulated() {
        let mock = MockProvider::new(ProviderId::Gemini).with_latency(Duration::from_secs(5));
        let started = tokio::time::Instant::now();
        mock.invoke("gemini-pro", "hello", 10).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(5));
        assert_eq!(mock.max_in_flight(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_call_leaves_flight() {
        let mock = MockProvider::new(ProviderId::Anthropic).with_latency(Duration::from_secs(10));

        let abandoned = tokio::time::timeout(Duration::from_secs(1), mock.invoke("claude", "hi", 10)).await;
        assert!(abandoned.is_err());
        assert_eq!(mock.in_flight(), 0);

        mock.invoke("claude", "hi", 10).await.unwrap();
        assert_eq!(mock.max_in_flight(), 1);
        assert_eq!(mock.in_flight(), 0);
    }
}
