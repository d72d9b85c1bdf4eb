//! Step retry policy.

use std::time::Duration;

use crate::executor::FailureKind;

/// Retry policy applied by the orchestrator to failed steps.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Backoff multiplier (e.g., 2.0 for exponential backoff).
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy.
    #[must_use]
    pub const fn new(max_retries: u32, initial_delay: Duration, max_delay: Duration, multiplier: f64) -> Self {
        Self { max_retries, initial_delay, max_delay, multiplier }
    }

    /// A policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self { max_retries: 0, ..Self::default() }
    }

    /// Calculate the delay before retry number `retry_count` (zero-based).
    ///
    /// Uses exponential backoff: `initial_delay * multiplier^retry_count`, capped at `max_delay`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_possible_wrap)]
    pub fn calculate_delay(&self, retry_count: u32) -> Duration {
        let delay_ms = (self.initial_delay.as_millis() as f64
            * self.multiplier.powi(retry_count.min(i32::MAX as u32) as i32))
        .min(self.max_delay.as_millis() as f64);
        Duration::from_millis(delay_ms.max(0.0) as u64)
    }

    /// Whether a step that has failed with `kind` after `attempts` attempts
    /// gets another one.
    #[must_use]
    pub fn should_retry(&self, kind: FailureKind, attempts: u32) -> bool {
        kind.is_retryable() && attempts <= self.max_retries
    }

    /// Delay before retry number `retry_count`, never shorter than the wait
    /// the provider asked for.
    #[must_use]
    pub fn delay_for(&self, retry_count: u32, retry_after: Option<Duration>) -> Duration {
        let backoff = self.calculate_delay(retry_count);
        retry_after.map_or(backoff, |hint| hint.max(backoff))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_delays() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.calculate_delay(0), Duration::from_millis(500));
        assert_eq!(policy.calculate_delay(1), Duration::from_millis(1000));
        assert_eq!(policy.calculate_delay(2), Duration::from_millis(2000));
        assert_eq!(policy.calculate_delay(10), Duration::from_secs(8));
    }

    #[test]
    fn test_should_retry_transient_kinds() {
        let policy = RetryPolicy::default();
        for kind in [FailureKind::RateLimited, FailureKind::ProviderUnavailable, FailureKind::Timeout] {
            assert!(policy.should_retry(kind, 1));
            assert!(policy.should_retry(kind, 2));
            assert!(!policy.should_retry(kind, 3));
        }
    }

    #[test]
    fn test_never_retries_permanent_kinds() {
        let policy = RetryPolicy::default();
        for kind in [
            FailureKind::AuthError,
            FailureKind::InvalidRequest,
            FailureKind::Unknown,
            FailureKind::InvalidResponse,
        ] {
            assert!(!policy.should_retry(kind, 1));
        }
    }

    #[test]
    fn test_none_policy() {
        let policy = RetryPolicy::none();
        assert!(!policy.should_retry(FailureKind::RateLimited, 1));
    }

    #[test]
    fn test_retry_after_extends_backoff() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0, None), Duration::from_millis(500));
        assert_eq!(policy.delay_for(0, Some(Duration::from_secs(30))), Duration::from_secs(30));
        assert_eq!(policy.delay_for(2, Some(Duration::from_millis(100))), Duration::from_secs(2));
    }
}
