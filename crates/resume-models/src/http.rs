//! HTTP failure classification shared by the REST clients.
//!
//! Every client funnels non-2xx responses and transport errors through these
//! helpers so that status codes mean the same thing for every backend.

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Response, StatusCode};
use resume_abstraction::{ProviderError, ProviderId};
use tracing::error;

/// Maps an HTTP error status and body to the normalized taxonomy.
pub(crate) fn classify_status(
    provider: ProviderId,
    status: StatusCode,
    retry_after_secs: Option<u64>,
    body: &str,
) -> ProviderError {
    let message = format!("{provider} returned {status}: {}", extract_error_message(body));

    match status.as_u16() {
        401 | 403 => ProviderError::AuthError(message),
        // Billing problems surface as 402 or as a 429 mentioning quota; neither clears by waiting.
        402 => ProviderError::AuthError(message),
        429 if is_quota_exhausted(body) => ProviderError::AuthError(message),
        429 => ProviderError::RateLimited { message, retry_after_secs },
        400 | 404 | 413 | 422 => ProviderError::InvalidRequest(message),
        408 | 529 => ProviderError::ProviderUnavailable(message),
        code if (500..600).contains(&code) => ProviderError::ProviderUnavailable(message),
        _ => ProviderError::Unknown(message),
    }
}

/// Maps a reqwest transport failure to the normalized taxonomy.
pub(crate) fn classify_transport(provider: ProviderId, err: &reqwest::Error) -> ProviderError {
    error!(provider = %provider, error = %err, "Failed to send request");

    if err.is_timeout() || err.is_connect() || err.is_request() {
        ProviderError::ProviderUnavailable(format!("{provider} network error: {err}"))
    } else if err.is_decode() || err.is_body() {
        ProviderError::Unknown(format!("{provider} returned an unreadable body: {err}"))
    } else {
        ProviderError::Unknown(format!("{provider} request failed: {err}"))
    }
}

/// Consumes a non-success response and classifies it.
pub(crate) async fn error_from_response(provider: ProviderId, response: Response) -> ProviderError {
    let status = response.status();
    let retry_after = retry_after_secs(response.headers());
    let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());

    error!(
        provider = %provider,
        status = %status,
        error = %body,
        "Provider API returned error status"
    );

    classify_status(provider, status, retry_after, &body)
}

fn retry_after_secs(headers: &HeaderMap) -> Option<u64> {
    headers.get(RETRY_AFTER)?.to_str().ok()?.trim().parse().ok()
}

/// Pulls `error.message` (or a top-level `message`) out of a JSON error body.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| {
            json.get("error")
                .and_then(|e| e.get("message").or(Some(e)))
                .or_else(|| json.get("message"))
                .and_then(|m| m.as_str().map(str::to_string))
        })
        .unwrap_or_else(|| body.trim().to_string())
}

fn is_quota_exhausted(body: &str) -> bool {
    let lower = body.to_lowercase();
    lower.contains("insufficient_quota") || lower.contains("exceeded your current quota")
}

#[cfg(test)]
mod tests {
    use super::*;
    use resume_abstraction::ProviderErrorKind;

    fn kind(status: u16, body: &str) -> ProviderErrorKind {
        classify_status(ProviderId::OpenAi, StatusCode::from_u16(status).unwrap(), None, body)
            .kind()
    }

    #[test]
    fn test_auth_statuses() {
        assert_eq!(kind(401, ""), ProviderErrorKind::AuthError);
        assert_eq!(kind(403, ""), ProviderErrorKind::AuthError);
        assert_eq!(kind(402, ""), ProviderErrorKind::AuthError);
    }

    #[test]
    fn test_rate_limit_vs_quota() {
        assert_eq!(kind(429, r#"{"error":{"message":"Rate limit reached"}}"#), ProviderErrorKind::RateLimited);
        assert_eq!(
            kind(429, r#"{"error":{"type":"insufficient_quota","message":"You exceeded your current quota"}}"#),
            ProviderErrorKind::AuthError
        );
    }

    #[test]
    fn test_request_and_server_statuses() {
        assert_eq!(kind(400, ""), ProviderErrorKind::InvalidRequest);
        assert_eq!(kind(404, ""), ProviderErrorKind::InvalidRequest);
        assert_eq!(kind(500, ""), ProviderErrorKind::ProviderUnavailable);
        assert_eq!(kind(503, ""), ProviderErrorKind::ProviderUnavailable);
        assert_eq!(kind(529, ""), ProviderErrorKind::ProviderUnavailable);
        assert_eq!(kind(418, ""), ProviderErrorKind::Unknown);
    }

    #[test]
    fn test_retry_after_is_carried() {
        let err = classify_status(ProviderId::Groq, StatusCode::TOO_MANY_REQUESTS, Some(7), "busy");
        assert_eq!(
            err,
            ProviderError::RateLimited {
                message: "groq returned 429 Too Many Requests: busy".to_string(),
                retry_after_secs: Some(7),
            }
        );
    }

    #[test]
    fn test_extract_error_message() {
        assert_eq!(extract_error_message(r#"{"error":{"message":"bad key"}}"#), "bad key");
        assert_eq!(extract_error_message(r#"{"message":"flat"}"#), "flat");
        assert_eq!(extract_error_message(r#"{"error":"plain"}"#), "plain");
        assert_eq!(extract_error_message("  not json "), "not json");
    }
}
