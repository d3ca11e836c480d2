//! Resilient access to the generative backend.
//!
//! [`ResilientClient`] wraps a [`GenerativeBackend`] in a bounded retry policy
//! with exponential backoff. Only transient failures (the service reporting
//! that it is temporarily overloaded) are retried; anything else fails the
//! call on the spot.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{Config, RetryConfig};
use crate::error::{BackendErrorKind, EngineError, Result};

// ============================================================================
// Backend abstraction
// ============================================================================

/// Failure reported by a generative backend for a single attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct BackendError {
    /// Classification used by the retry policy.
    pub kind: BackendErrorKind,
    /// Description of the failure.
    pub message: String,
}

impl BackendError {
    /// Creates a new `BackendError`.
    #[must_use]
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Creates an error signalling temporary unavailability.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Unavailable, message)
    }

    /// Returns `true` if the attempt may be retried.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

/// A text-generation service.
///
/// One prompt in, one completion out. Implementations perform exactly one
/// attempt; retrying is the job of [`ResilientClient`].
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// Generates a completion for the prompt.
    async fn generate(&self, prompt: &str) -> std::result::Result<String, BackendError>;
}

// ============================================================================
// Retry policy
// ============================================================================

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

impl RetryPolicy {
    /// Returns the delay to wait after the given failed attempt (1-indexed).
    ///
    /// Doubles from `initial_delay` and saturates at `max_delay`.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        self.initial_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

/// Details of a failed attempt that will be retried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryAttempt {
    /// The attempt that failed (1-indexed).
    pub attempt: u32,
    /// Why it failed.
    pub cause: String,
    /// How long the client waits before the next attempt.
    pub delay_ms: u64,
}

/// Callback invoked before each backoff sleep.
pub type RetryObserver = Arc<dyn Fn(&RetryAttempt) + Send + Sync>;

// ============================================================================
// Resilient client
// ============================================================================

/// Calls a [`GenerativeBackend`] with retry and backoff.
#[derive(Clone)]
pub struct ResilientClient {
    backend: Arc<dyn GenerativeBackend>,
    policy: RetryPolicy,
    observer: Option<RetryObserver>,
}

impl std::fmt::Debug for ResilientClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientClient")
            .field("policy", &self.policy)
            .field("observer", &self.observer.is_some())
            .finish_non_exhaustive()
    }
}

impl ResilientClient {
    /// Creates a client with the default policy (3 attempts, 1s..10s).
    #[must_use]
    pub fn new(backend: Arc<dyn GenerativeBackend>) -> Self {
        Self::with_policy(backend, RetryPolicy::default())
    }

    /// Creates a client with an explicit retry policy.
    #[must_use]
    pub fn with_policy(backend: Arc<dyn GenerativeBackend>, policy: RetryPolicy) -> Self {
        Self {
            backend,
            policy,
            observer: None,
        }
    }

    /// Registers a callback notified of every retry.
    #[must_use]
    pub fn with_observer(mut self, observer: RetryObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Returns the retry policy.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Generates a completion, retrying transient failures.
    ///
    /// # Errors
    ///
    /// - `EngineError::Generation` as soon as the backend reports a
    ///   non-transient failure.
    /// - `EngineError::GenerationExhausted` once `max_attempts` transient
    ///   failures have occurred.
    pub async fn call(&self, prompt: &str) -> Result<String> {
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            debug!(attempt, prompt_len = prompt.len(), "Calling generative backend");

            let err = match self.backend.generate(prompt).await {
                Ok(text) => return Ok(text),
                Err(err) => err,
            };

            if !err.is_transient() {
                warn!(attempt, kind = %err.kind, error = %err.message, "Generation failed");
                return Err(EngineError::generation(err.kind, err.message));
            }

            if attempt >= self.policy.max_attempts {
                warn!(attempts = attempt, error = %err.message, "Generation retries exhausted");
                return Err(EngineError::exhausted(attempt, err.message));
            }

            let delay = self.policy.delay_after(attempt);
            let retry = RetryAttempt {
                attempt,
                cause: err.to_string(),
                delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            };
            warn!(
                attempt = retry.attempt,
                cause = %retry.cause,
                delay_ms = retry.delay_ms,
                "Retrying generation"
            );
            if let Some(observer) = &self.observer {
                observer(&retry);
            }

            tokio::time::sleep(delay).await;
        }
    }
}

// ============================================================================
// Gemini backend
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: [RequestContent<'a>; 1],
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    parts: [RequestPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

/// Header carrying the Gemini API key.
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Google Generative Language (`generateContent`) backend.
#[derive(Clone)]
pub struct GeminiBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiBackend {
    /// Creates a backend for the given endpoint, model and key.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::generation(BackendErrorKind::Network, e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.into(),
        })
    }

    /// Creates a backend from configuration, reading the key from the
    /// environment variable named in `api_key_env`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            EngineError::validation(
                format!("environment variable {} is not set", config.api_key_env),
                format!("Export {} with your Gemini API key", config.api_key_env),
            )
        })?;
        Self::new(
            &config.api_base_url,
            &config.model,
            api_key,
            config.request_timeout(),
        )
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

impl std::fmt::Debug for GeminiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiBackend")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .finish_non_exhaustive()
    }
}

/// Maps an HTTP status to a backend error kind.
fn classify_status(status: reqwest::StatusCode) -> BackendErrorKind {
    match status.as_u16() {
        503 => BackendErrorKind::Unavailable,
        429 => BackendErrorKind::RateLimited,
        401 | 403 => BackendErrorKind::Authentication,
        500..=599 => BackendErrorKind::Server,
        _ => BackendErrorKind::Other,
    }
}

/// Joins the text parts of the first candidate.
fn extract_text(response: GenerateResponse) -> std::result::Result<String, BackendError> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| content.parts.into_iter().map(|part| part.text).collect())
        .unwrap_or_default();

    let text = text.trim();
    if text.is_empty() {
        return Err(BackendError::new(
            BackendErrorKind::InvalidResponse,
            "response contained no text",
        ));
    }
    Ok(text.to_string())
}

#[async_trait]
impl GenerativeBackend for GeminiBackend {
    async fn generate(&self, prompt: &str) -> std::result::Result<String, BackendError> {
        let body = GenerateRequest {
            contents: [RequestContent {
                parts: [RequestPart { text: prompt }],
            }],
        };

        let response = self
            .client
            .post(self.endpoint())
            .header(API_KEY_HEADER, self.api_key.as_str())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                BackendError::new(BackendErrorKind::Network, e.without_url().to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(BackendError::new(
                classify_status(status),
                format!("HTTP {status}: {detail}"),
            ));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| {
                BackendError::new(BackendErrorKind::InvalidResponse, e.without_url().to_string())
            })?;
        extract_text(parsed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use super::*;

    /// Backend replaying a fixed script of results.
    struct ScriptedBackend {
        script: Mutex<VecDeque<std::result::Result<String, BackendError>>>,
        calls: AtomicU32,
    }

    impl ScriptedBackend {
        fn new(script: Vec<std::result::Result<String, BackendError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl GenerativeBackend for ScriptedBackend {
        async fn generate(&self, _prompt: &str) -> std::result::Result<String, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(BackendError::unavailable("503 overloaded")))
        }
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_after(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_after(3), Duration::from_millis(4000));
        assert_eq!(policy.delay_after(4), Duration::from_millis(8000));
        assert_eq!(policy.delay_after(5), Duration::from_millis(10_000));
        assert_eq!(policy.delay_after(40), Duration::from_millis(10_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_transient_failures_then_success() {
        let backend = ScriptedBackend::new(vec![
            Err(BackendError::unavailable("503")),
            Err(BackendError::unavailable("503")),
            Ok("What is a mutex?".to_string()),
        ]);
        let client = ResilientClient::new(backend.clone());

        let text = tokio_test::assert_ok!(client.call("prompt").await);
        assert_eq!(text, "What is a mutex?");
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_transient_exhausts_after_three_attempts() {
        let backend = ScriptedBackend::new(vec![]);
        let client = ResilientClient::new(backend.clone());

        let err = client.call("prompt").await.unwrap_err();
        assert!(
            matches!(err, EngineError::GenerationExhausted { attempts: 3, .. }),
            "Expected GenerationExhausted, got: {err:?}"
        );
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_schedule_is_followed() {
        let backend = ScriptedBackend::new(vec![]);
        let client = ResilientClient::new(backend);

        let started = tokio::time::Instant::now();
        let _ = client.call("prompt").await;
        // 1s after the first failure, 2s after the second, none after the last.
        assert_eq!(started.elapsed(), Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_error_is_not_retried() {
        let backend = ScriptedBackend::new(vec![
            Err(BackendError::new(BackendErrorKind::Authentication, "bad key")),
            Ok("never reached".to_string()),
        ]);
        let client = ResilientClient::new(backend.clone());

        let err = client.call("prompt").await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Generation {
                kind: BackendErrorKind::Authentication,
                ..
            }
        ));
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_observer_sees_each_retry() {
        let backend = ScriptedBackend::new(vec![
            Err(BackendError::unavailable("overloaded")),
            Ok("ok".to_string()),
        ]);
        let seen: Arc<Mutex<Vec<RetryAttempt>>> = Arc::default();
        let sink = Arc::clone(&seen);
        let client = ResilientClient::new(backend).with_observer(Arc::new(move |retry| {
            sink.lock().unwrap().push(retry.clone());
        }));

        client.call("prompt").await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].attempt, 1);
        assert_eq!(seen[0].delay_ms, 1000);
        assert!(seen[0].cause.contains("overloaded"));
    }

    #[test]
    fn test_classify_status() {
        use reqwest::StatusCode;

        assert_eq!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE),
            BackendErrorKind::Unavailable
        );
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            BackendErrorKind::RateLimited
        );
        assert_eq!(
            classify_status(StatusCode::FORBIDDEN),
            BackendErrorKind::Authentication
        );
        assert_eq!(
            classify_status(StatusCode::INTERNAL_SERVER_ERROR),
            BackendErrorKind::Server
        );
        assert_eq!(
            classify_status(StatusCode::BAD_REQUEST),
            BackendErrorKind::Other
        );
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"  Explain "},{"text":"ownership. "}]}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_text(response).unwrap(), "Explain ownership.");
    }

    #[tokio::test]
    async fn test_network_error_does_not_leak_api_key() {
        let backend =
            GeminiBackend::new("http://127.0.0.1:1", "m", "SECRET123", Duration::from_secs(2))
                .unwrap();

        let err = backend.generate("hi").await.unwrap_err();

        assert_eq!(err.kind, BackendErrorKind::Network);
        assert!(!err.message.contains("SECRET123"));
        assert!(!format!("{backend:?}").contains("SECRET123"));
    }

    #[test]
    fn test_extract_text_rejects_empty_response() {
        let response: GenerateResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        let err = extract_text(response).unwrap_err();
        assert_eq!(err.kind, BackendErrorKind::InvalidResponse);
    }
}
