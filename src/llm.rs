//! Completion model client with bounded retries.
//!
//! [`CompletionClient`] is the seam between the audit logic and the model
//! API. [`OpenAiCompatClient`] talks to any OpenAI-compatible
//! `/chat/completions` endpoint (Together AI by default).
//! [`complete_with_retry`] wraps a client with exponential backoff.
//!
//! # Retry Strategy
//!
//! - HTTP 429, 5xx, network errors and empty completions → [`LlmError::Transient`], retried
//! - Any other non-success status → [`LlmError::Fatal`], returned immediately
//! - Delay before retry `n` (1-based): `min(min_delay * 2^(n-1), max_delay)`
//! - After `max_attempts` transient failures → [`LlmError::Exhausted`]

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::config::LlmConfig;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("transient LLM error: {0}")]
    Transient(String),
    #[error("LLM request failed: {0}")]
    Fatal(String),
    #[error("LLM unavailable after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

/// A text-in, text-out completion model.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            min_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            min_delay: Duration::from_millis(config.min_backoff_ms),
            max_delay: Duration::from_millis(config.max_backoff_ms),
        }
    }

    /// Delay before the `retry`-th retry (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32 << retry.saturating_sub(1).min(20);
        self.min_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Call `client` until it succeeds, fails fatally, or `policy.max_attempts`
/// transient failures have occurred.
pub async fn complete_with_retry(
    client: &dyn CompletionClient,
    prompt: &str,
    policy: &RetryPolicy,
) -> Result<String, LlmError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut last = String::new();

    for attempt in 1..=max_attempts {
        match client.complete(prompt).await {
            Ok(text) if !text.trim().is_empty() => return Ok(text),
            Ok(_) => last = "empty completion".to_string(),
            Err(LlmError::Transient(msg)) => last = msg,
            Err(e) => return Err(e),
        }

        if attempt < max_attempts {
            let delay = policy.delay_for(attempt);
            tracing::warn!(attempt, max_attempts, ?delay, error = %last, "LLM call failed, retrying");
            tokio::time::sleep(delay).await;
        }
    }

    tracing::error!(attempts = max_attempts, error = %last, "LLM retries exhausted");
    Err(LlmError::Exhausted {
        attempts: max_attempts,
        last,
    })
}

/// Client for OpenAI-compatible chat completion APIs.
pub struct OpenAiCompatClient {
    endpoint: String,
    models_endpoint: String,
    model: String,
    api_key: String,
    temperature: f32,
    max_tokens: u32,
    client: reqwest::Client,
}

impl OpenAiCompatClient {
    /// Build a client, reading the API key from `config.api_key_env`.
    ///
    /// Only checks that the key is present. A key the API rejects surfaces
    /// on the first completion as [`LlmError::Fatal`], or at startup via
    /// [`verify`](Self::verify) when `llm.verify_on_startup` is set.
    pub fn from_config(config: &LlmConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| anyhow!("{} environment variable not set", config.api_key_env))?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &LlmConfig, api_key: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        let base = config.base_url.trim_end_matches('/');
        Ok(Self {
            endpoint: format!("{}/chat/completions", base),
            models_endpoint: format!("{}/models", base),
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client,
        })
    }
}

impl OpenAiCompatClient {
    /// Confirm the API accepts the key by listing models.
    pub async fn verify(&self) -> Result<(), LlmError> {
        let response = self
            .client
            .get(&self.models_endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| LlmError::Transient(format!("connection error: {}", e)))?;

        let status = response.status();
        match status.as_u16() {
            _ if status.is_success() => Ok(()),
            401 | 403 => Err(LlmError::Fatal(format!("API key rejected ({})", status))),
            _ if status.is_server_error() => {
                Err(LlmError::Transient(format!("API error {}", status)))
            }
            _ => Err(LlmError::Fatal(format!("API error {}", status))),
        }
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompatClient {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Transient(format!("connection error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let msg = format!("API error {}: {}", status, text);
            return if status.as_u16() == 429 || status.is_server_error() {
                Err(LlmError::Transient(msg))
            } else {
                Err(LlmError::Fatal(msg))
            };
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::Transient(format!("invalid response body: {}", e)))?;

        Ok(json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::{HeaderMap, StatusCode},
        routing::{get, post},
        Json, Router,
    };
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Replays a script of results, then repeats the last one.
    struct Scripted {
        script: Mutex<Vec<Result<String, LlmError>>>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(mut script: Vec<Result<String, LlmError>>) -> Self {
            script.reverse();
            Self {
                script: Mutex::new(script),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl CompletionClient for Scripted {
        async fn complete(&self, _prompt: &str) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.pop().unwrap()
            } else {
                match &script[0] {
                    Ok(s) => Ok(s.clone()),
                    Err(LlmError::Transient(m)) => Err(LlmError::Transient(m.clone())),
                    Err(LlmError::Fatal(m)) => Err(LlmError::Fatal(m.clone())),
                    Err(e) => Err(LlmError::Fatal(e.to_string())),
                }
            }
        }
    }

    fn instant(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(4), Duration::from_secs(16));
        assert_eq!(policy.delay_for(5), Duration::from_secs(30));
        assert_eq!(policy.delay_for(40), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_exactly_n_attempts_on_transient_errors() {
        for n in [1, 3, 5] {
            let client = Scripted::new(vec![Err(LlmError::Transient("503".into()))]);
            let err = complete_with_retry(&client, "p", &instant(n)).await.unwrap_err();
            assert_eq!(client.calls.load(Ordering::SeqCst), n);
            assert!(matches!(err, LlmError::Exhausted { attempts, .. } if attempts == n));
        }
    }

    #[tokio::test]
    async fn test_recovers_after_transient_errors() {
        let client = Scripted::new(vec![
            Err(LlmError::Transient("429".into())),
            Ok("   ".into()),
            Ok("verdict: compliant".into()),
        ]);
        let text = complete_with_retry(&client, "p", &instant(5)).await.unwrap();
        assert_eq!(text, "verdict: compliant");
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fatal_error_not_retried() {
        let client = Scripted::new(vec![Err(LlmError::Fatal("401".into()))]);
        let err = complete_with_retry(&client, "p", &instant(5)).await.unwrap_err();
        assert!(matches!(err, LlmError::Fatal(_)));
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    async fn spawn_fake_api(status: StatusCode, body: serde_json::Value) -> String {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(move || {
                let body = body.clone();
                async move { (status, Json(body)) }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/v1", addr)
    }

    fn client_for(base_url: String) -> OpenAiCompatClient {
        let config = LlmConfig {
            base_url,
            ..Default::default()
        };
        OpenAiCompatClient::with_api_key(&config, "test-key".into()).unwrap()
    }

    #[tokio::test]
    async fn test_openai_compat_success() {
        let base = spawn_fake_api(
            StatusCode::OK,
            serde_json::json!({ "choices": [{ "message": { "content": "hello" } }] }),
        )
        .await;
        assert_eq!(client_for(base).complete("hi").await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_openai_compat_status_mapping() {
        let base = spawn_fake_api(StatusCode::SERVICE_UNAVAILABLE, serde_json::json!({})).await;
        assert!(matches!(
            client_for(base).complete("hi").await,
            Err(LlmError::Transient(_))
        ));

        let base = spawn_fake_api(StatusCode::UNAUTHORIZED, serde_json::json!({})).await;
        assert!(matches!(
            client_for(base).complete("hi").await,
            Err(LlmError::Fatal(_))
        ));
    }

    #[tokio::test]
    async fn test_verify_rejects_bad_key() {
        let app = Router::new().route(
            "/v1/models",
            get(|headers: HeaderMap| async move {
                let authorized = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    == Some("Bearer good-key");
                if authorized {
                    StatusCode::OK
                } else {
                    StatusCode::UNAUTHORIZED
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        let config = LlmConfig {
            base_url: format!("http://{}/v1/", addr),
            ..Default::default()
        };

        let good = OpenAiCompatClient::with_api_key(&config, "good-key".into()).unwrap();
        good.verify().await.unwrap();

        let bad = OpenAiCompatClient::with_api_key(&config, "bad-key".into()).unwrap();
        let err = bad.verify().await.unwrap_err();
        assert!(matches!(err, LlmError::Fatal(ref m) if m.contains("rejected")));
    }

    #[test]
    fn test_missing_api_key_is_an_error() {
        let config = LlmConfig {
            api_key_env: "SHARIAH_AUDIT_TEST_UNSET_KEY".into(),
            ..Default::default()
        };
        let err = OpenAiCompatClient::from_config(&config).err().unwrap();
        assert!(err.to_string().contains("SHARIAH_AUDIT_TEST_UNSET_KEY"));
    }
}
