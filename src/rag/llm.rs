//! Language model client.
//!
//! [`AnthropicClient`] calls the Messages API. Transient failures (network
//! errors, HTTP 429 and 5xx) are retried with exponential backoff plus
//! jitter; client errors fail immediately.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::GenerationError;
use crate::{Error, Result};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// One completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Text completion service.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Model identifier.
    fn model_name(&self) -> &str;

    /// Complete `request`, returning the generated text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Generation`] on transport, API or parse failure.
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: [Message<'a>; 1],
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Extract the first text block of a Messages API response body.
fn parse_response(body: &str) -> std::result::Result<String, GenerationError> {
    let response: MessagesResponse = serde_json::from_str(body)
        .map_err(|e| GenerationError::MalformedResponse(e.to_string()))?;

    response
        .content
        .into_iter()
        .find(|block| block.kind == "text")
        .and_then(|block| block.text)
        .ok_or_else(|| GenerationError::MalformedResponse("no text content in response".into()))
}

/// Anthropic Messages API client.
pub struct AnthropicClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_retries: u32,
    retry_delay: Duration,
}

impl AnthropicClient {
    /// Build a client from configuration, reading the key from the
    /// configured environment variable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the key is missing or empty.
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                Error::config(format!(
                    "missing {} environment variable",
                    config.api_key_env
                ))
            })?;

        Self::new(config, api_key)
    }

    /// Build a client with an explicit key.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &Config, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| Error::internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/v1/messages", config.api_base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            model: config.model.clone(),
            max_retries: config.max_retries,
            retry_delay: config.retry_delay(),
        })
    }

    /// Delay before retry number `attempt` (1-based): base doubling per
    /// attempt, capped at 32x, plus up to half the base as jitter.
    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.retry_delay;
        let exp = base.saturating_mul(1 << (attempt.saturating_sub(1)).min(5));
        let jitter_ms = u64::try_from(base.as_millis() / 2).unwrap_or(0);
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        };
        exp + jitter
    }

    async fn send_once(
        &self,
        request: &CompletionRequest,
    ) -> std::result::Result<String, GenerationError> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: &request.system,
            messages: [Message {
                role: "user",
                content: &request.user,
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(GenerationError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        parse_response(&text)
    }
}

#[async_trait]
impl LanguageModel for AnthropicClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let mut attempt = 0;
        loop {
            match self.send_once(request).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.backoff(attempt);
                    tracing::warn!(
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "Transient generation failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl std::fmt::Debug for AnthropicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicClient")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn request() -> CompletionRequest {
        CompletionRequest {
            system: "sys".into(),
            user: "Context:\nctx\n\nQ: why?".into(),
            max_tokens: 800,
            temperature: 0.1,
        }
    }

    /// Serve canned `(status, body)` responses, one connection each.
    async fn serve(responses: Vec<(u16, &'static str)>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = vec![0u8; 64 * 1024];
                let mut received = Vec::new();
                loop {
                    let n = socket.read(&mut buf).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    received.extend_from_slice(&buf[..n]);
                    let text = String::from_utf8_lossy(&received);
                    if let Some(end) = text.find("\r\n\r\n") {
                        let length = text[..end]
                            .lines()
                            .find_map(|l| {
                                let lower = l.to_ascii_lowercase();
                                lower
                                    .strip_prefix("content-length:")
                                    .map(|v| v.trim().parse::<usize>().unwrap())
                            })
                            .unwrap_or(0);
                        if received.len() >= end + 4 + length {
                            break;
                        }
                    }
                }
                counter.fetch_add(1, Ordering::SeqCst);

                let response = format!(
                    "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
        });

        (format!("http://{addr}"), hits)
    }

    fn client(base_url: String, max_retries: u32) -> AnthropicClient {
        let config = Config {
            api_base_url: base_url,
            max_retries,
            retry_delay_ms: 1,
            ..Config::default()
        };
        AnthropicClient::new(&config, "test-key").unwrap()
    }

    const OK_BODY: &str = r#"{"content":[{"type":"text","text":"The answer."}]}"#;

    #[test]
    fn test_parse_response() {
        assert_eq!(parse_response(OK_BODY).unwrap(), "The answer.");

        let tool_first = r#"{"content":[{"type":"tool_use"},{"type":"text","text":"hi"}]}"#;
        assert_eq!(parse_response(tool_first).unwrap(), "hi");

        assert!(matches!(
            parse_response(r#"{"content":[]}"#),
            Err(GenerationError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_response("not json"),
            Err(GenerationError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_from_config_requires_key() {
        let config = Config {
            api_key_env: "RAGSYNC_TEST_KEY_THAT_IS_NEVER_SET".into(),
            ..Config::default()
        };
        let err = AnthropicClient::from_config(&config).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("RAGSYNC_TEST_KEY_THAT_IS_NEVER_SET"));
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let client = client("http://localhost".into(), 3);
        let base = Duration::from_millis(1);

        assert!(client.backoff(1) >= base);
        assert!(client.backoff(3) >= base * 4);
        assert!(client.backoff(20) <= base * 32 + base);
    }

    #[tokio::test]
    async fn test_complete_success() {
        let (url, hits) = serve(vec![(200, OK_BODY)]).await;
        let text = client(url, 0).complete(&request()).await.unwrap();

        assert_eq!(text, "The answer.");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_complete_retries_server_errors() {
        let (url, hits) = serve(vec![
            (500, r#"{"error":"boom"}"#),
            (429, r#"{"error":"slow down"}"#),
            (200, OK_BODY),
        ])
        .await;
        let text = client(url, 3).complete(&request()).await.unwrap();

        assert_eq!(text, "The answer.");
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_complete_does_not_retry_client_errors() {
        let (url, hits) = serve(vec![(401, r#"{"error":"bad key"}"#), (200, OK_BODY)]).await;
        let err = client(url, 3).complete(&request()).await.unwrap_err();

        assert!(matches!(
            err,
            Error::Generation(GenerationError::Api { status: 401, .. })
        ));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_complete_gives_up_after_retries() {
        let (url, hits) = serve(vec![(503, "{}"), (503, "{}")]).await;
        let err = client(url, 1).complete(&request()).await.unwrap_err();

        assert!(matches!(
            err,
            Error::Generation(GenerationError::Api { status: 503, .. })
        ));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
