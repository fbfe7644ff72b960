//! Completion service abstraction
//!
//! Provides a unified interface for chat-completion providers:
//! - OpenAI-compatible chat completions (OpenAI, OpenRouter, local gateways)
//! - JSON-mode completions deserialized into typed responses
//! - A closure-driven mock for tests

use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Chat message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

/// Trait for chat-completion generation
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Generate free text for a conversation
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;

    /// Generate a JSON document for a conversation
    async fn complete_json(&self, messages: &[ChatMessage]) -> Result<serde_json::Value> {
        let text = self.complete(messages).await?;
        parse_json_response(&text)
    }

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// JSON-mode completion deserialized into `T`
pub async fn complete_typed<T: DeserializeOwned>(
    service: &dyn CompletionService,
    messages: &[ChatMessage],
) -> Result<T> {
    let value = service.complete_json(messages).await?;
    serde_json::from_value(value).map_err(|e| AppError::LlmResponse {
        message: format!("Response did not match expected shape: {}", e),
    })
}

/// Parse model output as JSON, tolerating markdown code fences
pub fn parse_json_response(text: &str) -> Result<serde_json::Value> {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|rest| rest.trim_end().trim_end_matches("```").trim())
        .unwrap_or(trimmed);

    serde_json::from_str(body).map_err(|e| AppError::LlmResponse {
        message: format!("Invalid JSON from model: {}", e),
    })
}

/// Completion client configuration
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    /// API endpoint
    pub endpoint: String,

    /// API key
    pub api_key: String,

    /// Model name
    pub model: String,

    /// Timeout in seconds
    pub timeout_secs: u64,

    /// Retries for transient failures
    pub max_retries: u32,

    /// Temperature (0.0 - 1.0)
    pub temperature: f32,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 60,
            max_retries: 3,
            temperature: 0.3,
        }
    }
}

impl From<&crate::config::LlmConfig> for CompletionConfig {
    fn from(config: &crate::config::LlmConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone().unwrap_or_default(),
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
            temperature: config.temperature,
        }
    }
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

/// OpenAI-compatible chat-completions client
pub struct OpenAICompletion {
    config: CompletionConfig,
    client: reqwest::Client,
}

impl OpenAICompletion {
    /// Create a new completion client
    pub fn new(config: CompletionConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(AppError::Configuration {
                message: "Completion API key is not set".to_string(),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e)
            })?;

        Ok(Self { config, client })
    }

    /// Send with exponential backoff on retryable failures
    async fn send_with_retry(&self, messages: &[ChatMessage], json_mode: bool) -> Result<String> {
        let policy = ExponentialBackoff {
            initial_interval: Duration::from_millis(250),
            max_elapsed_time: Some(Duration::from_secs(self.config.timeout_secs * 2)),
            ..Default::default()
        };
        let max_retries = self.config.max_retries;
        let mut attempts = 0u32;

        retry(policy, || {
            attempts += 1;
            let attempt = attempts;
            async move {
                match self.send(messages, json_mode).await {
                    Ok(text) => Ok(text),
                    Err(e) if e.is_retryable() && attempt <= max_retries => {
                        tracing::warn!(
                            attempt,
                            max_retries,
                            error = %e,
                            "Completion request failed, retrying"
                        );
                        Err(backoff::Error::transient(e))
                    }
                    Err(e) => Err(backoff::Error::permanent(e)),
                }
            }
        })
        .await
    }

    async fn send(&self, messages: &[ChatMessage], json_mode: bool) -> Result<String> {
        let started = Instant::now();
        let request = ChatRequest {
            model: &self.config.model,
            messages,
            temperature: self.config.temperature,
            response_format: json_mode.then_some(ResponseFormat { kind: "json_object" }),
        };

        let result: Result<String> = async {
            let response = self.client
                .post(&self.config.endpoint)
                .header("Authorization", format!("Bearer {}", self.config.api_key))
                .json(&request)
                .send()
                .await?;

            let status = response.status();
            if status.is_server_error() || status.as_u16() == 429 {
                // surfaces as a retryable HttpClient error
                response.error_for_status_ref()?;
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(AppError::Llm {
                    message: format!("Completion API error {}: {}", status, body),
                });
            }

            let chat_response: ChatResponse = response.json().await
                .map_err(|e| AppError::LlmResponse {
                    message: format!("Failed to parse completion response: {}", e),
                })?;

            chat_response.choices.into_iter().next()
                .and_then(|c| c.message.content)
                .ok_or_else(|| AppError::LlmResponse {
                    message: "Empty response from completion service".to_string(),
                })
        }
        .await;

        metrics::record_completion(
            started.elapsed().as_secs_f64(),
            &self.config.model,
            result.is_ok(),
        );
        result
    }
}

#[async_trait]
impl CompletionService for OpenAICompletion {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        self.send_with_retry(messages, false).await
    }

    async fn complete_json(&self, messages: &[ChatMessage]) -> Result<serde_json::Value> {
        let text = self.send_with_retry(messages, true).await?;
        parse_json_response(&text)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

type CompletionHandler = dyn Fn(&[ChatMessage]) -> Result<String> + Send + Sync;
type CompletionDelay = dyn Fn(&[ChatMessage]) -> Duration + Send + Sync;

/// Mock completion service for testing
///
/// Every call is answered by the handler closure, which sees the full
/// conversation and can branch on the prompt it was given.
#[derive(Clone)]
pub struct MockCompletion {
    handler: Arc<CompletionHandler>,
    delay: Option<Arc<CompletionDelay>>,
    calls: Arc<AtomicUsize>,
}

impl MockCompletion {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&[ChatMessage]) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sleep before answering, duration chosen per conversation
    pub fn with_delay<F>(mut self, delay: F) -> Self
    where
        F: Fn(&[ChatMessage]) -> Duration + Send + Sync + 'static,
    {
        self.delay = Some(Arc::new(delay));
        self
    }

    /// A service that fails every call
    pub fn unreachable() -> Self {
        Self::new(|_| Err(AppError::Llm {
            message: "completion service unreachable".to_string(),
        }))
    }

    /// Number of calls made so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionService for MockCompletion {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = &self.delay {
            tokio::time::sleep(delay(messages)).await;
        }
        (self.handler)(messages)
    }

    fn model_name(&self) -> &str {
        "mock-completion"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Answer {
        value: u32,
    }

    #[test]
    fn test_parse_fenced_json() {
        let value = parse_json_response("```json\n{\"value\": 7}\n```").unwrap();
        assert_eq!(value["value"], 7);

        let value = parse_json_response("  {\"value\": 3} ").unwrap();
        assert_eq!(value["value"], 3);
    }

    #[test]
    fn test_parse_rejects_prose() {
        let err = parse_json_response("Sure! Here are your results.").unwrap_err();
        assert!(matches!(err, AppError::LlmResponse { .. }));
    }

    #[tokio::test]
    async fn test_mock_typed_completion() {
        let mock = MockCompletion::new(|messages| {
            assert_eq!(messages[0].role, Role::System);
            Ok("{\"value\": 42}".to_string())
        });

        let messages = [ChatMessage::system("sys"), ChatMessage::user("hi")];
        let answer: Answer = complete_typed(&mock, &messages).await.unwrap();

        assert_eq!(answer.value, 42);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_delay_and_model_name() {
        let mock = MockCompletion::new(|_| Ok("done".to_string()))
            .with_delay(|_| Duration::from_millis(10));

        let started = Instant::now();
        let text = mock.complete(&[ChatMessage::user("hi")]).await.unwrap();

        assert_eq!(text, "done");
        assert!(started.elapsed() >= Duration::from_millis(10));
        assert_eq!(mock.model_name(), "mock-completion");
    }

    #[tokio::test]
    async fn test_unreachable_mock() {
        let mock = MockCompletion::unreachable();
        let result = mock.complete(&[ChatMessage::user("hi")]).await;
        tokio_test::assert_err!(result);
    }

    #[test]
    fn test_client_requires_api_key() {
        let result = OpenAICompletion::new(CompletionConfig::default());
        assert!(matches!(result, Err(AppError::Configuration { .. })));
    }
}
