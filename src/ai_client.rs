//! Completion service clients
//!
//! One prompt in, raw text out. Two wire formats are supported: the
//! OpenAI-compatible chat completions API (Groq, OpenAI, local servers that
//! mimic it) and the Anthropic Messages API. No streaming, no retries.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::settings::{LlmBackend, Settings};

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("{0} not set")]
    MissingApiKey(&'static str),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("completion service returned no text")]
    EmptyResponse,
}

/// Anything that can turn a prompt into completion text
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;

    fn backend(&self) -> LlmBackend;

    fn model(&self) -> &str;
}

/// Connection parameters shared by both wire formats
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn from_settings(settings: &Settings) -> Result<Self, CompletionError> {
        let api_key = settings
            .api_key()
            .ok_or(CompletionError::MissingApiKey(settings.llm_backend.api_key_env()))?;

        Ok(Self {
            base_url: settings.base_url().to_string(),
            api_key: api_key.to_string(),
            model: settings.model().to_string(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            timeout: Duration::from_secs(settings.request_timeout_secs),
        })
    }

    fn http_client(&self) -> Result<reqwest::Client, CompletionError> {
        Ok(reqwest::Client::builder().timeout(self.timeout).build()?)
    }
}

/// Build the client for the configured backend
pub fn build_client(settings: &Settings) -> Result<Arc<dyn CompletionClient>, CompletionError> {
    let config = ClientConfig::from_settings(settings)?;
    let client: Arc<dyn CompletionClient> = match settings.llm_backend {
        LlmBackend::Groq | LlmBackend::OpenAi => {
            Arc::new(OpenAiCompatibleClient::new(settings.llm_backend, config)?)
        }
        LlmBackend::Anthropic => Arc::new(AnthropicClient::new(config)?),
    };
    Ok(client)
}

async fn api_error(response: reqwest::Response) -> CompletionError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    CompletionError::Api { status, body }
}

// ==================== OpenAI-compatible ====================

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageContent,
}

#[derive(Debug, Deserialize)]
struct ChatMessageContent {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    total_tokens: u64,
}

pub struct OpenAiCompatibleClient {
    backend: LlmBackend,
    config: ClientConfig,
    http: reqwest::Client,
}

impl OpenAiCompatibleClient {
    pub fn new(backend: LlmBackend, config: ClientConfig) -> Result<Self, CompletionError> {
        let http = config.http_client()?;
        Ok(Self { backend, config, http })
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompatibleClient {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage { role: "user", content: prompt }],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let started = Instant::now();
        let response = self
            .http
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let api_response: ChatResponse = response.json().await?;
        if let Some(usage) = &api_response.usage {
            tracing::debug!(total_tokens = usage.total_tokens, "completion usage");
        }

        let text = api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|t| !t.trim().is_empty())
            .ok_or(CompletionError::EmptyResponse)?;

        tracing::info!(
            backend = %self.backend,
            model = %self.config.model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            chars = text.chars().count(),
            "completion received"
        );
        Ok(text)
    }

    fn backend(&self) -> LlmBackend {
        self.backend
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

// ==================== Anthropic ====================

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

pub struct AnthropicClient {
    config: ClientConfig,
    http: reqwest::Client,
}

impl AnthropicClient {
    pub fn new(config: ClientConfig) -> Result<Self, CompletionError> {
        let http = config.http_client()?;
        Ok(Self { config, http })
    }
}

#[async_trait]
impl CompletionClient for AnthropicClient {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let request = AnthropicRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            messages: vec![ChatMessage { role: "user", content: prompt }],
        };

        let started = Instant::now();
        let response = self
            .http
            .post(format!("{}/v1/messages", self.config.base_url))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let api_response: AnthropicResponse = response.json().await?;
        if let Some(usage) = &api_response.usage {
            tracing::debug!(
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                "completion usage"
            );
        }

        let text = api_response
            .content
            .into_iter()
            .map(|block| block.text)
            .find(|t| !t.trim().is_empty())
            .ok_or(CompletionError::EmptyResponse)?;

        tracing::info!(
            backend = "anthropic",
            model = %self.config.model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            chars = text.chars().count(),
            "completion received"
        );
        Ok(text)
    }

    fn backend(&self) -> LlmBackend {
        LlmBackend::Anthropic
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{bearer_token, body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: String) -> ClientConfig {
        ClientConfig {
            base_url,
            api_key: "test-key".to_string(),
            model: "test-model".to_string(),
            max_tokens: 256,
            temperature: 0.5,
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_openai_compatible_returns_message_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(bearer_token("test-key"))
            .and(body_partial_json(serde_json::json!({
                "model": "test-model",
                "messages": [{"role": "user", "content": "hello"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "[{\"question\": \"q\"}]"}}],
                "usage": {"total_tokens": 42}
            })))
            .mount(&server)
            .await;

        let client = OpenAiCompatibleClient::new(LlmBackend::Groq, config(server.uri())).unwrap();
        let text = client.complete("hello").await.unwrap();
        assert_eq!(text, "[{\"question\": \"q\"}]");
        assert_eq!(client.model(), "test-model");
        assert_eq!(client.backend(), LlmBackend::Groq);
    }

    #[tokio::test]
    async fn test_openai_compatible_api_error_carries_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let client = OpenAiCompatibleClient::new(LlmBackend::Groq, config(server.uri())).unwrap();
        match client.complete("hello").await {
            Err(CompletionError::Api { status, body }) => {
                assert_eq!(status, 429);
                assert_eq!(body, "rate limited");
            }
            other => panic!("expected API error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_openai_compatible_empty_choices() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})))
            .mount(&server)
            .await;

        let client = OpenAiCompatibleClient::new(LlmBackend::OpenAi, config(server.uri())).unwrap();
        assert!(matches!(client.complete("hello").await, Err(CompletionError::EmptyResponse)));
    }

    #[tokio::test]
    async fn test_anthropic_sends_headers_and_reads_first_text_block() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-key"))
            .and(header("anthropic-version", "2023-06-01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [{"type": "text", "text": "generated"}],
                "usage": {"input_tokens": 10, "output_tokens": 5}
            })))
            .mount(&server)
            .await;

        let client = AnthropicClient::new(config(server.uri())).unwrap();
        assert_eq!(client.complete("hello").await.unwrap(), "generated");
    }

    #[test]
    fn test_build_client_requires_key() {
        let settings = Settings::default();
        match build_client(&settings) {
            Err(CompletionError::MissingApiKey(var)) => assert_eq!(var, "GROQ_API_KEY"),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("client built without a key"),
        }
    }

    #[test]
    fn test_build_client_picks_backend() {
        let settings = Settings {
            llm_backend: LlmBackend::Anthropic,
            anthropic_api_key: Some("sk-ant-test".to_string()),
            ..Settings::default()
        };
        let client = build_client(&settings).unwrap();
        assert_eq!(client.backend(), LlmBackend::Anthropic);
        assert_eq!(client.model(), "claude-haiku-4-5-20251001");
    }
}
