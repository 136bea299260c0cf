//! Chat-completion clients for hosted LLM APIs.
//!
//! A thin HTTP client: one POST per call, no agent framework, no retries. Supported APIs:
//!
//! - OpenAI Chat Completions (`gpt-*`, `o*` models)
//! - Azure OpenAI Chat Completions (deployment-addressed)
//! - Anthropic Messages (`claude-*` models)

use crate::config::LlmSettings;
use crate::otel::{llm_span, record_llm_usage};
use crate::types::{redact, ChatError, Result, Stage};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::time::Duration;
use tracing::Instrument;

/// Upper bound on generated tokens; one SQL statement or a short list of questions.
const MAX_TOKENS: u32 = 1024;

/// LLM provider type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAI,
    AzureOpenAI,
    Anthropic,
}

impl LlmProvider {
    /// Pick the provider from a model name.
    pub fn from_model(model: &str) -> Self {
        if model.starts_with("claude") || model.starts_with("anthropic") {
            Self::Anthropic
        } else {
            Self::OpenAI
        }
    }

    /// Environment variable holding this provider's API key.
    pub fn api_key_var(&self) -> &'static str {
        match self {
            Self::OpenAI => "OPENAI_API_KEY",
            Self::AzureOpenAI => "AZURE_OPENAI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
        }
    }

    /// Value for the `gen_ai.system` span attribute.
    pub fn system_name(&self) -> &'static str {
        match self {
            Self::OpenAI => "openai",
            Self::AzureOpenAI => "az.ai.openai",
            Self::Anthropic => "anthropic",
        }
    }
}

/// Token counts reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Anything that can answer a system + user message pair with text.
///
/// Implemented by [`HttpLlmClient`] for hosted APIs and by stubs in tests.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Run one chat completion and return the raw assistant text.
    async fn chat_complete(&self, system: &str, user: &str, temperature: f32) -> Result<String>;
}

/// OpenAI / Azure response.
#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    #[serde(default)]
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

/// Anthropic response.
#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
    #[serde(default)]
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

/// Fully built HTTP request, kept separate from sending so it can be inspected.
#[derive(Debug)]
pub(crate) struct ChatRequest {
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: JsonValue,
}

/// HTTP chat-completion client.
pub struct HttpLlmClient {
    settings: LlmSettings,
    timeout: Duration,
    client: Client,
}

impl HttpLlmClient {
    /// Create new client.
    ///
    /// # Arguments
    ///
    /// * `settings` - Provider, model and key
    /// * `timeout` - Per-request deadline applied by reqwest
    ///
    /// # Errors
    ///
    /// Returns `ChatError::Config` if the HTTP client cannot be built
    pub fn new(settings: LlmSettings, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChatError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            settings,
            timeout,
            client,
        })
    }

    pub fn provider(&self) -> LlmProvider {
        self.settings.provider
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    pub(crate) fn build_request(&self, system: &str, user: &str, temperature: f32) -> ChatRequest {
        let s = &self.settings;
        match s.provider {
            LlmProvider::OpenAI => ChatRequest {
                url: format!(
                    "{}/v1/chat/completions",
                    s.base_url
                        .as_deref()
                        .unwrap_or("https://api.openai.com")
                        .trim_end_matches('/')
                ),
                headers: vec![("Authorization", format!("Bearer {}", s.api_key))],
                body: json!({
                    "model": s.model,
                    "messages": [
                        {"role": "system", "content": system},
                        {"role": "user", "content": user}
                    ],
                    "temperature": temperature,
                    "max_tokens": MAX_TOKENS
                }),
            },
            LlmProvider::AzureOpenAI => ChatRequest {
                url: format!(
                    "{}/openai/deployments/{}/chat/completions?api-version={}",
                    s.base_url.as_deref().unwrap_or_default().trim_end_matches('/'),
                    s.model,
                    s.api_version
                ),
                headers: vec![("api-key", s.api_key.clone())],
                body: json!({
                    "messages": [
                        {"role": "system", "content": system},
                        {"role": "user", "content": user}
                    ],
                    "temperature": temperature,
                    "max_tokens": MAX_TOKENS
                }),
            },
            LlmProvider::Anthropic => ChatRequest {
                url: format!(
                    "{}/v1/messages",
                    s.base_url
                        .as_deref()
                        .unwrap_or("https://api.anthropic.com")
                        .trim_end_matches('/')
                ),
                headers: vec![
                    ("x-api-key", s.api_key.clone()),
                    ("anthropic-version", "2023-06-01".to_string()),
                ],
                body: json!({
                    "model": s.model,
                    "max_tokens": MAX_TOKENS,
                    "system": system,
                    "messages": [
                        {"role": "user", "content": user}
                    ],
                    "temperature": temperature
                }),
            },
        }
    }

    /// Extract assistant text and usage from a provider response body.
    pub(crate) fn parse_response(provider: LlmProvider, body: &str) -> Result<(String, TokenUsage)> {
        match provider {
            LlmProvider::OpenAI | LlmProvider::AzureOpenAI => {
                let parsed: OpenAIResponse = serde_json::from_str(body)
                    .map_err(|e| ChatError::Generation(format!("failed to parse LLM response: {}", e)))?;
                let usage = parsed
                    .usage
                    .map(|u| TokenUsage {
                        input_tokens: u.prompt_tokens,
                        output_tokens: u.completion_tokens,
                    })
                    .unwrap_or_default();
                let text = parsed
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.message.content)
                    .ok_or_else(|| ChatError::Generation("no response from LLM".to_string()))?;
                Ok((text, usage))
            }
            LlmProvider::Anthropic => {
                let parsed: AnthropicResponse = serde_json::from_str(body)
                    .map_err(|e| ChatError::Generation(format!("failed to parse LLM response: {}", e)))?;
                let usage = parsed
                    .usage
                    .map(|u| TokenUsage {
                        input_tokens: u.input_tokens,
                        output_tokens: u.output_tokens,
                    })
                    .unwrap_or_default();
                let text: String = parsed
                    .content
                    .into_iter()
                    .filter_map(|c| c.text)
                    .collect::<Vec<_>>()
                    .join("");
                if text.is_empty() {
                    return Err(ChatError::Generation("no response from LLM".to_string()));
                }
                Ok((text, usage))
            }
        }
    }

    fn map_send_error(&self, err: reqwest::Error) -> ChatError {
        if err.is_timeout() {
            ChatError::Timeout {
                stage: Stage::Generation,
                after: self.timeout,
            }
        } else {
            ChatError::Generation(format!(
                "LLM API request failed: {}",
                redact(&err.to_string(), &[&self.settings.api_key])
            ))
        }
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn chat_complete(&self, system: &str, user: &str, temperature: f32) -> Result<String> {
        let request = self.build_request(system, user, temperature);
        let span = llm_span(self.settings.provider.system_name(), &self.settings.model, temperature);

        async move {
            let mut builder = self.client.post(&request.url).json(&request.body);
            for (name, value) in &request.headers {
                builder = builder.header(*name, value);
            }

            let response = builder.send().await.map_err(|e| self.map_send_error(e))?;
            let status = response.status();
            let body = response.text().await.map_err(|e| self.map_send_error(e))?;

            if !status.is_success() {
                let snippet: String = body.chars().take(500).collect();
                tracing::warn!(status = %status, "LLM API returned an error");
                return Err(ChatError::Generation(format!(
                    "LLM API error {}: {}",
                    status,
                    redact(&snippet, &[&self.settings.api_key])
                )));
            }

            let (text, usage) = Self::parse_response(self.settings.provider, &body)?;
            record_llm_usage(usage.input_tokens, usage.output_tokens);
            tracing::debug!(chars = text.len(), "LLM response received");
            Ok(text)
        }
        .instrument(span)
        .await
    }
}
