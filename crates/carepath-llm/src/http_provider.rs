use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ProviderError, Result};
use crate::provider::LlmProvider;
use crate::types::{GenerateRequest, GenerateResponse, TokenUsage};

/// OpenAI-compatible chat-completions provider.
///
/// Most hosted LLM APIs (OpenAI itself, and a long tail of OpenAI-compatible
/// gateways) speak this wire shape, so one implementation covers every
/// `ProviderKind::Anthropic`/`OpenAi`/`Ollama` slot by pointing `base_url`
/// at the right host (§4.2: "switching providers is a configuration
/// change, not a code change").
pub struct HttpProvider {
    client: reqwest::Client,
    name: String,
    model: String,
    api_key: Option<String>,
    base_url: String,
    models: Vec<String>,
}

impl HttpProvider {
    pub fn new(name: impl Into<String>, model: impl Into<String>, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let model = model.into();
        Self {
            client: reqwest::Client::new(),
            name: name.into(),
            models: vec![model.clone()],
            model,
            api_key,
            base_url: base_url.into(),
        }
    }

    fn deadline_timeout(&self, request: &GenerateRequest) -> Option<Duration> {
        request.deadline.map(|deadline| {
            let remaining = deadline.signed_duration_since(chrono::Utc::now());
            Duration::from_millis(remaining.num_milliseconds().max(0) as u64)
        })
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[derive(Deserialize, Default)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[async_trait]
impl LlmProvider for HttpProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse> {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: request.prompt.clone(),
        });

        let body = ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: request.params.temperature,
            top_p: request.params.top_p,
            max_tokens: request.params.max_tokens,
        };

        let url = format!("{}/v1/chat/completions", self.base_url);
        let mut req = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        if let Some(timeout) = self.deadline_timeout(request) {
            req = req.timeout(timeout);
        }

        debug!(provider = %self.name, model = %self.model, "sending generate request");
        let started = Instant::now();

        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::ProviderTimeout {
                    provider: self.name.clone(),
                    elapsed_ms: started.elapsed().as_millis() as u64,
                }
            } else {
                ProviderError::ProviderUnavailable {
                    provider: self.name.clone(),
                    message: e.to_string(),
                }
            }
        })?;

        let status = resp.status();
        if status.as_u16() == 429 {
            let retry_after_ms = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs * 1000)
                .unwrap_or(5_000);
            return Err(ProviderError::ProviderRateLimited {
                provider: self.name.clone(),
                retry_after_ms,
            });
        }

        if status.is_client_error() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ProviderError::ProviderBadInput {
                provider: self.name.clone(),
                message: text,
            });
        }

        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(provider = %self.name, status = status.as_u16(), body = %text, "provider returned server error");
            return Err(ProviderError::ProviderUnavailable {
                provider: self.name.clone(),
                message: format!("http {status}: {text}"),
            });
        }

        let parsed: ChatCompletionResponse = resp.json().await.map_err(|e| {
            ProviderError::ProviderUnavailable {
                provider: self.name.clone(),
                message: format!("malformed response body: {e}"),
            }
        })?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ProviderUnavailable {
                provider: self.name.clone(),
                message: "empty choices array".to_string(),
            })?;

        let usage = parsed.usage.unwrap_or_default();

        Ok(GenerateResponse {
            text: choice.message.content,
            provider: self.name.clone(),
            model: self.model.clone(),
            latency_ms: started.elapsed().as_millis() as u64,
            usage: TokenUsage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
            },
            finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
        })
    }

    async fn health(&self) -> bool {
        let request = GenerateRequest {
            prompt: "ping".to_string(),
            system: None,
            params: crate::types::GenerateParams {
                max_tokens: 1,
                ..Default::default()
            },
            deadline: Some(chrono::Utc::now() + chrono::Duration::seconds(5)),
        };
        self.generate(&request).await.is_ok()
    }

    fn supported_models(&self) -> &[String] {
        &self.models
    }
}
