use async_trait::async_trait;

use crate::error::Result;
use crate::provider::LlmProvider;
use crate::types::{GenerateResponse, TokenUsage};

/// Deterministic in-process provider for local development and tests
/// (`ProviderKind::Mock`). Echoes the prompt back with a fixed prefix so
/// tests can assert on output without a network call.
pub struct MockProvider {
    name: String,
    models: Vec<String>,
}

impl MockProvider {
    pub fn new(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            models: vec![model.into()],
        }
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: &crate::types::GenerateRequest) -> Result<GenerateResponse> {
        Ok(GenerateResponse {
            text: format!("[mock reply] {}", request.prompt),
            provider: self.name.clone(),
            model: self.models.first().cloned().unwrap_or_default(),
            latency_ms: 0,
            usage: TokenUsage {
                prompt_tokens: request.prompt.split_whitespace().count() as u32,
                completion_tokens: 4,
            },
            finish_reason: "stop".to_string(),
        })
    }

    async fn health(&self) -> bool {
        true
    }

    fn supported_models(&self) -> &[String] {
        &self.models
    }
}
