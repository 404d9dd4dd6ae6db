use std::collections::HashMap;
use std::sync::Arc;

use carepath_llm::{GenerateParams, GenerateRequest, LlmProvider};
use carepath_prompts::PromptRegistry;
use tracing::{info, warn};

use crate::rules::{default_rules, match_pattern, PatternRule, GENERAL_INFO, VOCABULARY};
use crate::types::{IntentOutcome, IntentSource};

const INTENT_RECOGNITION_TEMPLATE: &str = "intent_recognition";

fn normalize(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .trim_matches(|c: char| c.is_ascii_punctuation())
        .to_string()
}

/// Runs the three-stage classification algorithm from §4.4: pattern pass,
/// then a primary/fallback LLM pass constrained to a closed vocabulary,
/// then a `general_info` default.
pub struct IntentClassifier {
    rules: Vec<PatternRule>,
    prompts: Arc<PromptRegistry>,
    primary: Arc<dyn LlmProvider>,
    fallback: Option<Arc<dyn LlmProvider>>,
}

impl IntentClassifier {
    pub fn new(
        prompts: Arc<PromptRegistry>,
        primary: Arc<dyn LlmProvider>,
        fallback: Option<Arc<dyn LlmProvider>>,
    ) -> Self {
        Self {
            rules: default_rules(),
            prompts,
            primary,
            fallback,
        }
    }

    pub async fn classify(&self, message: &str) -> IntentOutcome {
        if let Some(intent) = match_pattern(&self.rules, message) {
            return IntentOutcome::new(intent, IntentSource::Pattern);
        }

        if let Some(intent) = self.try_llm(&self.primary, message).await {
            return IntentOutcome::new(intent, IntentSource::LlmPrimary);
        }

        if let Some(fallback) = &self.fallback {
            if let Some(intent) = self.try_llm(fallback, message).await {
                return IntentOutcome::new(intent, IntentSource::LlmFallback);
            }
        }

        info!(message_len = message.len(), "intent classification fell through to default");
        IntentOutcome::new(GENERAL_INFO, IntentSource::Default)
    }

    async fn try_llm(&self, provider: &Arc<dyn LlmProvider>, message: &str) -> Option<String> {
        let prompt = match self.render_prompt(message) {
            Ok(p) => p,
            Err(err) => {
                warn!(err = %err, "failed to render intent_recognition template");
                return None;
            }
        };

        let request = GenerateRequest {
            prompt,
            system: None,
            params: GenerateParams {
                temperature: 0.0,
                max_tokens: 16,
                ..Default::default()
            },
            deadline: None,
        };

        match provider.generate(&request).await {
            Ok(response) => {
                let normalized = normalize(&response.text);
                if VOCABULARY.contains(&normalized.as_str()) {
                    Some(normalized)
                } else {
                    warn!(provider = provider.name(), output = %response.text, "LLM intent output outside closed vocabulary");
                    None
                }
            }
            Err(err) => {
                warn!(provider = provider.name(), err = %err, "intent classification provider call failed");
                None
            }
        }
    }

    fn render_prompt(&self, message: &str) -> carepath_prompts::error::Result<String> {
        let mut values = HashMap::new();
        values.insert("message".to_string(), message.to_string());
        values.insert("vocabulary".to_string(), VOCABULARY.join(", "));
        self.prompts.render(INTENT_RECOGNITION_TEMPLATE, &values)
    }
}
