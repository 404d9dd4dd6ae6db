use serde::Serialize;

/// Where a classification result came from (§4.4); feeds the fixed
/// confidence table and the `llm_fallback_used`/`provider_timeout` metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentSource {
    Pattern,
    LlmPrimary,
    LlmFallback,
    Default,
}

impl IntentSource {
    /// Fixed confidence table (§4.4, the spec's resolved open question).
    pub fn confidence(self) -> f32 {
        match self {
            IntentSource::Pattern => 1.0,
            IntentSource::LlmPrimary => 0.9,
            IntentSource::LlmFallback => 0.7,
            IntentSource::Default => 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IntentOutcome {
    pub intent: String,
    pub confidence: f32,
    pub source: IntentSource,
}

impl IntentOutcome {
    pub fn new(intent: impl Into<String>, source: IntentSource) -> Self {
        Self {
            intent: intent.into(),
            confidence: source.confidence(),
            source,
        }
    }

    pub fn is_emergency(&self) -> bool {
        self.intent == crate::rules::MEDICAL_EMERGENCY
    }
}
