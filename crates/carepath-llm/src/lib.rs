pub mod circuit_breaker;
pub mod error;
pub mod http_provider;
pub mod mock;
pub mod provider;
pub mod registry;
pub mod types;

pub use circuit_breaker::BreakerState;
pub use error::ProviderError;
pub use http_provider::HttpProvider;
pub use mock::MockProvider;
pub use provider::LlmProvider;
pub use registry::{ProviderRegistry, ProviderSlot};
pub use types::{GenerateParams, GenerateRequest, GenerateResponse, TokenUsage};

use std::sync::Arc;
use std::time::Duration;

use carepath_core::config::{OrchestratorConfig, ProviderKind};

/// Instantiate the provider implementation named by a single configured
/// slot. Shared by `build_registry` and by call sites (the Intent
/// Classifier's direct primary/fallback providers, §4.4) that need a bare
/// provider rather than the full failover-chain wrapper.
pub fn build_provider(slot_config: &carepath_core::config::ProviderSlotConfig) -> Arc<dyn LlmProvider> {
    match slot_config.kind {
        ProviderKind::Mock => Arc::new(MockProvider::new(&slot_config.id, &slot_config.model)),
        ProviderKind::Anthropic | ProviderKind::OpenAi | ProviderKind::Ollama => Arc::new(HttpProvider::new(
            &slot_config.id,
            &slot_config.model,
            slot_config
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com".to_string()),
            slot_config.api_key.clone(),
        )),
    }
}

/// Build a `ProviderRegistry` from a loaded configuration document,
/// instantiating one provider implementation per configured slot in order.
pub fn build_registry(config: &OrchestratorConfig) -> ProviderRegistry {
    let cooloff = Duration::from_secs(config.rate_limits.circuit_breaker_cooloff_secs);

    let slots = config
        .providers
        .slots
        .iter()
        .map(|slot_config| ProviderSlot::new(build_provider(slot_config), slot_config.rate_limit_rpm, cooloff))
        .collect();

    ProviderRegistry::new(slots)
}
