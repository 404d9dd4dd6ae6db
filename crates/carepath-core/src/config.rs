use std::collections::HashMap;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, Result};

// ---------------------------------------------------------------------------
// Protocol-level constants (§3, §4, §6)
// ---------------------------------------------------------------------------

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const MAX_MESSAGE_CHARS: usize = 2000;
pub const MIN_USER_ID_CHARS: usize = 1;
pub const MAX_USER_ID_CHARS: usize = 100;
pub const MAX_HISTORY_LEN: usize = 50;
pub const DEFAULT_SESSION_TTL_SECS: u64 = 3600;
pub const APPEND_RETRY_ATTEMPTS: u32 = 3;
pub const APPEND_RETRY_JITTER_MS: u64 = 10;
pub const TRIMMED_HISTORY_TURNS: usize = 3;
pub const DEFAULT_DISPATCH_FLUSH_DEADLINE_MS: u64 = 2_000;
pub const DEFAULT_PROVIDER_RATE_LIMIT_RPM: u32 = 60;
pub const DEFAULT_CIRCUIT_BREAKER_COOLOFF_SECS: u64 = 30;
pub const SWEEPER_INTERVAL_MS: u64 = 250;
pub const DEFAULT_CONSUMER_GROUP: &str = "orchestrator";
pub const DEFAULT_CHAT_RATE_LIMIT_RPM: u32 = 30;
pub const METRICS_LATENCY_SAMPLE_CAP: usize = 2_000;

/// Top-level configuration document (`orchestrator.toml` + `ORCHESTRATOR_*` env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub session_store: SessionStoreConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
    #[serde(default)]
    pub intent: IntentConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub rate_limits: RateLimitConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            session_store: SessionStoreConfig::default(),
            providers: ProvidersConfig::default(),
            prompts: PromptsConfig::default(),
            intent: IntentConfig::default(),
            bus: BusConfig::default(),
            agents: AgentsConfig::default(),
            rate_limits: RateLimitConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Load config from a TOML file with `ORCHESTRATOR_*` env var overrides.
    ///
    /// Checks in order: explicit path argument, then `./orchestrator.toml`.
    /// Validation happens eagerly so a misconfigured deployment fails at
    /// startup rather than deep inside a request path.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path.unwrap_or("orchestrator.toml");

        let config: OrchestratorConfig = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("ORCHESTRATOR_").split("__"))
            .extract()
            .map_err(|e| OrchestratorError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.providers.slots.is_empty() {
            return Err(OrchestratorError::Config(
                "providers.slots must list at least one LLM provider".to_string(),
            ));
        }
        if self.session_store.max_history == 0 {
            return Err(OrchestratorError::Config(
                "session_store.max_history must be greater than zero".to_string(),
            ));
        }
        if self.bus.brokers.is_empty() {
            return Err(OrchestratorError::Config(
                "bus.brokers must list at least one broker address".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

/// Session Store backing configuration (§4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStoreConfig {
    /// `redis://host:port` address of the shared session store.
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

impl Default for SessionStoreConfig {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
            ttl_secs: DEFAULT_SESSION_TTL_SECS,
            max_history: MAX_HISTORY_LEN,
        }
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}
fn default_ttl() -> u64 {
    DEFAULT_SESSION_TTL_SECS
}
fn default_max_history() -> usize {
    MAX_HISTORY_LEN
}

/// A single LLM provider slot in the failover chain (§4.2), ordered:
/// index 0 is primary, the rest are fallbacks tried in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSlotConfig {
    /// Stable identifier used in logs and `/metrics` (e.g. `"anthropic"`).
    pub id: String,
    pub kind: ProviderKind,
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_rate_limit_rpm")]
    pub rate_limit_rpm: u32,
}

fn default_rate_limit_rpm() -> u32 {
    DEFAULT_PROVIDER_RATE_LIMIT_RPM
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    Anthropic,
    OpenAi,
    Ollama,
    /// Deterministic in-process provider used in tests and local dev.
    Mock,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub slots: Vec<ProviderSlotConfig>,
}

/// Prompt Registry configuration (§4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptsConfig {
    #[serde(default = "default_prompts_dir")]
    pub dir: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            dir: default_prompts_dir(),
        }
    }
}

fn default_prompts_dir() -> String {
    "prompts".to_string()
}

/// Intent Classifier configuration (§4.4).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IntentConfig {
    /// Optional path to a rules file overriding the built-in pattern rules.
    pub rules_path: Option<String>,
}

/// Message Bus Client configuration (§4.6, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    #[serde(default)]
    pub brokers: Vec<String>,
    #[serde(default = "default_consumer_group")]
    pub consumer_group: String,
    #[serde(default = "default_flush_deadline")]
    pub flush_deadline_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            brokers: Vec::new(),
            consumer_group: default_consumer_group(),
            flush_deadline_ms: DEFAULT_DISPATCH_FLUSH_DEADLINE_MS,
        }
    }
}

fn default_consumer_group() -> String {
    DEFAULT_CONSUMER_GROUP.to_string()
}
fn default_flush_deadline() -> u64 {
    DEFAULT_DISPATCH_FLUSH_DEADLINE_MS
}

/// A single entry of the Agent Router's intent → dispatch-descriptor table (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTopicConfig {
    pub request_topic: String,
    pub response_topic: String,
    pub task_type: String,
    pub payload_builder: String,
    pub soft_deadline_ms: u64,
    pub hard_deadline_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentsConfig {
    /// Intent name → dispatch descriptor. Unknown intents fall back to the
    /// built-in `general_info` handler (§4.5).
    #[serde(default)]
    pub table: HashMap<String, AgentTopicConfig>,
}

/// Global and per-provider rate limiting and deadline configuration (§5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_limit_rpm")]
    pub default_provider_rpm: u32,
    #[serde(default = "default_cooloff")]
    pub circuit_breaker_cooloff_secs: u64,
    /// Per-user_id token bucket on `POST /chat`, enforced at the gateway
    /// (distinct from the per-provider LLM rate limits above).
    #[serde(default = "default_chat_rpm")]
    pub per_user_chat_rpm: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default_provider_rpm: DEFAULT_PROVIDER_RATE_LIMIT_RPM,
            circuit_breaker_cooloff_secs: DEFAULT_CIRCUIT_BREAKER_COOLOFF_SECS,
            per_user_chat_rpm: default_chat_rpm(),
        }
    }
}

fn default_cooloff() -> u64 {
    DEFAULT_CIRCUIT_BREAKER_COOLOFF_SECS
}

fn default_chat_rpm() -> u32 {
    DEFAULT_CHAT_RATE_LIMIT_RPM
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_fails_validation_without_providers() {
        let config = OrchestratorConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_passes_with_minimal_viable_config() {
        let mut config = OrchestratorConfig::default();
        config.providers.slots.push(ProviderSlotConfig {
            id: "mock".to_string(),
            kind: ProviderKind::Mock,
            model: "mock-1".to_string(),
            api_key: None,
            base_url: None,
            max_retries: 0,
            rate_limit_rpm: 60,
        });
        config.bus.brokers.push("localhost:9092".to_string());
        assert!(config.validate().is_ok());
    }
}
