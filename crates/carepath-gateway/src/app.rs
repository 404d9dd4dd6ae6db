use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use carepath_bus::{KafkaBusClient, MessageBusClient};
use carepath_core::config::OrchestratorConfig;
use carepath_correlation::CorrelationRegistry;
use carepath_engine::ConversationEngine;
use carepath_intent::IntentClassifier;
use carepath_llm::{build_provider, build_registry, ProviderRegistry};
use carepath_prompts::PromptRegistry;
use carepath_push::PushChannelHub;
use carepath_router::AgentRouter;
use carepath_sessions::{RedisSessionStore, SessionStore};
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::metrics::Metrics;

type UserRateLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, governor::clock::DefaultClock>;

/// Central shared state for every Axum handler (§6).
pub struct AppState {
    pub config: OrchestratorConfig,
    pub session_store: Arc<dyn SessionStore>,
    pub bus_client: Arc<dyn MessageBusClient>,
    pub correlation_registry: Arc<CorrelationRegistry>,
    pub push_hub: Arc<PushChannelHub>,
    pub engine: Arc<ConversationEngine>,
    pub prompt_registry: Arc<PromptRegistry>,
    pub provider_registry: Arc<ProviderRegistry>,
    pub metrics: Metrics,
    pub chat_rate_limiter: UserRateLimiter,
    sweeper_shutdown: CancellationToken,
    sweeper_handle: tokio::task::JoinHandle<()>,
    reload_handle: tokio::task::JoinHandle<()>,
}

impl AppState {
    pub async fn new(config: OrchestratorConfig) -> anyhow::Result<Self> {
        let session_store: Arc<dyn SessionStore> =
            Arc::new(RedisSessionStore::connect(&config.session_store.redis_url, config.session_store.ttl_secs).await?);

        let bus_client: Arc<dyn MessageBusClient> = Arc::new(KafkaBusClient::new(
            &config.bus.brokers,
            &config.bus.consumer_group,
            Duration::from_millis(config.bus.flush_deadline_ms),
        )?);

        let prompt_registry = Arc::new(PromptRegistry::load(config.prompts.dir.clone()).await?);
        let reload_handle = carepath_prompts::spawn_sighup_reload(prompt_registry.clone());

        let mut providers = config.providers.slots.iter();
        let primary_config = providers
            .next()
            .ok_or_else(|| anyhow::anyhow!("providers.slots must list at least one LLM provider"))?;
        let primary = build_provider(primary_config);
        let fallback = providers.next().map(build_provider);

        let intent_classifier = Arc::new(IntentClassifier::new(prompt_registry.clone(), primary, fallback));
        let provider_registry = Arc::new(build_registry(&config));
        let agent_router = Arc::new(AgentRouter::new(&config.agents));
        let correlation_registry = Arc::new(CorrelationRegistry::new());
        let push_hub = Arc::new(PushChannelHub::new(session_store.clone()));

        let engine = Arc::new(ConversationEngine::new(
            session_store.clone(),
            intent_classifier,
            agent_router,
            bus_client.clone(),
            correlation_registry.clone(),
            push_hub.clone(),
            config.session_store.max_history,
        ));

        for topic in response_topics(&config) {
            bus_client.subscribe(&topic, engine.clone()).await?;
            info!(topic, "gateway subscribed engine to agent response topic");
        }

        let sweeper_shutdown = CancellationToken::new();
        let sweeper_handle = carepath_correlation::spawn_sweeper(
            correlation_registry.clone(),
            engine.clone(),
            sweeper_shutdown.clone(),
        );

        let rpm = NonZeroU32::new(config.rate_limits.per_user_chat_rpm.max(1)).expect("per_user_chat_rpm > 0");
        let chat_rate_limiter = RateLimiter::keyed(Quota::per_minute(rpm));

        Ok(Self {
            config,
            session_store,
            bus_client,
            correlation_registry,
            push_hub,
            engine,
            prompt_registry,
            provider_registry,
            metrics: Metrics::new(),
            chat_rate_limiter,
            sweeper_shutdown,
            sweeper_handle,
            reload_handle,
        })
    }

    /// Stop background tasks and flush the bus producer on graceful exit.
    pub async fn shutdown(&self) {
        self.sweeper_shutdown.cancel();
        self.sweeper_handle.abort();
        self.reload_handle.abort();
        if let Err(err) = self.bus_client.shutdown().await {
            tracing::warn!(err = %err, "bus client shutdown reported an error");
        }
    }
}

/// Every response topic the agent table (plus the built-in `general_info`
/// fallback) names, so the gateway's single `ConversationEngine` consumes
/// every configured agent's responses (§4.6).
fn response_topics(config: &OrchestratorConfig) -> Vec<String> {
    let mut topics: Vec<String> = config.agents.table.values().map(|a| a.response_topic.clone()).collect();
    const BUILTIN_GENERAL_INFO_RESPONSE_TOPIC: &str = "knowledge-base-responses";
    if !topics.iter().any(|t| t == BUILTIN_GENERAL_INFO_RESPONSE_TOPIC) {
        topics.push(BUILTIN_GENERAL_INFO_RESPONSE_TOPIC.to_string());
    }
    topics
}

/// Assemble the full Axum router (§6).
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/chat", post(crate::http::chat::chat_handler))
        .route(
            "/session/{id}",
            get(crate::http::session::get_session_handler).delete(crate::http::session::delete_session_handler),
        )
        .route("/health", get(crate::http::health::health_handler))
        .route("/metrics", get(crate::http::metrics::metrics_handler))
        .route("/ws/{session_id}", get(crate::ws::connection::ws_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
