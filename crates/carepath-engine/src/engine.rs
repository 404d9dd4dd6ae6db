use std::sync::Arc;

use async_trait::async_trait;
use carepath_bus::{
    MessageBusClient, TaskRequestPayload, TaskResponseEnvelope, TaskResponseHandler, TaskResponseStatus,
};
use carepath_core::config::{MAX_MESSAGE_CHARS, MAX_USER_ID_CHARS, MIN_USER_ID_CHARS};
use carepath_core::{
    ConversationMessage, CorrelationId, Language, MessageMetadata, MessageRole, MessageStatus, OrchestratorError,
    PendingTask, Result, Session, SessionId, TaskStatus,
};
use carepath_correlation::{CorrelationEntry, CorrelationObserver, CorrelationRegistry};
use carepath_intent::{IntentClassifier, IntentOutcome, MEDICAL_EMERGENCY};
use carepath_push::{FinalResult, PushChannelHub};
use carepath_router::AgentRouter;
use carepath_sessions::{SessionStore, SessionStoreError};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::payload::{placeholder_for_intent, trimmed_history, user_context_json};
use crate::request::{ChatRequest, ChatResponse};

const EMERGENCY_RESPONSE: &str = "This sounds like a medical emergency. Please call your local emergency number \
    right away or go to the nearest emergency room. If you are with someone else, ask them to call for you.";

/// Per-request orchestration (§4.9): validate, resolve session, classify,
/// dispatch-or-answer, return a provisional (or, on short-circuit, final)
/// response.
pub struct ConversationEngine {
    session_store: Arc<dyn SessionStore>,
    intent_classifier: Arc<IntentClassifier>,
    agent_router: Arc<AgentRouter>,
    bus_client: Arc<dyn MessageBusClient>,
    correlation_registry: Arc<CorrelationRegistry>,
    push_hub: Arc<PushChannelHub>,
    max_history: usize,
}

impl ConversationEngine {
    pub fn new(
        session_store: Arc<dyn SessionStore>,
        intent_classifier: Arc<IntentClassifier>,
        agent_router: Arc<AgentRouter>,
        bus_client: Arc<dyn MessageBusClient>,
        correlation_registry: Arc<CorrelationRegistry>,
        push_hub: Arc<PushChannelHub>,
        max_history: usize,
    ) -> Self {
        Self {
            session_store,
            intent_classifier,
            agent_router,
            bus_client,
            correlation_registry,
            push_hub,
            max_history,
        }
    }

    #[instrument(skip(self, request), fields(user_id = %request.user_id))]
    pub async fn process_chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        if request.message.chars().count() > MAX_MESSAGE_CHARS {
            return Err(OrchestratorError::Validation(format!(
                "message exceeds {MAX_MESSAGE_CHARS} characters"
            )));
        }
        if request.message.trim().is_empty() {
            return Err(OrchestratorError::Validation("message must not be empty".to_string()));
        }
        let user_id_len = request.user_id.chars().count();
        if user_id_len < MIN_USER_ID_CHARS || user_id_len > MAX_USER_ID_CHARS {
            return Err(OrchestratorError::Validation(format!(
                "user_id must be between {MIN_USER_ID_CHARS} and {MAX_USER_ID_CHARS} characters"
            )));
        }

        let session_id = request.session_id.unwrap_or_default();
        let (session, degraded) = self.resolve_session(session_id, &request).await?;

        let user_message = ConversationMessage {
            timestamp: chrono::Utc::now(),
            role: MessageRole::User,
            content: request.message.clone(),
            metadata: MessageMetadata::default(),
        };

        let session_after_user_turn = if degraded {
            session
        } else {
            self.session_store
                .append_message(session_id, user_message, self.max_history)
                .await
                .map_err(store_error)?
        };

        let outcome = self.intent_classifier.classify(&request.message).await;

        if outcome.intent == MEDICAL_EMERGENCY {
            return self
                .handle_emergency(session_id, session_after_user_turn, outcome, degraded)
                .await;
        }

        let descriptor = self.agent_router.route(&outcome.intent);
        let correlation_id = CorrelationId::new();
        let placeholder = placeholder_for_intent(&outcome.intent, &descriptor);

        let payload = TaskRequestPayload {
            user_message: request.message.clone(),
            session_id,
            user_context: user_context_json(request.context.as_ref()),
            trimmed_history: trimmed_history(&session_after_user_turn),
        };

        let provisional_message = ConversationMessage {
            timestamp: chrono::Utc::now(),
            role: MessageRole::Assistant,
            content: placeholder.clone(),
            metadata: MessageMetadata {
                intent: Some(outcome.intent.clone()),
                confidence: Some(outcome.confidence),
                correlation_id: Some(correlation_id),
                status: Some(MessageStatus::Pending),
            },
        };

        if !degraded {
            let mut session = self
                .session_store
                .append_message(session_id, provisional_message, self.max_history)
                .await
                .map_err(store_error)?;
            session.pending_tasks.push(PendingTask {
                task_id: correlation_id,
                task_type: descriptor.task_type.clone(),
                status: TaskStatus::Pending,
                created_at: chrono::Utc::now(),
                deadline: chrono::Utc::now() + chrono::Duration::from_std(descriptor.hard_deadline).unwrap(),
            });
            self.session_store.put(session).await.map_err(store_error)?;
        }

        match self
            .bus_client
            .dispatch(session_id, correlation_id, &descriptor, payload)
            .await
        {
            Ok(()) => {
                self.correlation_registry.register(
                    correlation_id,
                    CorrelationEntry {
                        session_id,
                        user_id: request.user_id.clone(),
                        agent_response_topic: descriptor.response_topic.clone(),
                        deadline: chrono::Utc::now() + chrono::Duration::from_std(descriptor.hard_deadline).unwrap(),
                        cancel: CancellationToken::new(),
                    },
                );

                Ok(ChatResponse {
                    session_id,
                    correlation_id: Some(correlation_id),
                    intent: outcome.intent,
                    confidence: outcome.confidence,
                    response: placeholder,
                    requires_human_handoff: false,
                    suggested_actions: vec!["wait_for_agent_response".to_string()],
                    degraded,
                })
            }
            Err(err) => {
                warn!(correlation_id = %correlation_id, err = %err, "dispatch failed, synthesizing inline completion");
                let error_text = "We couldn't reach the right team right now. A staff member will follow up with \
                    you shortly."
                    .to_string();

                if !degraded {
                    let result = FinalResult {
                        correlation_id,
                        response_text: error_text.clone(),
                        intent: Some(outcome.intent.clone()),
                        requires_human_handoff: true,
                        suggested_actions: vec![],
                        status: MessageStatus::Error,
                    };
                    if let Err(push_err) = self.push_hub.deliver_final_response(session_id, result).await {
                        warn!(err = %push_err, "failed to apply dispatch-timeout completion to session");
                    }
                }

                Ok(ChatResponse {
                    session_id,
                    correlation_id: None,
                    intent: outcome.intent,
                    confidence: outcome.confidence,
                    response: error_text,
                    requires_human_handoff: true,
                    suggested_actions: vec![],
                    degraded,
                })
            }
        }
    }

    async fn handle_emergency(
        &self,
        session_id: SessionId,
        session_after_user_turn: Session,
        outcome: IntentOutcome,
        degraded: bool,
    ) -> Result<ChatResponse> {
        info!(session_id = %session_id, "medical emergency override, bypassing dispatch");
        let message = ConversationMessage {
            timestamp: chrono::Utc::now(),
            role: MessageRole::Assistant,
            content: EMERGENCY_RESPONSE.to_string(),
            metadata: MessageMetadata {
                intent: Some(outcome.intent.clone()),
                confidence: Some(outcome.confidence),
                correlation_id: None,
                status: Some(MessageStatus::Completed),
            },
        };

        if !degraded {
            self.session_store
                .append_message(session_id, message, self.max_history)
                .await
                .map_err(store_error)?;
        }
        let _ = session_after_user_turn;

        Ok(ChatResponse {
            session_id,
            correlation_id: None,
            intent: outcome.intent,
            confidence: outcome.confidence,
            response: EMERGENCY_RESPONSE.to_string(),
            requires_human_handoff: true,
            suggested_actions: vec!["call_emergency_services".to_string()],
            degraded,
        })
    }

    /// Resolve or lazily create a session. On a store outage, falls back to
    /// an ephemeral in-memory session and reports `degraded: true` (§4.1).
    async fn resolve_session(
        &self,
        session_id: SessionId,
        request: &ChatRequest,
    ) -> Result<(Session, bool)> {
        match self.session_store.get(session_id).await {
            Ok(Some(session)) => Ok((session, false)),
            Ok(None) => {
                let language = request.context.as_ref().and_then(|c| c.language).unwrap_or(Language::En);
                let session = Session::new(session_id, request.user_id.clone(), language);
                self.session_store.put(session.clone()).await.map_err(store_error)?;
                Ok((session, false))
            }
            Err(SessionStoreError::Unavailable(reason)) => {
                warn!(session_id = %session_id, reason, "session store unreachable, degrading to stateless mode");
                let language = request.context.as_ref().and_then(|c| c.language).unwrap_or(Language::En);
                Ok((Session::new(session_id, request.user_id.clone(), language), true))
            }
            Err(err) => Err(store_error(err)),
        }
    }
}

fn store_error(err: SessionStoreError) -> OrchestratorError {
    match err {
        SessionStoreError::Unavailable(msg) => OrchestratorError::StoreOutage(msg),
        SessionStoreError::Conflict { session_id } => {
            OrchestratorError::Internal(format!("session {session_id} lost its write-race retry budget"))
        }
        SessionStoreError::Codec(msg) => OrchestratorError::Internal(format!("session codec error: {msg}")),
    }
}

/// Routes an agent's task response to the push hub, honoring
/// at-least-once/idempotent semantics (a correlation already resolved by
/// the sweeper is simply absent from the registry and the response is
/// dropped, §5 "sweeper's synthetic timeout is idempotent with a later
/// real response").
#[async_trait]
impl TaskResponseHandler for ConversationEngine {
    async fn handle(&self, envelope: TaskResponseEnvelope) {
        let Some(entry) = self.correlation_registry.resolve(envelope.correlation_id) else {
            info!(correlation_id = %envelope.correlation_id, "task response for unknown/already-resolved correlation, dropping");
            return;
        };

        let status = match envelope.status {
            TaskResponseStatus::Success => MessageStatus::Completed,
            TaskResponseStatus::Error => MessageStatus::Error,
        };

        let result = FinalResult {
            correlation_id: envelope.correlation_id,
            response_text: envelope.result.response_text,
            intent: None,
            requires_human_handoff: envelope.result.requires_human_handoff,
            suggested_actions: envelope.result.suggested_actions,
            status,
        };

        if let Err(err) = self.push_hub.deliver_final_response(entry.session_id, result).await {
            warn!(session_id = %entry.session_id, err = %err, "failed to deliver agent response");
        }
    }
}

/// Synthesizes the `AGENT_TIMEOUT` completion for a correlation the
/// sweeper closed with no response (§4.7).
#[async_trait]
impl CorrelationObserver for ConversationEngine {
    async fn on_timeout(&self, correlation_id: CorrelationId, entry: CorrelationEntry) {
        let result = FinalResult {
            correlation_id,
            response_text: "We're taking longer than expected to get you an answer. A staff member will follow up \
                shortly."
                .to_string(),
            intent: None,
            requires_human_handoff: true,
            suggested_actions: vec![],
            status: MessageStatus::Error,
        };

        if let Err(err) = self.push_hub.deliver_final_response(entry.session_id, result).await {
            warn!(session_id = %entry.session_id, err = %err, "failed to deliver agent-timeout completion");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap as StdHashMap;

    use carepath_bus::{InMemoryBusClient, TaskRequestPayload, TaskResponseStatus, TaskResult};
    use carepath_core::config::{AgentTopicConfig, AgentsConfig};
    use carepath_llm::MockProvider;
    use carepath_prompts::PromptRegistry;
    use carepath_sessions::InMemorySessionStore;

    use super::*;

    fn agents_config() -> AgentsConfig {
        let mut table = StdHashMap::new();
        table.insert(
            "appointment_booking".to_string(),
            AgentTopicConfig {
                request_topic: "appointment-agent-requests".to_string(),
                response_topic: "appointment-agent-responses".to_string(),
                task_type: "book_appointment".to_string(),
                payload_builder: "appointment_booking".to_string(),
                soft_deadline_ms: 3_000,
                hard_deadline_ms: 6_000,
            },
        );
        AgentsConfig { table }
    }

    async fn prompt_registry() -> Arc<PromptRegistry> {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("intent_recognition.txt"),
            "Classify: {{message}}. Options: {{vocabulary}}.",
        )
        .unwrap();
        Arc::new(PromptRegistry::load(dir.path()).await.unwrap())
    }

    struct FailingBusClient;

    #[async_trait]
    impl MessageBusClient for FailingBusClient {
        async fn dispatch(
            &self,
            _session_id: SessionId,
            _correlation_id: CorrelationId,
            _descriptor: &carepath_router::DispatchDescriptor,
            _payload: TaskRequestPayload,
        ) -> std::result::Result<(), carepath_bus::BusError> {
            Err(carepath_bus::BusError::DispatchTimeout { elapsed_ms: 2_000 })
        }
        async fn subscribe(
            &self,
            _response_topic: &str,
            _handler: Arc<dyn TaskResponseHandler>,
        ) -> std::result::Result<(), carepath_bus::BusError> {
            Ok(())
        }
        async fn shutdown(&self) -> std::result::Result<(), carepath_bus::BusError> {
            Ok(())
        }
    }

    fn chat_request(message: &str) -> ChatRequest {
        ChatRequest {
            user_id: "u-1".to_string(),
            session_id: None,
            message: message.to_string(),
            context: None,
        }
    }

    #[tokio::test]
    async fn over_length_message_is_rejected() {
        let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
        let bus: Arc<dyn MessageBusClient> = Arc::new(InMemoryBusClient::new());
        let engine = ConversationEngine::new(
            store.clone(),
            Arc::new(IntentClassifier::new(
                prompt_registry().await,
                Arc::new(MockProvider::new("primary", "m")),
                None,
            )),
            Arc::new(AgentRouter::new(&agents_config())),
            bus,
            Arc::new(CorrelationRegistry::new()),
            Arc::new(PushChannelHub::new(store)),
            50,
        );
        let request = chat_request(&"a".repeat(3000));
        let result = engine.process_chat(request).await;
        assert!(matches!(result, Err(OrchestratorError::Validation(_))));
    }

    #[tokio::test]
    async fn out_of_range_user_id_is_rejected() {
        let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
        let bus: Arc<dyn MessageBusClient> = Arc::new(InMemoryBusClient::new());
        let engine = ConversationEngine::new(
            store.clone(),
            Arc::new(IntentClassifier::new(
                prompt_registry().await,
                Arc::new(MockProvider::new("primary", "m")),
                None,
            )),
            Arc::new(AgentRouter::new(&agents_config())),
            bus,
            Arc::new(CorrelationRegistry::new()),
            Arc::new(PushChannelHub::new(store)),
            50,
        );

        let mut empty_user_id = chat_request("hello");
        empty_user_id.user_id = String::new();
        assert!(matches!(
            engine.process_chat(empty_user_id).await,
            Err(OrchestratorError::Validation(_))
        ));

        let mut long_user_id = chat_request("hello");
        long_user_id.user_id = "u".repeat(101);
        assert!(matches!(
            engine.process_chat(long_user_id).await,
            Err(OrchestratorError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn emergency_message_short_circuits_dispatch() {
        let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
        let bus = Arc::new(InMemoryBusClient::new());
        let engine = ConversationEngine::new(
            store.clone(),
            Arc::new(IntentClassifier::new(
                prompt_registry().await,
                Arc::new(MockProvider::new("primary", "m")),
                None,
            )),
            Arc::new(AgentRouter::new(&agents_config())),
            bus.clone(),
            Arc::new(CorrelationRegistry::new()),
            Arc::new(PushChannelHub::new(store.clone())),
            50,
        );

        let response = engine.process_chat(chat_request("I have severe chest pain")).await.unwrap();
        assert_eq!(response.intent, "medical_emergency");
        assert!(response.requires_human_handoff);
        assert_eq!(response.suggested_actions, vec!["call_emergency_services".to_string()]);
        assert!(bus.dispatched().await.is_empty());

        let session = store.get(response.session_id).await.unwrap().unwrap();
        assert_eq!(session.history.len(), 2);
    }

    #[tokio::test]
    async fn booking_intent_dispatches_and_returns_provisional_response() {
        let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
        let bus = Arc::new(InMemoryBusClient::new());
        let registry = Arc::new(CorrelationRegistry::new());
        let engine = ConversationEngine::new(
            store.clone(),
            Arc::new(IntentClassifier::new(
                prompt_registry().await,
                Arc::new(MockProvider::new("primary", "m")),
                None,
            )),
            Arc::new(AgentRouter::new(&agents_config())),
            bus.clone(),
            registry.clone(),
            Arc::new(PushChannelHub::new(store.clone())),
            50,
        );

        let response = engine
            .process_chat(chat_request("I want to book an appointment"))
            .await
            .unwrap();
        assert_eq!(response.intent, "appointment_booking");
        assert!(response.correlation_id.is_some());
        assert!(!response.requires_human_handoff);
        assert_eq!(registry.len(), 1);
        assert_eq!(bus.dispatched().await.len(), 1);

        let session = store.get(response.session_id).await.unwrap().unwrap();
        assert_eq!(session.history.len(), 2);
        assert_eq!(session.pending_tasks.len(), 1);
    }

    #[tokio::test]
    async fn agent_response_resolves_pending_correlation() {
        let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
        let bus = Arc::new(InMemoryBusClient::new());
        let registry = Arc::new(CorrelationRegistry::new());
        let push_hub = Arc::new(PushChannelHub::new(store.clone()));
        let engine = Arc::new(ConversationEngine::new(
            store.clone(),
            Arc::new(IntentClassifier::new(
                prompt_registry().await,
                Arc::new(MockProvider::new("primary", "m")),
                None,
            )),
            Arc::new(AgentRouter::new(&agents_config())),
            bus.clone(),
            registry.clone(),
            push_hub,
            50,
        ));
        bus.subscribe("appointment-agent-responses", engine.clone()).await.unwrap();

        let response = engine
            .process_chat(chat_request("I want to book an appointment"))
            .await
            .unwrap();
        let correlation_id = response.correlation_id.unwrap();

        bus.deliver(
            "appointment-agent-responses",
            carepath_bus::TaskResponseEnvelope {
                message_type: "task_response".to_string(),
                correlation_id,
                status: TaskResponseStatus::Success,
                result: TaskResult {
                    response_text: "You're booked for 3pm Tuesday.".to_string(),
                    sources: None,
                    requires_human_handoff: false,
                    suggested_actions: vec![],
                    session_id: response.session_id,
                },
            },
        )
        .await;

        assert!(registry.is_empty());
        let session = store.get(response.session_id).await.unwrap().unwrap();
        let assistant_message = session.history.last().unwrap();
        assert_eq!(assistant_message.content, "You're booked for 3pm Tuesday.");
        assert_eq!(assistant_message.metadata.status, Some(MessageStatus::Completed));
    }

    #[tokio::test]
    async fn dispatch_timeout_synthesizes_inline_error_completion() {
        let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
        let bus: Arc<dyn MessageBusClient> = Arc::new(FailingBusClient);
        let engine = ConversationEngine::new(
            store.clone(),
            Arc::new(IntentClassifier::new(
                prompt_registry().await,
                Arc::new(MockProvider::new("primary", "m")),
                None,
            )),
            Arc::new(AgentRouter::new(&agents_config())),
            bus,
            Arc::new(CorrelationRegistry::new()),
            Arc::new(PushChannelHub::new(store.clone())),
            50,
        );

        let response = engine
            .process_chat(chat_request("I want to book an appointment"))
            .await
            .unwrap();
        assert!(response.correlation_id.is_none());
        assert!(response.requires_human_handoff);

        let session = store.get(response.session_id).await.unwrap().unwrap();
        let assistant_message = session.history.last().unwrap();
        assert_eq!(assistant_message.metadata.status, Some(MessageStatus::Error));
    }
}
