use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use carepath_core::{CorrelationId, MessageStatus, SessionId};
use carepath_sessions::SessionStore;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::envelope::{PushEnvelope, PushEnvelopeType};

/// The final result of a dispatched task, as reported back to the hub by
/// whatever resolved the correlation (an agent response, a synthesized
/// timeout, or an explicit cancellation).
#[derive(Debug, Clone)]
pub struct FinalResult {
    pub correlation_id: CorrelationId,
    pub response_text: String,
    pub intent: Option<String>,
    pub requires_human_handoff: bool,
    pub suggested_actions: Vec<String>,
    pub status: MessageStatus,
}

/// A live push connection: an outbound channel plus the generation id it was
/// attached under, so a stale `detach` can never evict a newer connection.
struct Connection {
    sender: mpsc::Sender<PushEnvelope>,
    generation: u64,
}

/// Per-session fan-out of push envelopes to at most one live connection at a
/// time (§4.8).
///
/// Also owns the only other mutation path to a session besides the
/// Conversation Engine: applying a resolved correlation's result to the
/// target assistant message before emitting the corresponding
/// `final_response` envelope.
pub struct PushChannelHub {
    connections: DashMap<SessionId, Connection>,
    session_store: Arc<dyn SessionStore>,
    dropped: AtomicU64,
    next_generation: AtomicU64,
}

/// Opaque handle identifying one `attach` call, returned alongside its
/// receiver. Pass it back to `detach` so a connection that was already
/// superseded by a newer attach can't evict the one that replaced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionHandle(u64);

impl PushChannelHub {
    pub fn new(session_store: Arc<dyn SessionStore>) -> Self {
        Self {
            connections: DashMap::new(),
            session_store,
            dropped: AtomicU64::new(0),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Attach a new connection for `session_id`, returning the receiver the
    /// caller should forward to the transport (e.g. a websocket task) and a
    /// handle identifying this attach, to be passed back to `detach`. Any
    /// prior connection is closed with a `status` envelope carrying
    /// `"superseded"` before being replaced.
    pub fn attach(&self, session_id: SessionId, buffer: usize) -> (mpsc::Receiver<PushEnvelope>, ConnectionHandle) {
        let (tx, rx) = mpsc::channel(buffer);
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        if let Some((_, old)) = self.connections.remove(&session_id) {
            let _ = old.sender.try_send(PushEnvelope::status(session_id, "superseded"));
        }
        self.connections.insert(session_id, Connection { sender: tx, generation });
        (rx, ConnectionHandle(generation))
    }

    /// Forget the connection for `session_id`, but only if it is still the
    /// one identified by `handle`. Called by the transport task when it
    /// closes normally; does not emit anything. A stale handle (one whose
    /// connection was already superseded by a later `attach`) is a no-op, so
    /// it never evicts the connection that replaced it.
    pub fn detach(&self, session_id: SessionId, handle: ConnectionHandle) {
        self.connections.remove_if(&session_id, |_, conn| conn.generation == handle.0);
    }

    /// Unconditionally drop whatever connection is registered for
    /// `session_id`, regardless of generation. Used for administrative
    /// cleanup (e.g. `DELETE /session/{id}`), where the session itself is
    /// gone and any live connection for it — current or stale — should stop
    /// receiving pushes.
    pub fn evict(&self, session_id: SessionId) {
        self.connections.remove(&session_id);
    }

    /// Non-blocking delivery. Returns `false` (and counts a drop) if there is
    /// no live connection or its buffer is full; the caller's session-state
    /// mutation (if any) still applies regardless of delivery.
    pub fn send(&self, session_id: SessionId, envelope: PushEnvelope) -> bool {
        let delivered = match self.connections.get(&session_id) {
            Some(conn) => conn.sender.try_send(envelope).is_ok(),
            None => false,
        };
        if !delivered {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            debug!(session_id = %session_id, "push envelope dropped, no live connection");
        }
        delivered
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn is_attached(&self, session_id: SessionId) -> bool {
        self.connections.contains_key(&session_id)
    }

    /// Count of sessions with a live connection on this instance, surfaced
    /// on `/metrics` as `active_sessions` (per-instance, not cluster-wide —
    /// see §5 on the hub's per-instance scope).
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Two-step final-response handling (§4.8):
    /// 1. locate the assistant message matching `result.correlation_id` in
    ///    the session's history and overwrite its content/status/intent;
    /// 2. emit the `final_response` envelope to any live connection.
    ///
    /// Applies step 1 even when the session has no live connection, so a
    /// client that reconnects later still sees the resolved message.
    pub async fn deliver_final_response(
        &self,
        session_id: SessionId,
        result: FinalResult,
    ) -> Result<bool, carepath_sessions::SessionStoreError> {
        let Some(mut session) = self.session_store.get(session_id).await? else {
            warn!(session_id = %session_id, "final response for unknown session, dropping");
            return Ok(false);
        };

        let target = session
            .history
            .iter_mut()
            .rev()
            .find(|m| m.metadata.correlation_id == Some(result.correlation_id));

        match target {
            Some(message) => {
                message.content = result.response_text.clone();
                message.metadata.status = Some(result.status);
                if result.intent.is_some() {
                    message.metadata.intent = result.intent.clone();
                }
                message.timestamp = chrono::Utc::now();
            }
            None => {
                warn!(
                    session_id = %session_id,
                    correlation_id = %result.correlation_id,
                    "no pending message matched resolved correlation"
                );
            }
        }

        session.pending_tasks.retain(|t| t.task_id != result.correlation_id);
        self.session_store.put(session).await?;

        let envelope = PushEnvelope::final_response(
            session_id,
            &result.response_text,
            result.intent.as_deref(),
            result.requires_human_handoff,
            &result.suggested_actions,
            result.correlation_id,
        );
        debug_assert_eq!(envelope.envelope_type, PushEnvelopeType::FinalResponse);
        Ok(self.send(session_id, envelope))
    }
}

#[cfg(test)]
mod tests {
    use carepath_core::{ConversationMessage, Language, MessageMetadata, MessageRole, Session};
    use carepath_sessions::InMemorySessionStore;

    use super::*;

    fn pending_message(correlation_id: CorrelationId) -> ConversationMessage {
        ConversationMessage {
            timestamp: chrono::Utc::now(),
            role: MessageRole::Assistant,
            content: String::new(),
            metadata: MessageMetadata {
                correlation_id: Some(correlation_id),
                status: Some(MessageStatus::Pending),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn attach_then_send_delivers_envelope() {
        let store = Arc::new(InMemorySessionStore::new());
        let hub = PushChannelHub::new(store);
        let session_id = SessionId::new();
        let (mut rx, _handle) = hub.attach(session_id, 8);

        assert!(hub.send(session_id, PushEnvelope::typing(session_id)));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.envelope_type, PushEnvelopeType::Typing);
    }

    #[tokio::test]
    async fn send_without_connection_is_dropped() {
        let store = Arc::new(InMemorySessionStore::new());
        let hub = PushChannelHub::new(store);
        let session_id = SessionId::new();

        assert!(!hub.send(session_id, PushEnvelope::typing(session_id)));
        assert_eq!(hub.dropped_count(), 1);
    }

    #[tokio::test]
    async fn attaching_twice_supersedes_the_prior_connection() {
        let store = Arc::new(InMemorySessionStore::new());
        let hub = PushChannelHub::new(store);
        let session_id = SessionId::new();

        let (mut first, _first_handle) = hub.attach(session_id, 8);
        let (_second, _second_handle) = hub.attach(session_id, 8);

        let superseded = first.recv().await.unwrap();
        assert_eq!(superseded.envelope_type, PushEnvelopeType::Status);
        assert_eq!(superseded.data["status"], "superseded");
    }

    #[tokio::test]
    async fn stale_detach_does_not_evict_the_superseding_connection() {
        let store = Arc::new(InMemorySessionStore::new());
        let hub = PushChannelHub::new(store);
        let session_id = SessionId::new();

        let (_first, first_handle) = hub.attach(session_id, 8);
        let (_second, _second_handle) = hub.attach(session_id, 8);

        // The first connection's transport task tears down after being
        // superseded and calls detach with its now-stale handle.
        hub.detach(session_id, first_handle);

        assert!(hub.is_attached(session_id));
        assert!(hub.send(session_id, PushEnvelope::typing(session_id)));
    }

    #[tokio::test]
    async fn deliver_final_response_updates_history_and_pushes() {
        let store = Arc::new(InMemorySessionStore::new());
        let session_id = SessionId::new();
        let correlation_id = CorrelationId::new();

        let mut session = Session::new(session_id, "u-1", Language::En);
        session.append_message(pending_message(correlation_id), 50);
        store.put(session).await.unwrap();

        let hub = PushChannelHub::new(store.clone());
        let (mut rx, _handle) = hub.attach(session_id, 8);

        let delivered = hub
            .deliver_final_response(
                session_id,
                FinalResult {
                    correlation_id,
                    response_text: "your appointment is booked".to_string(),
                    intent: Some("book_appointment".to_string()),
                    requires_human_handoff: false,
                    suggested_actions: vec![],
                    status: MessageStatus::Completed,
                },
            )
            .await
            .unwrap();
        assert!(delivered);

        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.envelope_type, PushEnvelopeType::FinalResponse);

        let stored = store.get(session_id).await.unwrap().unwrap();
        let message = stored.history.last().unwrap();
        assert_eq!(message.content, "your appointment is booked");
        assert_eq!(message.metadata.status, Some(MessageStatus::Completed));
    }

    #[tokio::test]
    async fn deliver_final_response_for_unknown_session_is_noop() {
        let store = Arc::new(InMemorySessionStore::new());
        let hub = PushChannelHub::new(store);

        let delivered = hub
            .deliver_final_response(
                SessionId::new(),
                FinalResult {
                    correlation_id: CorrelationId::new(),
                    response_text: "x".to_string(),
                    intent: None,
                    requires_human_handoff: false,
                    suggested_actions: vec![],
                    status: MessageStatus::Completed,
                },
            )
            .await
            .unwrap();
        assert!(!delivered);
    }
}
