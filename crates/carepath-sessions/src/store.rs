use async_trait::async_trait;
use carepath_core::{ConversationMessage, Session, SessionId};

use crate::error::Result;

/// Durable, network-shared store for conversation state (§4.1).
///
/// All orchestrator instances talk to the same store, so no session state
/// lives only in one process's memory. `append_message` is the single
/// concurrency hotspot: two instances racing on the same session must not
/// silently drop either write.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, session_id: SessionId) -> Result<Option<Session>>;

    /// Write/replace a session, resetting its TTL to the default.
    async fn put(&self, session: Session) -> Result<()>;

    async fn delete(&self, session_id: SessionId) -> Result<()>;

    /// Administrative lookup only — not on the hot path of `/chat`.
    async fn list_by_user(&self, user_id: &str) -> Result<Vec<SessionId>>;

    /// Atomically read, append (truncating to `max_history`), and write
    /// back a session. Retries internally on a concurrent write up to
    /// `carepath_core::config::APPEND_RETRY_ATTEMPTS` times with jitter;
    /// returns `SessionStoreError::Conflict` only once that budget is spent.
    async fn append_message(
        &self,
        session_id: SessionId,
        message: ConversationMessage,
        max_history: usize,
    ) -> Result<Session>;
}
