use async_trait::async_trait;
use carepath_core::{ConversationMessage, Session, SessionId};
use dashmap::DashMap;

use crate::error::{Result, SessionStoreError};
use crate::store::SessionStore;

/// In-process `SessionStore` for local development and unit tests.
///
/// Never wired into the production binary — it does not share state across
/// instances, which defeats the whole point of the store (§4.1).
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<SessionId, Session>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, session_id: SessionId) -> Result<Option<Session>> {
        Ok(self.sessions.get(&session_id).map(|s| s.clone()))
    }

    async fn put(&self, session: Session) -> Result<()> {
        self.sessions.insert(session.id, session);
        Ok(())
    }

    async fn delete(&self, session_id: SessionId) -> Result<()> {
        self.sessions.remove(&session_id);
        Ok(())
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<SessionId>> {
        Ok(self
            .sessions
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .map(|entry| entry.id)
            .collect())
    }

    async fn append_message(
        &self,
        session_id: SessionId,
        message: ConversationMessage,
        max_history: usize,
    ) -> Result<Session> {
        let mut entry = self
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| SessionStoreError::Conflict {
                session_id: session_id.to_string(),
            })?;
        entry.append_message(message, max_history);
        entry.version += 1;
        Ok(entry.clone())
    }
}

#[cfg(test)]
mod tests {
    use carepath_core::{Language, MessageMetadata, MessageRole};

    use super::*;

    fn msg(content: &str) -> ConversationMessage {
        ConversationMessage {
            timestamp: chrono::Utc::now(),
            role: MessageRole::User,
            content: content.to_string(),
            metadata: MessageMetadata::default(),
        }
    }

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let store = InMemorySessionStore::new();
        let session = Session::new(SessionId::new(), "u-1", Language::En);
        let id = session.id;
        store.put(session).await.unwrap();
        let fetched = store.get(id).await.unwrap().unwrap();
        assert_eq!(fetched.id, id);
    }

    #[tokio::test]
    async fn append_message_on_missing_session_conflicts() {
        let store = InMemorySessionStore::new();
        let result = store.append_message(SessionId::new(), msg("hi"), 50).await;
        assert!(matches!(result, Err(SessionStoreError::Conflict { .. })));
    }

    #[tokio::test]
    async fn append_message_truncates_and_bumps_version() {
        let store = InMemorySessionStore::new();
        let session = Session::new(SessionId::new(), "u-1", Language::En);
        let id = session.id;
        store.put(session).await.unwrap();

        for i in 0..52 {
            store.append_message(id, msg(&i.to_string()), 50).await.unwrap();
        }

        let fetched = store.get(id).await.unwrap().unwrap();
        assert_eq!(fetched.history.len(), 50);
        assert_eq!(fetched.version, 52);
    }

    #[tokio::test]
    async fn list_by_user_filters_correctly() {
        let store = InMemorySessionStore::new();
        store.put(Session::new(SessionId::new(), "alice", Language::En)).await.unwrap();
        store.put(Session::new(SessionId::new(), "bob", Language::En)).await.unwrap();
        let alice_sessions = store.list_by_user("alice").await.unwrap();
        assert_eq!(alice_sessions.len(), 1);
    }
}
