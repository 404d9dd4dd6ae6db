use carepath_core::{CorrelationId, SessionId};
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

/// In-memory entry for one outstanding dispatch (§3 "Correlation entry").
///
/// Lives only on the instance that dispatched the request. Removed on
/// resolve, timeout, cancel, or session deletion.
#[derive(Debug, Clone)]
pub struct CorrelationEntry {
    pub session_id: SessionId,
    pub user_id: String,
    pub agent_response_topic: String,
    pub deadline: chrono::DateTime<chrono::Utc>,
    pub cancel: CancellationToken,
}

/// Per-instance map from correlation id to its outstanding dispatch (§4.7).
#[derive(Default)]
pub struct CorrelationRegistry {
    entries: DashMap<CorrelationId, CorrelationEntry>,
}

impl CorrelationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, correlation_id: CorrelationId, entry: CorrelationEntry) {
        self.entries.insert(correlation_id, entry);
    }

    /// Remove and return the entry for a correlation id whose agent
    /// response has arrived.
    pub fn resolve(&self, correlation_id: CorrelationId) -> Option<CorrelationEntry> {
        self.entries.remove(&correlation_id).map(|(_, entry)| entry)
    }

    /// Remove and return the entry, used by the background sweeper when a
    /// deadline passes with no response (§4.7).
    pub fn timeout(&self, correlation_id: CorrelationId) -> Option<CorrelationEntry> {
        self.entries.remove(&correlation_id).map(|(_, entry)| entry)
    }

    /// Explicit cancellation (e.g. the client sent `/stop`). Signals the
    /// entry's cancel handle before removing it.
    pub fn cancel(&self, correlation_id: CorrelationId) -> Option<CorrelationEntry> {
        let removed = self.entries.remove(&correlation_id).map(|(_, entry)| entry);
        if let Some(entry) = &removed {
            entry.cancel.cancel();
        }
        removed
    }

    /// Cancel every outstanding correlation for a deleted session; they
    /// produce no push (§4.8 invariant).
    pub fn cancel_by_session(&self, session_id: SessionId) -> Vec<CorrelationEntry> {
        let ids: Vec<CorrelationId> = self
            .entries
            .iter()
            .filter(|entry| entry.session_id == session_id)
            .map(|entry| *entry.key())
            .collect();

        ids.into_iter().filter_map(|id| self.cancel(id)).collect()
    }

    /// Correlation ids whose deadline has passed and are still outstanding;
    /// consulted by the sweeper (§4.7).
    pub fn timed_out_ids(&self, now: chrono::DateTime<chrono::Utc>) -> Vec<CorrelationId> {
        self.entries
            .iter()
            .filter(|entry| entry.deadline <= now)
            .map(|entry| *entry.key())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(session_id: SessionId, deadline: chrono::DateTime<chrono::Utc>) -> CorrelationEntry {
        CorrelationEntry {
            session_id,
            user_id: "u-1".to_string(),
            agent_response_topic: "appointment-agent-responses".to_string(),
            deadline,
            cancel: CancellationToken::new(),
        }
    }

    #[test]
    fn register_then_resolve_removes_entry() {
        let registry = CorrelationRegistry::new();
        let id = CorrelationId::new();
        registry.register(id, entry(SessionId::new(), chrono::Utc::now()));
        assert!(registry.resolve(id).is_some());
        assert!(registry.resolve(id).is_none());
    }

    #[test]
    fn cancel_by_session_removes_only_matching_entries() {
        let registry = CorrelationRegistry::new();
        let session_a = SessionId::new();
        let session_b = SessionId::new();
        let id_a = CorrelationId::new();
        let id_b = CorrelationId::new();
        registry.register(id_a, entry(session_a, chrono::Utc::now()));
        registry.register(id_b, entry(session_b, chrono::Utc::now()));

        let cancelled = registry.cancel_by_session(session_a);
        assert_eq!(cancelled.len(), 1);
        assert!(registry.resolve(id_a).is_none());
        assert!(registry.resolve(id_b).is_some());
    }

    #[test]
    fn timed_out_ids_only_returns_past_deadline() {
        let registry = CorrelationRegistry::new();
        let now = chrono::Utc::now();
        let past = CorrelationId::new();
        let future = CorrelationId::new();
        registry.register(past, entry(SessionId::new(), now - chrono::Duration::seconds(1)));
        registry.register(future, entry(SessionId::new(), now + chrono::Duration::seconds(60)));

        let timed_out = registry.timed_out_ids(now);
        assert_eq!(timed_out, vec![past]);
    }
}
