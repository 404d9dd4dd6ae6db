use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A durable conversation session's identifier — always a v4 UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for SessionId {
    fn from(u: Uuid) -> Self {
        Self(u)
    }
}

/// Correlation id linking a dispatched task to its eventual agent result.
///
/// Doubles as the pending task's id (§3: "task id (= correlation id)").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(pub Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for CorrelationId {
    fn from(u: Uuid) -> Self {
        Self(u)
    }
}

/// Role of a single conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

/// Lifecycle status of an assistant message awaiting (or past) agent resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Pending,
    Completed,
    Error,
}

/// Lifecycle status of a pending task (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    /// A task in this state is eligible for the sweeper's timeout handling.
    pub fn is_outstanding(&self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Processing)
    }
}

/// Conversation language, part of `/chat`'s optional `context`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Id,
}

/// Requesting user's type, part of `/chat`'s optional `context`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Patient,
    Staff,
}

/// Requested handling priority, part of `/chat`'s optional `context`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
}

/// A single entry in a session's conversation history (§3 "Conversation message").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub role: MessageRole,
    pub content: String,
    #[serde(default)]
    pub metadata: MessageMetadata,
}

/// Recognized metadata fields on a conversation message (§3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageMetadata {
    pub intent: Option<String>,
    pub confidence: Option<f32>,
    pub correlation_id: Option<CorrelationId>,
    pub status: Option<MessageStatus>,
}

/// A task dispatched to an agent and awaiting a response (§3 "Pending task").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingTask {
    /// Equal to the correlation id that was used to dispatch it.
    pub task_id: CorrelationId,
    pub task_type: String,
    pub status: TaskStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub deadline: chrono::DateTime<chrono::Utc>,
}

impl PendingTask {
    /// True once `deadline` has passed and the task is still outstanding.
    pub fn is_timed_out(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        self.status.is_outstanding() && now >= self.deadline
    }
}

/// A durable conversation session (§3 "Session").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub user_id: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub last_activity: chrono::DateTime<chrono::Utc>,
    pub language: Language,
    pub current_intent: Option<String>,
    /// Free-form workflow state, opaque to the store.
    pub workflow_state: Option<String>,
    pub history: Vec<ConversationMessage>,
    pub pending_tasks: Vec<PendingTask>,
    /// Optimistic-concurrency version; bumped on every store write.
    #[serde(default)]
    pub version: u64,
}

impl Session {
    pub fn new(id: SessionId, user_id: impl Into<String>, language: Language) -> Self {
        let now = chrono::Utc::now();
        Self {
            id,
            user_id: user_id.into(),
            created_at: now,
            last_activity: now,
            language,
            current_intent: None,
            workflow_state: None,
            history: Vec::new(),
            pending_tasks: Vec::new(),
            version: 0,
        }
    }

    /// Append a message, truncating history to `max_history` from the front,
    /// oldest first, preserving chronological order.
    pub fn append_message(&mut self, message: ConversationMessage, max_history: usize) {
        self.history.push(message);
        if self.history.len() > max_history {
            let overflow = self.history.len() - max_history;
            self.history.drain(0..overflow);
        }
        self.last_activity = chrono::Utc::now();
    }

    pub fn is_expired(&self, ttl_secs: u64, now: chrono::DateTime<chrono::Utc>) -> bool {
        let elapsed = now.signed_duration_since(self.last_activity);
        elapsed.num_seconds() >= ttl_secs as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_roundtrips_through_display_and_parse() {
        let id = SessionId::new();
        let parsed = SessionId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn task_status_outstanding() {
        assert!(TaskStatus::Pending.is_outstanding());
        assert!(TaskStatus::Processing.is_outstanding());
        assert!(!TaskStatus::Completed.is_outstanding());
        assert!(!TaskStatus::Failed.is_outstanding());
    }

    fn msg(content: &str) -> ConversationMessage {
        ConversationMessage {
            timestamp: chrono::Utc::now(),
            role: MessageRole::User,
            content: content.to_string(),
            metadata: MessageMetadata::default(),
        }
    }

    #[test]
    fn append_message_truncates_from_the_front() {
        let mut session = Session::new(SessionId::new(), "u-1", Language::En);
        for i in 0..55 {
            session.append_message(msg(&i.to_string()), 50);
        }
        assert_eq!(session.history.len(), 50);
        assert_eq!(session.history.first().unwrap().content, "5");
        assert_eq!(session.history.last().unwrap().content, "54");
    }

    #[test]
    fn session_expires_after_ttl_from_last_activity() {
        let session = Session::new(SessionId::new(), "u-1", Language::En);
        let future = session.last_activity + chrono::Duration::seconds(3601);
        assert!(session.is_expired(3600, future));
        assert!(!session.is_expired(3600, session.last_activity));
    }
}
