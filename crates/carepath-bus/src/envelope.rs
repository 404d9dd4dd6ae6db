use carepath_core::{CorrelationId, SessionId};
use serde::{Deserialize, Serialize};

/// Bus envelope sent to an agent worker (§3 "Task-request envelope").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequestEnvelope {
    #[serde(rename = "type")]
    pub message_type: String,
    pub correlation_id: CorrelationId,
    pub task_type: String,
    pub payload: TaskRequestPayload,
    pub issued_at: chrono::DateTime<chrono::Utc>,
}

impl TaskRequestEnvelope {
    pub fn new(correlation_id: CorrelationId, task_type: impl Into<String>, payload: TaskRequestPayload) -> Self {
        Self {
            message_type: "task_request".to_string(),
            correlation_id,
            task_type: task_type.into(),
            payload,
            issued_at: chrono::Utc::now(),
        }
    }
}

/// Minimum payload content required by every worker (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequestPayload {
    pub user_message: String,
    pub session_id: SessionId,
    pub user_context: serde_json::Value,
    pub trimmed_history: Vec<serde_json::Value>,
}

/// Bus envelope an agent worker sends back (§3 "Task-response envelope").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResponseEnvelope {
    #[serde(rename = "type")]
    pub message_type: String,
    pub correlation_id: CorrelationId,
    pub status: TaskResponseStatus,
    pub result: TaskResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskResponseStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub response_text: String,
    #[serde(default)]
    pub sources: Option<Vec<String>>,
    #[serde(default)]
    pub requires_human_handoff: bool,
    #[serde(default)]
    pub suggested_actions: Vec<String>,
    pub session_id: SessionId,
}
