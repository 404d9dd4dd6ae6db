use carepath_core::{CorrelationId, Language, Priority, SessionId, UserType};
use serde::{Deserialize, Serialize};

/// Incoming `/chat` request body (§6).
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub user_id: String,
    /// Absent on a brand new conversation; the engine mints one.
    pub session_id: Option<SessionId>,
    pub message: String,
    #[serde(default)]
    pub context: Option<RequestContext>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestContext {
    pub language: Option<Language>,
    pub user_type: Option<UserType>,
    pub department: Option<String>,
    pub priority: Option<Priority>,
}

/// Synchronous `/chat` response (§4.9 step 8, §6). Carried either as the
/// provisional "we're working on it" reply or, on the emergency and
/// dispatch-timeout short-circuits, as a final reply in the same round trip.
#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub session_id: SessionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<CorrelationId>,
    pub intent: String,
    pub confidence: f32,
    pub response: String,
    pub requires_human_handoff: bool,
    pub suggested_actions: Vec<String>,
    /// Set when the session store was unreachable and the turn was handled
    /// without durable history (§4.1 failure semantics).
    #[serde(default, skip_serializing_if = "is_false")]
    pub degraded: bool,
}

fn is_false(b: &bool) -> bool {
    !b
}
