use carepath_core::CorrelationId;
use serde::Serialize;

/// Server → client push envelope (§6: "Each has `type`, `data`, `timestamp`,
/// optional `correlation_id`").
#[derive(Debug, Clone, Serialize)]
pub struct PushEnvelope {
    #[serde(rename = "type")]
    pub envelope_type: PushEnvelopeType,
    pub data: serde_json::Value,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<CorrelationId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PushEnvelopeType {
    FinalResponse,
    Typing,
    Status,
    Error,
}

impl PushEnvelope {
    pub fn new(envelope_type: PushEnvelopeType, data: serde_json::Value, correlation_id: Option<CorrelationId>) -> Self {
        Self {
            envelope_type,
            data,
            timestamp: chrono::Utc::now(),
            correlation_id,
        }
    }

    pub fn final_response(
        session_id: carepath_core::SessionId,
        response: &str,
        intent: Option<&str>,
        requires_human_handoff: bool,
        suggested_actions: &[String],
        correlation_id: CorrelationId,
    ) -> Self {
        Self::new(
            PushEnvelopeType::FinalResponse,
            serde_json::json!({
                "session_id": session_id,
                "response": response,
                "intent": intent,
                "requires_human_handoff": requires_human_handoff,
                "suggested_actions": suggested_actions,
                "correlation_id": correlation_id,
            }),
            Some(correlation_id),
        )
    }

    pub fn typing(session_id: carepath_core::SessionId) -> Self {
        Self::new(PushEnvelopeType::Typing, serde_json::json!({ "session_id": session_id }), None)
    }

    pub fn status(session_id: carepath_core::SessionId, status: &str) -> Self {
        Self::new(
            PushEnvelopeType::Status,
            serde_json::json!({ "session_id": session_id, "status": status }),
            None,
        )
    }

    pub fn error(session_id: carepath_core::SessionId, message: &str, correlation_id: Option<CorrelationId>) -> Self {
        Self::new(
            PushEnvelopeType::Error,
            serde_json::json!({ "session_id": session_id, "message": message }),
            correlation_id,
        )
    }
}
