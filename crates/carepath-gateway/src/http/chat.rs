//! `POST /chat` — the synchronous request endpoint (§6).
//!
//! Body: `{ user_id, message, session_id?, context? }`. The response carries
//! either a provisional acknowledgment (a task was dispatched) or a final
//! reply (emergency short-circuit, dispatch failure). A session-store
//! outage still produces a reply — it is surfaced as 503 with
//! `degraded: true` rather than dropped.

use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use carepath_core::OrchestratorError;
use carepath_engine::{ChatRequest, ChatResponse};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use crate::app::AppState;

#[derive(Debug, Serialize)]
pub struct ChatApiResponse {
    pub response: String,
    pub session_id: carepath_core::SessionId,
    pub intent: String,
    pub requires_human_handoff: bool,
    pub suggested_actions: Vec<String>,
    pub confidence_score: f32,
    pub processing_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<carepath_core::CorrelationId>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub degraded: bool,
}

fn is_false(b: &bool) -> bool {
    !b
}

impl From<(ChatResponse, u64)> for ChatApiResponse {
    fn from((response, processing_time_ms): (ChatResponse, u64)) -> Self {
        Self {
            response: response.response,
            session_id: response.session_id,
            intent: response.intent,
            requires_human_handoff: response.requires_human_handoff,
            suggested_actions: response.suggested_actions,
            confidence_score: response.confidence,
            processing_time_ms,
            correlation_id: response.correlation_id,
            degraded: response.degraded,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: &'static str,
    pub error: String,
}

pub async fn chat_handler(State(state): State<Arc<AppState>>, Json(request): Json<ChatRequest>) -> Response {
    if state.chat_rate_limiter.check_key(&request.user_id).is_err() {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ApiError {
                code: "RATE_LIMITED",
                error: "too many requests for this user_id, slow down".to_string(),
            }),
        )
            .into_response();
    }

    let started = Instant::now();
    let result = state.engine.process_chat(request).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match result {
        Ok(response) => {
            let degraded = response.degraded;
            state.metrics.record_request(&response.intent, elapsed_ms, degraded);
            let body = ChatApiResponse::from((response, elapsed_ms));
            let status = if degraded { StatusCode::SERVICE_UNAVAILABLE } else { StatusCode::OK };
            (status, Json(body)).into_response()
        }
        Err(err) => {
            state.metrics.record_request("unknown", elapsed_ms, true);
            warn!(err = %err, "POST /chat failed");
            error_response(err).into_response()
        }
    }
}

pub(crate) fn error_response(err: OrchestratorError) -> (StatusCode, Json<ApiError>) {
    let status = match err {
        OrchestratorError::Validation(_) => StatusCode::BAD_REQUEST,
        OrchestratorError::SessionMissing { .. } => StatusCode::NOT_FOUND,
        OrchestratorError::StoreOutage(_) => StatusCode::SERVICE_UNAVAILABLE,
        OrchestratorError::ProviderFailure(_)
        | OrchestratorError::DispatchFailure(_)
        | OrchestratorError::AgentTimeout { .. }
        | OrchestratorError::ProtocolError(_)
        | OrchestratorError::Config(_)
        | OrchestratorError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ApiError {
            code: err.code(),
            error: err.to_string(),
        }),
    )
}
