//! Session endpoints (§6): `GET`/`DELETE /session/{id}`.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use carepath_core::{OrchestratorError, SessionId};
use serde::Serialize;

use crate::app::AppState;
use crate::http::chat::error_response;

fn parse_session_id(raw: &str) -> Result<SessionId, Response> {
    SessionId::parse(raw).map_err(|_| {
        error_response(OrchestratorError::Validation(format!("'{raw}' is not a valid session id"))).into_response()
    })
}

pub async fn get_session_handler(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let session_id = match parse_session_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match state.session_store.get(session_id).await {
        Ok(Some(session)) => Json(session).into_response(),
        Ok(None) => error_response(OrchestratorError::SessionMissing { session_id: id }).into_response(),
        Err(err) => {
            error_response(OrchestratorError::StoreOutage(err.to_string())).into_response()
        }
    }
}

#[derive(Debug, Serialize)]
struct DeleteResult {
    session_id: SessionId,
    cleared: bool,
}

pub async fn delete_session_handler(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let session_id = match parse_session_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    if let Err(err) = state.session_store.delete(session_id).await {
        return error_response(OrchestratorError::StoreOutage(err.to_string())).into_response();
    }

    state.correlation_registry.cancel_by_session(session_id);
    state.push_hub.evict(session_id);

    (
        StatusCode::OK,
        Json(DeleteResult { session_id, cleared: true }),
    )
        .into_response()
}

