//! `GET /health` — liveness and readiness probe (§6).

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use carepath_core::SessionId;
use carepath_llm::BreakerState;
use serde_json::{json, Value};

use crate::app::AppState;

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let store_reachable = state.session_store.get(SessionId::new()).await.is_ok();
    let breaker_states = state.provider_registry.breaker_states();
    let open_count = breaker_states.iter().filter(|(_, s)| *s == BreakerState::Open).count();

    let status = if !store_reachable || open_count == breaker_states.len() {
        "unhealthy"
    } else if open_count > 0 {
        "degraded"
    } else {
        "healthy"
    };

    Json(json!({
        "status": status,
        "service": "carepath-gateway",
        "timestamp": chrono::Utc::now(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
