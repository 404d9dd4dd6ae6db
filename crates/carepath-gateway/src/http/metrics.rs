//! `GET /metrics` — served as plain JSON (§6: the admin UI that renders it
//! is out of scope).

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::json;

use crate::app::AppState;

pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let percentiles = state.metrics.response_time_percentiles();
    let provider_names = state.provider_registry.slot_names();

    Json(json!({
        "active_sessions": state.push_hub.connection_count(),
        "total_messages": state.metrics.total_messages(),
        "response_time_percentiles": percentiles,
        "error_rate": state.metrics.error_rate(),
        "intent_distribution": state.metrics.intent_distribution(),
        "primary_provider": provider_names.first(),
        "fallback_providers": provider_names.get(1..).unwrap_or_default(),
        "pending_correlations": state.correlation_registry.len(),
        "dropped_push_deliveries": state.push_hub.dropped_count(),
        "duplicate_bus_deliveries": state.bus_client.duplicate_deliveries(),
    }))
}
