//! Image history routes.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get};
use axum::{Json, Router};

use super::{api_error, from_core, ApiError};
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/history", get(list_history).delete(clear_history))
        .route("/history/{id}", delete(remove_history_item))
}

/// GET /api/history: newest first.
async fn list_history(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let items = state.history.list();
    Json(serde_json::json!({
        "items": items,
        "total": items.len(),
    }))
}

/// DELETE /api/history/:id
async fn remove_history_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    match state.history.remove(&id) {
        Ok(true) => Ok(Json(serde_json::json!({ "removed": id }))),
        Ok(false) => Err(api_error(StatusCode::NOT_FOUND, "History item not found")),
        Err(e) => Err(from_core(e)),
    }
}

/// DELETE /api/history
async fn clear_history(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.history.clear().map_err(from_core)?;
    Ok(Json(serde_json::json!({ "cleared": true })))
}
