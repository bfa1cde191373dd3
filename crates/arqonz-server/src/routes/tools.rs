//! Tool catalogue and job submission routes.

use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::warn;

use arqonz_jobs::Attachment;
use arqonz_tools::{ToolKind, ToolRequest};

use super::{api_error, from_core, ApiError};
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tools", get(list_tools))
        .route("/tools/{slug}/jobs", post(start_job))
}

/// GET /api/tools
async fn list_tools() -> Json<serde_json::Value> {
    let tools: Vec<_> = ToolKind::ALL.iter().map(|t| t.info()).collect();
    Json(serde_json::json!({ "tools": tools }))
}

/// POST /api/tools/:slug/jobs: multipart form with `prompt`, `payload`
/// (JSON object of tool settings), `panel` and the `image`, `mask` and
/// `reference_image` uploads.
async fn start_job(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let tool: ToolKind = slug.parse().map_err(from_core)?;
    let mut request = ToolRequest::new(tool, "");
    let mut panel = tool.slug().to_string();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!("Bad multipart body: {}", e);
                return Err(api_error(StatusCode::BAD_REQUEST, e));
            }
        };
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            "image" | "mask" | "reference_image" => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;
                let attachment = Attachment {
                    field: name.clone(),
                    filename,
                    content_type,
                    bytes: bytes.to_vec(),
                };
                match name.as_str() {
                    "image" => request.image = Some(attachment),
                    "mask" => request.mask = Some(attachment),
                    _ => request.reference_image = Some(attachment),
                }
            }
            "prompt" | "payload" | "panel" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;
                match name.as_str() {
                    "prompt" => request.prompt = text,
                    "panel" if !text.trim().is_empty() => panel = text.trim().to_string(),
                    "payload" => {
                        request.params = serde_json::from_str(&text).map_err(|e| {
                            api_error(
                                StatusCode::BAD_REQUEST,
                                format!("payload must be a JSON object: {}", e),
                            )
                        })?;
                    }
                    _ => {}
                }
            }
            other => warn!("Ignoring unknown form field '{}'", other),
        }
    }

    let payload = request.into_payload().map_err(from_core)?;
    let key = state.start_job(tool, &panel, payload);

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "key": key,
            "tool": tool,
            "panel": panel,
        })),
    ))
}
