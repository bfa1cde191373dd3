//! Job status and cancellation routes.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::state::{AppState, JobView};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/jobs", get(list_jobs))
        .route("/jobs/{key}", get(get_job))
        .route("/jobs/{key}/cancel", post(cancel_job))
}

/// GET /api/jobs: all tracked jobs, newest first.
async fn list_jobs(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let jobs = state.jobs.read();
    let mut views: Vec<JobView> = jobs.values().map(|j| j.view()).collect();
    views.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    Json(serde_json::json!({
        "jobs": views,
        "total": views.len(),
    }))
}

/// GET /api/jobs/:key
async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> impl IntoResponse {
    let jobs = state.jobs.read();
    match jobs.get(&key) {
        Some(job) => (StatusCode::OK, Json(serde_json::json!(job.view()))),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "Job not found" })),
        ),
    }
}

/// POST /api/jobs/:key/cancel
async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> impl IntoResponse {
    match state.cancel_job(&key) {
        Some(true) => (
            StatusCode::OK,
            Json(serde_json::json!({ "key": key, "cancelled": true })),
        ),
        Some(false) => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({ "error": "Job already finished" })),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "Job not found" })),
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use arqonz_jobs::{Artifact, JobPayload, PollStatus};
    use arqonz_tools::ToolKind;

    use crate::routes::build_router;
    use crate::routes::test_util::json_body;
    use crate::state::test_support::{test_state, FakeBackend};

    fn request(method: Method, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    fn payload() -> JobPayload {
        JobPayload::new(serde_json::json!({})).for_tool("AI Eraser")
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_snapshot_after_success() {
        let tmp = TempDir::new().unwrap();
        let state = test_state(
            tmp.path(),
            FakeBackend::new(vec![PollStatus::Succeeded(Artifact::new("https://cdn/e.png"))]),
        );
        let key = state.start_job(ToolKind::AiEraser, "eraser", payload());
        tokio::time::sleep(Duration::from_secs(5)).await;
        let app = build_router(state);

        let response = app
            .oneshot(request(Method::GET, &format!("/api/jobs/{}", key)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["state"], "succeeded");
        assert_eq!(body["remoteId"], "remote-1");
        assert_eq!(body["result"]["url"], "https://cdn/e.png");
        assert_eq!(body["result"]["meta"]["toolName"], "AI Eraser");
        assert_eq!(body["toasts"][0]["title"], "Processing Started");
        assert_eq!(body["toasts"][1]["title"], "Generation Complete!");
        assert!(body.get("error").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_then_conflict() {
        let tmp = TempDir::new().unwrap();
        let state = test_state(tmp.path(), FakeBackend::new(vec![]));
        let key = state.start_job(ToolKind::AiEraser, "eraser", payload());
        tokio::time::sleep(Duration::from_secs(1)).await;
        let app = build_router(state);
        let uri = format!("/api/jobs/{}/cancel", key);

        let response = app.clone().oneshot(request(Method::POST, &uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        tokio::time::sleep(Duration::from_millis(10)).await;

        let response = app.clone().oneshot(request(Method::POST, &uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = app
            .oneshot(request(Method::GET, &format!("/api/jobs/{}", key)))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["state"], "cancelled");
        assert_eq!(body["toasts"][0]["title"], "Processing Started");
        assert_eq!(body["toasts"][1]["title"], "Generation Cancelled");
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let tmp = TempDir::new().unwrap();
        let app = build_router(test_state(tmp.path(), FakeBackend::new(vec![])));

        let response = app
            .clone()
            .oneshot(request(Method::GET, "/api/jobs/nope"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let response = app
            .oneshot(request(Method::POST, "/api/jobs/nope/cancel"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_jobs_newest_first() {
        let tmp = TempDir::new().unwrap();
        let state = test_state(tmp.path(), FakeBackend::new(vec![]));
        let first = state.start_job(ToolKind::AiEraser, "a", payload());
        std::thread::sleep(Duration::from_millis(2));
        let second = state.start_job(ToolKind::AiEraser, "b", payload());
        let app = build_router(state);

        let response = app.oneshot(request(Method::GET, "/api/jobs")).await.unwrap();
        let body = json_body(response).await;
        assert_eq!(body["total"], 2);
        assert_eq!(body["jobs"][0]["key"], second.as_str());
        assert_eq!(body["jobs"][1]["key"], first.as_str());
    }
}
