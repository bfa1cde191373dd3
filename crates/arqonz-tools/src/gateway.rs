//! HTTP client for the marketplace backend.
//!
//! Every backend answer is wrapped in `{success, data, error?}`. Submission,
//! status checks and result recording all go through that envelope; the
//! classification lives in the pure `parse_*` functions below. The mask
//! tools submit to hosted functions that answer with the bare vendor JSON
//! (`{status, id}` or `{error}`), but their jobs are polled through the
//! backend like every other tool.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, warn};

use arqonz_core::GatewayConfig;
use arqonz_jobs::{
    Artifact, JobId, JobPayload, JobSubmitter, PollStatus, ResultSink, SinkError, StatusPoller,
    SubmitError, SubmitResponse, TransportError,
};

use crate::catalog::{SubmitRoute, ToolKind};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Talks to the marketplace backend on behalf of tool jobs.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    client: Client,
    config: GatewayConfig,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client, config }
    }

    pub fn with_client(client: Client, config: GatewayConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url, path)
    }

    fn credits_url(&self, path: &str) -> String {
        format!("{}{}", self.config.credits_base_url, path)
    }

    fn submit_url(&self, tool: ToolKind) -> String {
        let route = tool.route();
        match route {
            SubmitRoute::Edge => format!("{}{}", self.config.functions_base_url, route.path(tool)),
            _ => self.api_url(&route.path(tool)),
        }
    }

    async fn save_history(&self, artifact: &Artifact) -> Result<(), SinkError> {
        let mut body = json!({
            "userEmail": self.config.user_email.clone().unwrap_or_default(),
            "imageUrl": artifact.url,
            "toolName": artifact.meta.tool_name.clone().unwrap_or_default(),
            "imageType": "url",
        });
        if let Some(prompt) = &artifact.meta.prompt {
            body["prompt"] = json!(prompt);
        }
        self.post_json(&self.api_url("/image-history/save"), &body)
            .await
    }

    async fn debit_credit(&self, api_key: &str) -> Result<(), SinkError> {
        let body = json!({
            "apiKey": api_key,
            "Update_Type": "debit",
            "Amount": 1,
        });
        self.post_json(&self.credits_url("/update-credits"), &body)
            .await
    }

    async fn post_json(&self, url: &str, body: &Value) -> Result<(), SinkError> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| SinkError(format!("{}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SinkError(format!("{} returned {}: {}", url, status, text)));
        }
        Ok(())
    }
}

#[async_trait]
impl JobSubmitter for GatewayClient {
    async fn submit(&self, payload: &JobPayload) -> Result<SubmitResponse, SubmitError> {
        let tool: ToolKind = payload
            .body
            .get("tool")
            .and_then(Value::as_str)
            .and_then(|slug| slug.parse().ok())
            .ok_or_else(|| SubmitError::Malformed("payload names no known tool".into()))?;
        let route = tool.route();
        let form = build_form(route, payload)?;
        let url = self.submit_url(tool);
        debug!("Submitting {} job to {}", tool, url);

        let mut request = self.client.post(&url).multipart(form);
        if route == SubmitRoute::Edge {
            if let Some(key) = &self.config.functions_key {
                request = request.bearer_auth(key);
            }
        }
        let response = request
            .send()
            .await
            .map_err(|e| SubmitError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| SubmitError::Transport(e.to_string()))?;
        let body: Value = serde_json::from_str(&text).unwrap_or(Value::Null);

        parse_submit_response(status, &body)
    }
}

#[async_trait]
impl StatusPoller for GatewayClient {
    async fn poll(&self, id: &JobId) -> Result<PollStatus, TransportError> {
        let url = self.api_url(&format!("/get-result/{}", id));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))?;
        parse_status_response(&body)
    }
}

/// Records a finished artifact in the backend's history, then debits one
/// credit when an API key is configured.
#[async_trait]
impl ResultSink for GatewayClient {
    async fn record(&self, artifact: &Artifact) -> Result<(), SinkError> {
        self.save_history(artifact).await?;
        match &self.config.api_key {
            Some(key) => self.debit_credit(key).await,
            None => {
                debug!("No API key configured, skipping credit debit");
                Ok(())
            }
        }
    }
}

fn build_form(route: SubmitRoute, payload: &JobPayload) -> Result<Form, SubmitError> {
    let mut form = Form::new();
    match route {
        SubmitRoute::Generic => {
            let tool = payload
                .body
                .get("tool")
                .and_then(Value::as_str)
                .ok_or_else(|| SubmitError::Malformed("payload has no tool".into()))?;
            let inner = payload.body.get("payload").cloned().unwrap_or(json!({}));
            form = form
                .text("tool", tool.to_string())
                .text("payload", inner.to_string());
        }
        SubmitRoute::Expert | SubmitRoute::Edge => {
            let fields = payload
                .body
                .get("fields")
                .and_then(Value::as_object)
                .ok_or_else(|| SubmitError::Malformed("payload has no fields".into()))?;
            for (key, value) in fields {
                let text = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                form = form.text(key.clone(), text);
            }
        }
    }

    for attachment in &payload.attachments {
        let mut part = Part::bytes(attachment.bytes.clone()).file_name(attachment.filename.clone());
        if let Some(content_type) = &attachment.content_type {
            part = part
                .mime_str(content_type)
                .map_err(|e| SubmitError::Malformed(e.to_string()))?;
        }
        form = form.part(attachment.field.clone(), part);
    }
    Ok(form)
}

/// Classify a submission answer.
///
/// Accepts the queued id at `data.result.id` (tool route), `data.job_id`
/// (expert route) or a top-level `id` (hosted functions), string or number.
/// A `data.result.message` without an id is a synchronous result.
pub fn parse_submit_response(status: StatusCode, body: &Value) -> Result<SubmitResponse, SubmitError> {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(SubmitError::Unauthorized(error_message(body)));
    }
    if !status.is_success() {
        return Err(SubmitError::Rejected {
            status: status.as_u16(),
            message: error_message(body),
        });
    }
    if !body.is_object() {
        return Err(SubmitError::Malformed("response is not a JSON object".into()));
    }
    if body.get("success").and_then(Value::as_bool) == Some(false) {
        return Err(SubmitError::Rejected {
            status: status.as_u16(),
            message: error_message(body),
        });
    }

    let data = &body["data"];
    let result = &data["result"];
    let id = id_value(&result["id"])
        .or_else(|| id_value(&data["job_id"]))
        .or_else(|| id_value(&data["id"]))
        .or_else(|| id_value(&body["id"]));
    if id.is_none() && !body["error"].is_null() {
        return Err(SubmitError::Rejected {
            status: status.as_u16(),
            message: error_message(body),
        });
    }
    if let Some(id) = id {
        return Ok(SubmitResponse::Accepted(JobId::new(id)));
    }

    match first_message(&result["message"]) {
        Some(url) => Ok(SubmitResponse::Inline(Artifact::new(as_image_url(url)))),
        None => Err(SubmitError::Malformed(
            "response carries neither a job id nor a result".into(),
        )),
    }
}

/// Classify one `/get-result/{id}` answer.
pub fn parse_status_response(body: &Value) -> Result<PollStatus, TransportError> {
    if !body.is_object() {
        return Err(TransportError::Decode("response is not a JSON object".into()));
    }
    if body.get("success").and_then(Value::as_bool) == Some(false) {
        return Err(TransportError::Decode(error_message(body)));
    }

    let data = &body["data"];
    match data["status"].as_str() {
        Some("success") => match first_message(&data["message"]) {
            Some(url) => Ok(PollStatus::Succeeded(Artifact::new(as_image_url(url)))),
            // Marked done before the image is attached; keep waiting.
            None => Ok(PollStatus::Pending),
        },
        Some(status @ ("failed" | "error")) => {
            let reason = failure_reason(data, status);
            warn!("Remote job reported {}: {}", status, reason);
            Ok(PollStatus::Failed(reason))
        }
        _ => Ok(PollStatus::Pending),
    }
}

/// The backend reports failures either as a plain `error` string or as the
/// vendor's error object (`{status, message}`).
fn failure_reason(data: &Value, status: &str) -> String {
    match &data["error"] {
        Value::String(s) if !s.is_empty() => s.clone(),
        Value::Object(error) => error
            .get("message")
            .or_else(|| error.get("error"))
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Value::Object(error.clone()).to_string()),
        _ => data["message"].as_str().unwrap_or(status).to_string(),
    }
}

fn id_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn first_message(value: &Value) -> Option<&str> {
    let message = match value {
        Value::Array(items) => items.first()?.as_str()?,
        Value::String(s) => s.as_str(),
        _ => return None,
    };
    (!message.is_empty()).then_some(message)
}

/// Some tools answer with bare base64 image data instead of a URL.
fn as_image_url(message: &str) -> String {
    if message.starts_with("http://") || message.starts_with("https://") || message.starts_with("data:") {
        message.to_string()
    } else {
        format!("data:image/png;base64,{}", message)
    }
}

fn error_message(body: &Value) -> String {
    body.get("error")
        .or_else(|| body.get("message"))
        .and_then(Value::as_str)
        .unwrap_or("no error message")
        .to_string()
}
