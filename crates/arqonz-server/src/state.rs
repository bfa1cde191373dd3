//! Shared application state.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info};

use arqonz_core::ArqonzConfig;
use arqonz_jobs::{
    Artifact, CancelHandle, Collaborators, FailureReason, Job, JobOrchestrator, JobPayload,
    JobState, TracingNotifier,
};
use arqonz_tools::{FanoutSink, GatewayClient, HistoryStore, Toast, ToastNotifier, ToolKind};

/// Finished jobs kept for inspection.
const MAX_FINISHED_JOBS: usize = 100;

/// A job started through the API.
pub struct JobRecord {
    pub key: String,
    pub tool: ToolKind,
    pub panel: String,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    job: watch::Receiver<Job>,
    canceller: CancelHandle,
    toasts: Arc<ToastNotifier>,
}

/// Wire view of a [`JobRecord`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    pub key: String,
    pub tool: ToolKind,
    pub panel: String,
    pub state: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Artifact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureReason>,
    pub toasts: Vec<Toast>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    pub fn state(&self) -> JobState {
        self.job.borrow().state
    }

    pub fn view(&self) -> JobView {
        let job = self.job.borrow().clone();
        let elapsed_ms = if job.state.is_terminal() {
            match (job.submitted_at, self.finished_at) {
                (Some(start), Some(end)) => (end - start).to_std().ok(),
                _ => job.elapsed(),
            }
        } else {
            job.elapsed()
        };

        JobView {
            key: self.key.clone(),
            tool: self.tool,
            panel: self.panel.clone(),
            state: job.state,
            remote_id: job.id.map(|id| id.to_string()),
            elapsed_ms: elapsed_ms.map(|d| d.as_millis() as u64),
            result: job.result,
            error: job.error,
            toasts: self.toasts.toasts(),
            created_at: self.created_at,
            finished_at: self.finished_at,
        }
    }
}

/// Shared application state accessible from all route handlers.
pub struct AppState {
    pub config: ArqonzConfig,
    pub history: Arc<HistoryStore>,
    collaborators: Collaborators,
    panels: RwLock<HashMap<String, Arc<JobOrchestrator>>>,
    pub jobs: RwLock<HashMap<String, JobRecord>>,
}

impl AppState {
    pub fn new(config: ArqonzConfig) -> Self {
        let gateway = Arc::new(GatewayClient::new(config.gateway.clone()));
        let history = Arc::new(HistoryStore::load(&config.data_paths.image_history));
        info!("Loaded {} history items", history.len());

        let sink = FanoutSink::new().with(history.clone()).with(gateway.clone());
        let collaborators = Collaborators::new(
            gateway.clone(),
            gateway,
            Arc::new(sink),
            Arc::new(TracingNotifier),
        );
        Self::with_collaborators(config, collaborators, history)
    }

    pub fn with_collaborators(
        config: ArqonzConfig,
        collaborators: Collaborators,
        history: Arc<HistoryStore>,
    ) -> Self {
        Self {
            config,
            history,
            collaborators,
            panels: RwLock::new(HashMap::new()),
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// The orchestrator behind one tool panel, created on first use.
    fn panel(&self, name: &str) -> Arc<JobOrchestrator> {
        if let Some(orchestrator) = self.panels.read().get(name) {
            return orchestrator.clone();
        }
        self.panels
            .write()
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(JobOrchestrator::new(
                    self.collaborators.clone(),
                    self.config.polling,
                ))
            })
            .clone()
    }

    /// Start a job on `panel`, superseding that panel's unresolved job.
    /// Returns the key the job is tracked under.
    pub fn start_job(self: &Arc<Self>, tool: ToolKind, panel: &str, payload: JobPayload) -> String {
        let key = uuid::Uuid::new_v4().to_string();
        let toasts = Arc::new(ToastNotifier::new());
        let handle = self.panel(panel).submit_with_notifier(payload, toasts.clone());

        self.jobs.write().insert(
            key.clone(),
            JobRecord {
                key: key.clone(),
                tool,
                panel: panel.to_string(),
                created_at: Utc::now(),
                finished_at: None,
                job: handle.subscribe(),
                canceller: handle.canceller(),
                toasts,
            },
        );
        info!("Job {} started on panel '{}' ({})", key, panel, tool);

        let state = self.clone();
        let watched = key.clone();
        tokio::spawn(async move {
            let outcome = handle.outcome().await;
            debug!("Job {} settled as {}", watched, outcome.state());
            state.mark_finished(&watched);
        });

        key
    }

    /// `None` for an unknown key, otherwise whether cancellation took.
    pub fn cancel_job(&self, key: &str) -> Option<bool> {
        self.jobs.read().get(key).map(|record| record.canceller.cancel())
    }

    fn mark_finished(&self, key: &str) {
        if let Some(record) = self.jobs.write().get_mut(key) {
            record.finished_at = Some(Utc::now());
        }
        self.cleanup_finished_jobs();
    }

    /// Keep only the most recent finished jobs.
    fn cleanup_finished_jobs(&self) {
        let mut jobs = self.jobs.write();
        let mut finished: Vec<(String, DateTime<Utc>)> = jobs
            .values()
            .filter_map(|j| j.finished_at.map(|at| (j.key.clone(), at)))
            .collect();
        if finished.len() <= MAX_FINISHED_JOBS {
            return;
        }

        finished.sort_by(|a, b| a.1.cmp(&b.1));
        let remove_count = finished.len() - MAX_FINISHED_JOBS;
        for (key, _) in finished.into_iter().take(remove_count) {
            jobs.remove(&key);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{test_state, FakeBackend};
    use super::*;
    use std::time::Duration;

    use arqonz_jobs::PollStatus;
    use tempfile::TempDir;

    fn payload() -> JobPayload {
        JobPayload::new(serde_json::json!({"tool": "imagine-ai"}))
            .for_tool("Imagine AI")
            .with_prompt("glass pavilion")
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_lands_in_history() {
        let tmp = TempDir::new().unwrap();
        let backend = FakeBackend::new(vec![
            PollStatus::Pending,
            PollStatus::Succeeded(Artifact::new("https://cdn/p.png")),
        ]);
        let state = test_state(tmp.path(), backend);

        let key = state.start_job(ToolKind::ImagineAi, "imagine", payload());
        tokio::time::sleep(Duration::from_secs(10)).await;

        let view = state.jobs.read()[&key].view();
        assert_eq!(view.state, JobState::Succeeded);
        assert_eq!(view.remote_id.as_deref(), Some("remote-1"));
        assert!(view.finished_at.is_some());
        let titles: Vec<_> = view.toasts.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["Processing Started", "Generation Complete!"]);

        let history = state.history.list();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].tool_name, "Imagine AI");
        assert_eq!(history[0].prompt.as_deref(), Some("glass pavilion"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_panel_supersedes() {
        let tmp = TempDir::new().unwrap();
        let state = test_state(tmp.path(), FakeBackend::new(vec![]));

        let first = state.start_job(ToolKind::ImagineAi, "imagine", payload());
        tokio::time::sleep(Duration::from_secs(1)).await;
        let second = state.start_job(ToolKind::ImagineAi, "imagine", payload());
        let other = state.start_job(ToolKind::ImagineAi, "elsewhere", payload());
        tokio::time::sleep(Duration::from_secs(1)).await;

        let jobs = state.jobs.read();
        assert_eq!(jobs[&first].state(), JobState::Cancelled);
        assert_eq!(jobs[&second].state(), JobState::Polling);
        assert_eq!(jobs[&other].state(), JobState::Polling);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_job() {
        let tmp = TempDir::new().unwrap();
        let state = test_state(tmp.path(), FakeBackend::new(vec![]));

        let key = state.start_job(ToolKind::ImagineAi, "imagine", payload());
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(state.cancel_job("missing"), None);
        assert_eq!(state.cancel_job(&key), Some(true));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(state.cancel_job(&key), Some(false));
        assert_eq!(state.jobs.read()[&key].state(), JobState::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finished_jobs_are_capped() {
        let tmp = TempDir::new().unwrap();
        let state = test_state(tmp.path(), FakeBackend::new(vec![]));

        for i in 0..(MAX_FINISHED_JOBS + 5) {
            let key = state.start_job(ToolKind::ImagineAi, &format!("p{}", i), payload());
            state.cancel_job(&key);
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        let live = state.start_job(ToolKind::ImagineAi, "live", payload());
        tokio::time::sleep(Duration::from_secs(1)).await;

        let jobs = state.jobs.read();
        assert_eq!(jobs.len(), MAX_FINISHED_JOBS + 1);
        assert!(jobs.contains_key(&live));
    }
}
