//! Starts jobs and keeps one active job per tool panel.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::info;

use crate::collaborators::{JobSubmitter, Notifier, ResultSink, StatusPoller};
use crate::driver::JobRun;
use crate::handle::{CancelHandle, JobHandle};
use crate::types::{Job, JobPayload};
use arqonz_core::PollingConfig;

/// The four external seams a job runs against.
#[derive(Clone)]
pub struct Collaborators {
    pub submitter: Arc<dyn JobSubmitter>,
    pub poller: Arc<dyn StatusPoller>,
    pub sink: Arc<dyn ResultSink>,
    pub notifier: Arc<dyn Notifier>,
}

impl Collaborators {
    pub fn new(
        submitter: Arc<dyn JobSubmitter>,
        poller: Arc<dyn StatusPoller>,
        sink: Arc<dyn ResultSink>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            submitter,
            poller,
            sink,
            notifier,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }
}

/// Start one job on the current tokio runtime.
///
/// The returned handle observes and cancels the job; `outcome().await`
/// yields its single terminal [`crate::JobOutcome`].
pub fn orchestrate(
    collaborators: Collaborators,
    payload: JobPayload,
    config: PollingConfig,
) -> JobHandle {
    let (publish, job_rx) = watch::channel(Job::new());
    let (signal, cancel_rx) = watch::channel(false);
    let canceller = CancelHandle::new(Arc::new(signal), job_rx.clone());

    let run = JobRun::new(collaborators, config, payload, publish, cancel_rx);
    let task = tokio::spawn(run.execute());

    JobHandle::new(canceller, job_rx, task)
}

/// Runs jobs for one tool panel, at most one at a time.
///
/// Submitting while a previous job is unresolved cancels that job first.
pub struct JobOrchestrator {
    collaborators: Collaborators,
    config: PollingConfig,
    active: Mutex<Option<CancelHandle>>,
}

impl JobOrchestrator {
    pub fn new(collaborators: Collaborators, config: PollingConfig) -> Self {
        Self {
            collaborators,
            config,
            active: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &PollingConfig {
        &self.config
    }

    pub fn submit(&self, payload: JobPayload) -> JobHandle {
        self.submit_with_notifier(payload, self.collaborators.notifier.clone())
    }

    /// Submit with a notifier dedicated to this job.
    pub fn submit_with_notifier(
        &self,
        payload: JobPayload,
        notifier: Arc<dyn Notifier>,
    ) -> JobHandle {
        let mut active = self.active.lock();
        if let Some(previous) = active.take() {
            if previous.cancel() {
                info!("Superseding unresolved job with a new submission");
            }
        }

        let collaborators = self.collaborators.clone().with_notifier(notifier);
        let handle = orchestrate(collaborators, payload, self.config);
        *active = Some(handle.canceller());
        handle
    }

    /// Cancel the active job, if any is still unresolved.
    pub fn cancel_active(&self) -> bool {
        self.active
            .lock()
            .as_ref()
            .map(|handle| handle.cancel())
            .unwrap_or(false)
    }
}
