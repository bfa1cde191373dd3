//! Caller-side handles to a running job.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::types::{FailureReason, Job, JobOutcome, JobState};

/// Clonable cancellation switch for one job.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    signal: Arc<watch::Sender<bool>>,
    job: watch::Receiver<Job>,
}

impl CancelHandle {
    pub(crate) fn new(signal: Arc<watch::Sender<bool>>, job: watch::Receiver<Job>) -> Self {
        Self { signal, job }
    }

    /// Request cancellation.
    ///
    /// Returns `false` when the job had already reached a terminal state or
    /// was already cancelled. A `true` racing the job's own completion can
    /// still end in a non-cancelled outcome; the outcome is authoritative.
    pub fn cancel(&self) -> bool {
        if self.job.borrow().state.is_terminal() {
            return false;
        }
        !self.signal.send_replace(true)
    }

    pub fn is_cancel_requested(&self) -> bool {
        *self.signal.borrow()
    }
}

/// Handle returned by [`crate::orchestrate`].
///
/// Dropping the handle does not stop the job; it runs to its terminal state
/// and still reports through its collaborators.
#[derive(Debug)]
pub struct JobHandle {
    canceller: CancelHandle,
    job: watch::Receiver<Job>,
    task: JoinHandle<JobOutcome>,
}

impl JobHandle {
    pub(crate) fn new(
        canceller: CancelHandle,
        job: watch::Receiver<Job>,
        task: JoinHandle<JobOutcome>,
    ) -> Self {
        Self {
            canceller,
            job,
            task,
        }
    }

    /// Snapshot of the job as last published.
    pub fn job(&self) -> Job {
        self.job.borrow().clone()
    }

    pub fn state(&self) -> JobState {
        self.job.borrow().state
    }

    /// Watch every published change of the job.
    pub fn subscribe(&self) -> watch::Receiver<Job> {
        self.job.clone()
    }

    pub fn cancel(&self) -> bool {
        self.canceller.cancel()
    }

    pub fn canceller(&self) -> CancelHandle {
        self.canceller.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the terminal outcome.
    pub async fn outcome(self) -> JobOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => JobOutcome::Failed(FailureReason::Internal {
                message: e.to_string(),
            }),
        }
    }
}
