//! Collaborator traits consumed by the orchestrator.
//!
//! Concrete implementations live with the tools; the orchestrator only sees
//! these four seams.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::{SinkError, SubmitError, TransportError};
use crate::types::{Artifact, FailureReason, JobId, JobPayload, PollStatus, SubmitResponse};

/// Makes the initial request for a job.
#[async_trait]
pub trait JobSubmitter: Send + Sync {
    async fn submit(&self, payload: &JobPayload) -> Result<SubmitResponse, SubmitError>;

    /// Ask the remote system to drop a job nobody waits for anymore.
    /// Best effort; the default does nothing.
    async fn abandon(&self, _id: &JobId) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Reports the current status of a previously accepted job.
#[async_trait]
pub trait StatusPoller: Send + Sync {
    async fn poll(&self, id: &JobId) -> Result<PollStatus, TransportError>;
}

/// Durably records a successful artifact (history, credit debit).
///
/// Called at most once per job. Implementations shared between jobs must
/// serialize their own writes.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn record(&self, artifact: &Artifact) -> Result<(), SinkError>;
}

/// Surfaces job progress and the final outcome to the user.
pub trait Notifier: Send + Sync {
    /// The remote system queued the job under `id`. Not called for inline
    /// results.
    fn report_accepted(&self, _id: &JobId) {}
    fn report_progress(&self, elapsed: Duration);
    fn report_success(&self, artifact: &Artifact);
    fn report_failure(&self, reason: &FailureReason);
    fn report_timeout(&self);
    fn report_cancelled(&self) {}
}

/// Notifier that only writes to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn report_accepted(&self, id: &JobId) {
        info!(job_id = %id, "Job processing started");
    }

    fn report_progress(&self, elapsed: Duration) {
        debug!("Job still processing after {:.1}s", elapsed.as_secs_f64());
    }

    fn report_success(&self, artifact: &Artifact) {
        info!("Job complete: {}", artifact.url);
    }

    fn report_failure(&self, reason: &FailureReason) {
        warn!("Job failed: {}", reason);
    }

    fn report_timeout(&self) {
        warn!("Job timed out");
    }

    fn report_cancelled(&self) {
        info!("Job cancelled");
    }
}
