//! The per-job task: submit, poll until terminal, dispatch once.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, error, info, warn};

use crate::orchestrator::Collaborators;
use crate::types::{
    Artifact, FailureReason, Job, JobId, JobOutcome, JobPayload, PollStatus, SubmitResponse,
};
use arqonz_core::PollingConfig;

pub(crate) struct JobRun {
    collaborators: Collaborators,
    config: PollingConfig,
    payload: JobPayload,
    job: Job,
    publish: watch::Sender<Job>,
    cancel: watch::Receiver<bool>,
}

impl JobRun {
    pub(crate) fn new(
        collaborators: Collaborators,
        config: PollingConfig,
        payload: JobPayload,
        publish: watch::Sender<Job>,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            collaborators,
            config,
            payload,
            job: Job::new(),
            publish,
            cancel,
        }
    }

    pub(crate) async fn execute(mut self) -> JobOutcome {
        let outcome = self.drive().await;
        self.settle(outcome).await
    }

    /// Runs until an outcome is known. Never touches the sink or the
    /// notifier's terminal reports; that is `settle`'s job alone.
    async fn drive(&mut self) -> JobOutcome {
        self.update(|job| job.begin_submission());
        let started = Instant::now();
        let deadline = started + self.config.timeout();

        let submitter = self.collaborators.submitter.clone();
        let submitted = tokio::select! {
            biased;
            _ = cancelled(&mut self.cancel) => return JobOutcome::Cancelled,
            result = submitter.submit(&self.payload) => result,
        };

        let id = match submitted {
            Ok(SubmitResponse::Accepted(id)) => id,
            Ok(SubmitResponse::Inline(artifact)) => {
                info!("Job completed inline at submission");
                return JobOutcome::Succeeded(self.complete_meta(artifact));
            }
            Err(e) => {
                warn!("Job submission failed: {}", e);
                return JobOutcome::Failed(FailureReason::Submission {
                    message: e.to_string(),
                });
            }
        };

        info!(job_id = %id, "Job accepted, polling every {}ms", self.config.poll_interval_ms);
        self.update(|job| job.accept(id.clone()));
        self.collaborators.notifier.report_accepted(&id);

        self.poll_until_terminal(&id, started, deadline).await
    }

    async fn poll_until_terminal(
        &mut self,
        id: &JobId,
        started: Instant,
        deadline: Instant,
    ) -> JobOutcome {
        let poller = self.collaborators.poller.clone();
        let interval = self.config.poll_interval();
        let mut consecutive_failures = 0u32;
        let mut attempt = 0u32;

        loop {
            // A poll that would fire past the deadline is preempted by it.
            let wake = (Instant::now() + interval).min(deadline);
            tokio::select! {
                biased;
                _ = cancelled(&mut self.cancel) => return JobOutcome::Cancelled,
                _ = sleep_until(wake) => {}
            }
            if Instant::now() >= deadline {
                return self.timed_out(id, started);
            }

            attempt += 1;
            let status = tokio::select! {
                biased;
                _ = cancelled(&mut self.cancel) => return JobOutcome::Cancelled,
                _ = sleep_until(deadline) => return self.timed_out(id, started),
                result = poller.poll(id) => result,
            };

            match status {
                Ok(PollStatus::Pending) => {
                    consecutive_failures = 0;
                    let elapsed = started.elapsed();
                    debug!(job_id = %id, "Poll {}: pending ({:.1}s)", attempt, elapsed.as_secs_f64());
                    self.collaborators.notifier.report_progress(elapsed);
                }
                Ok(PollStatus::Succeeded(artifact)) => {
                    info!(job_id = %id, "Poll {}: succeeded", attempt);
                    return JobOutcome::Succeeded(self.complete_meta(artifact));
                }
                Ok(PollStatus::Failed(message)) => {
                    warn!(job_id = %id, "Poll {}: remote failure: {}", attempt, message);
                    return JobOutcome::Failed(FailureReason::Remote { message });
                }
                Err(e) => {
                    consecutive_failures += 1;
                    if consecutive_failures > self.config.max_transport_retries {
                        error!(
                            job_id = %id,
                            "Status check unreachable after {} attempts: {}",
                            consecutive_failures, e
                        );
                        return JobOutcome::Failed(FailureReason::PollingUnreachable {
                            attempts: consecutive_failures,
                            last_error: e.to_string(),
                        });
                    }
                    warn!(
                        job_id = %id,
                        "Status check failed ({}/{}), retrying: {}",
                        consecutive_failures, self.config.max_transport_retries, e
                    );
                }
            }
        }
    }

    /// Publish the terminal state and run exactly one terminal dispatch.
    async fn settle(mut self, outcome: JobOutcome) -> JobOutcome {
        self.update(|job| job.finish(&outcome));
        let notifier = self.collaborators.notifier.clone();

        match &outcome {
            JobOutcome::Succeeded(artifact) => {
                if let Err(e) = self.collaborators.sink.record(artifact).await {
                    error!("Failed to record result {}: {}", artifact.url, e);
                }
                notifier.report_success(artifact);
            }
            JobOutcome::Failed(reason) => notifier.report_failure(reason),
            JobOutcome::TimedOut => notifier.report_timeout(),
            JobOutcome::Cancelled => {
                if let Some(id) = self.job.id.clone() {
                    self.abandon_remote(&id).await;
                }
                info!("Job cancelled by caller");
                notifier.report_cancelled();
            }
        }

        outcome
    }

    async fn abandon_remote(&self, id: &JobId) {
        let grace = self.config.poll_interval().max(Duration::from_millis(100));
        match timeout(grace, self.collaborators.submitter.abandon(id)).await {
            Ok(Ok(())) => debug!(job_id = %id, "Remote job abandoned"),
            Ok(Err(e)) => debug!(job_id = %id, "Remote abandon failed: {}", e),
            Err(_) => debug!(job_id = %id, "Remote abandon timed out"),
        }
    }

    fn timed_out(&self, id: &JobId, started: Instant) -> JobOutcome {
        warn!(
            job_id = %id,
            "Job still pending after {:.1}s, giving up",
            started.elapsed().as_secs_f64()
        );
        JobOutcome::TimedOut
    }

    fn complete_meta(&self, mut artifact: Artifact) -> Artifact {
        if artifact.meta.tool_name.is_none() {
            artifact.meta.tool_name = self.payload.tool_name.clone();
        }
        if artifact.meta.prompt.is_none() {
            artifact.meta.prompt = self.payload.prompt.clone();
        }
        artifact
    }

    fn update<F, E>(&mut self, apply: F)
    where
        F: FnOnce(&mut Job) -> Result<(), E>,
        E: std::fmt::Display,
    {
        if let Err(e) = apply(&mut self.job) {
            error!("{}", e);
            return;
        }
        self.publish.send_replace(self.job.clone());
    }
}

/// Resolves once cancellation is requested. Pends forever if the switch is
/// gone, since nobody can cancel anymore.
async fn cancelled(signal: &mut watch::Receiver<bool>) {
    if signal.wait_for(|requested| *requested).await.is_err() {
        std::future::pending::<()>().await;
    }
}
