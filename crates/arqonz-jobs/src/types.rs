//! Job data model and state machine.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier assigned by the remote system once a submission is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobState {
    Idle,
    Submitting,
    Polling,
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
}

impl JobState {
    /// Terminal states accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::TimedOut | Self::Cancelled
        )
    }

    /// Whether `self -> next` is an edge of the job state machine.
    ///
    /// `Polling -> Polling` (another pending poll) is not a state change and
    /// is not listed.
    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Idle, Submitting)
                | (Submitting, Polling)
                | (Submitting, Succeeded)
                | (Submitting, Failed)
                | (Submitting, Cancelled)
                | (Polling, Succeeded)
                | (Polling, Failed)
                | (Polling, TimedOut)
                | (Polling, Cancelled)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Submitting => write!(f, "submitting"),
            Self::Polling => write!(f, "polling"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::TimedOut => write!(f, "timedOut"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Optional context carried alongside a produced artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(rename = "toolName", skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

/// Reference to a generated result, usually an image URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub url: String,
    #[serde(default)]
    pub meta: ArtifactMeta,
}

impl Artifact {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            meta: ArtifactMeta::default(),
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.meta.prompt = Some(prompt.into());
        self
    }
}

/// A binary part of a submission, e.g. the uploaded source image.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub field: String,
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Opaque submission request built by a tool.
///
/// The orchestrator never inspects `body` or `attachments`; `tool_name` and
/// `prompt` only seed artifact metadata the collaborators left empty.
#[derive(Debug, Clone, Default)]
pub struct JobPayload {
    pub tool_name: Option<String>,
    pub prompt: Option<String>,
    pub body: serde_json::Value,
    pub attachments: Vec<Attachment>,
}

impl JobPayload {
    pub fn new(body: serde_json::Value) -> Self {
        Self {
            body,
            ..Self::default()
        }
    }

    pub fn for_tool(mut self, tool_name: impl Into<String>) -> Self {
        self.tool_name = Some(tool_name.into());
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}

/// What the remote system answered to a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitResponse {
    /// Work was queued; poll with this id.
    Accepted(JobId),
    /// The result came back synchronously; no polling needed.
    Inline(Artifact),
}

/// A well-formed answer to a single status poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    Pending,
    Succeeded(Artifact),
    Failed(String),
}

/// Classified reason behind a `Failed` outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum FailureReason {
    /// The initial request was refused or could not be made. Never retried.
    Submission { message: String },
    /// The remote system reported the job itself as failed.
    Remote { message: String },
    /// Consecutive status checks failed at the transport level.
    #[serde(rename_all = "camelCase")]
    PollingUnreachable { attempts: u32, last_error: String },
    /// The job task itself aborted.
    Internal { message: String },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Submission { message } => write!(f, "submission failed: {}", message),
            Self::Remote { message } => write!(f, "remote job failed: {}", message),
            Self::PollingUnreachable {
                attempts,
                last_error,
            } => write!(
                f,
                "polling unreachable after {} attempts: {}",
                attempts, last_error
            ),
            Self::Internal { message } => write!(f, "internal error: {}", message),
        }
    }
}

/// Terminal result of one orchestrated job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "camelCase")]
pub enum JobOutcome {
    Succeeded(Artifact),
    Failed(FailureReason),
    TimedOut,
    Cancelled,
}

impl JobOutcome {
    /// The terminal state this outcome puts a job in.
    pub fn state(&self) -> JobState {
        match self {
            Self::Succeeded(_) => JobState::Succeeded,
            Self::Failed(_) => JobState::Failed,
            Self::TimedOut => JobState::TimedOut,
            Self::Cancelled => JobState::Cancelled,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid job transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: JobState,
    pub to: JobState,
}

/// One in-flight unit of remote work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<JobId>,
    #[serde(rename = "submittedAt", skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
    pub state: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Artifact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureReason>,
}

impl Default for Job {
    fn default() -> Self {
        Self::new()
    }
}

impl Job {
    pub fn new() -> Self {
        Self {
            id: None,
            submitted_at: None,
            state: JobState::Idle,
            result: None,
            error: None,
        }
    }

    /// Time since submission, sampled now. `None` before submission.
    pub fn elapsed(&self) -> Option<Duration> {
        self.submitted_at
            .map(|at| (Utc::now() - at).to_std().unwrap_or_default())
    }

    pub fn transition(&mut self, next: JobState) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    pub(crate) fn begin_submission(&mut self) -> Result<(), InvalidTransition> {
        self.transition(JobState::Submitting)?;
        self.submitted_at = Some(Utc::now());
        Ok(())
    }

    pub(crate) fn accept(&mut self, id: JobId) -> Result<(), InvalidTransition> {
        // The id must be in place before the job is observable as Polling.
        if self.id.is_none() {
            self.id = Some(id);
        }
        self.transition(JobState::Polling)
    }

    pub(crate) fn finish(&mut self, outcome: &JobOutcome) -> Result<(), InvalidTransition> {
        self.transition(outcome.state())?;
        match outcome {
            JobOutcome::Succeeded(artifact) => self.result = Some(artifact.clone()),
            JobOutcome::Failed(reason) => self.error = Some(reason.clone()),
            JobOutcome::TimedOut | JobOutcome::Cancelled => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [JobState; 7] = [
        JobState::Idle,
        JobState::Submitting,
        JobState::Polling,
        JobState::Succeeded,
        JobState::Failed,
        JobState::TimedOut,
        JobState::Cancelled,
    ];

    #[test]
    fn test_terminal_states_have_no_exits() {
        for from in ALL.iter().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn test_timeout_only_from_polling() {
        for from in ALL {
            let allowed = from.can_transition_to(JobState::TimedOut);
            assert_eq!(allowed, from == JobState::Polling, "{}", from);
        }
    }

    #[test]
    fn test_idle_only_submits() {
        let exits: Vec<_> = ALL
            .into_iter()
            .filter(|s| JobState::Idle.can_transition_to(*s))
            .collect();
        assert_eq!(exits, vec![JobState::Submitting]);
    }

    #[test]
    fn test_job_lifecycle_sets_fields() {
        let mut job = Job::new();
        assert!(job.elapsed().is_none());

        job.begin_submission().unwrap();
        assert!(job.submitted_at.is_some());
        assert!(job.elapsed().is_some());

        job.accept(JobId::from("42")).unwrap();
        assert_eq!(job.state, JobState::Polling);
        assert_eq!(job.id, Some(JobId::from("42")));

        let outcome = JobOutcome::Succeeded(Artifact::new("https://x/img.png"));
        job.finish(&outcome).unwrap();
        assert_eq!(job.state, JobState::Succeeded);
        assert_eq!(job.result.as_ref().unwrap().url, "https://x/img.png");
        assert!(job.error.is_none());
    }

    #[test]
    fn test_failed_job_carries_error_only() {
        let mut job = Job::new();
        job.begin_submission().unwrap();
        let outcome = JobOutcome::Failed(FailureReason::Submission {
            message: "401".into(),
        });
        job.finish(&outcome).unwrap();
        assert!(job.result.is_none());
        assert!(matches!(job.error, Some(FailureReason::Submission { .. })));
    }

    #[test]
    fn test_second_terminal_transition_rejected() {
        let mut job = Job::new();
        job.begin_submission().unwrap();
        job.finish(&JobOutcome::Cancelled).unwrap();

        let err = job.finish(&JobOutcome::TimedOut).unwrap_err();
        assert_eq!(err.from, JobState::Cancelled);
        assert_eq!(job.state, JobState::Cancelled);
    }

    #[test]
    fn test_outcome_json_shape() {
        let json = serde_json::to_value(JobOutcome::Failed(FailureReason::PollingUnreachable {
            attempts: 4,
            last_error: "connection refused".into(),
        }))
        .unwrap();
        assert_eq!(json["outcome"], "failed");
        assert_eq!(json["detail"]["kind"], "pollingUnreachable");
        assert_eq!(json["detail"]["attempts"], 4);
        assert_eq!(json["detail"]["lastError"], "connection refused");

        let json = serde_json::to_value(JobOutcome::TimedOut).unwrap();
        assert_eq!(json["outcome"], "timedOut");
    }
}
