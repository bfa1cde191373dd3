//! User-facing toasts for job outcomes.

use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use arqonz_jobs::{Artifact, FailureReason, JobId, Notifier};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastVariant {
    Default,
    Destructive,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Toast {
    pub title: String,
    pub description: String,
    pub variant: ToastVariant,
    pub at: DateTime<Utc>,
}

impl Toast {
    fn new(title: &str, description: impl Into<String>, variant: ToastVariant) -> Self {
        Self {
            title: title.to_string(),
            description: description.into(),
            variant,
            at: Utc::now(),
        }
    }
}

#[derive(Debug, Default)]
struct ToastState {
    toasts: Vec<Toast>,
    elapsed: Option<Duration>,
}

/// Collects the toasts one job would show its user.
///
/// Progress only updates the elapsed time; acceptance and terminal reports
/// push a toast.
#[derive(Debug, Default)]
pub struct ToastNotifier {
    state: Mutex<ToastState>,
}

impl ToastNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toasts(&self) -> Vec<Toast> {
        self.state.lock().toasts.clone()
    }

    /// Elapsed time at the last pending poll.
    pub fn elapsed(&self) -> Option<Duration> {
        self.state.lock().elapsed
    }

    fn push(&self, toast: Toast) {
        self.state.lock().toasts.push(toast);
    }
}

impl Notifier for ToastNotifier {
    fn report_accepted(&self, _id: &JobId) {
        self.push(Toast::new(
            "Processing Started",
            "Your image is being processed. Please wait...",
            ToastVariant::Default,
        ));
    }

    fn report_progress(&self, elapsed: Duration) {
        self.state.lock().elapsed = Some(elapsed);
    }

    fn report_success(&self, _artifact: &Artifact) {
        let description = match self.elapsed() {
            Some(elapsed) => format!("Image generated in {}s", elapsed.as_secs()),
            None => "Image generated".to_string(),
        };
        self.push(Toast::new("Generation Complete!", description, ToastVariant::Default));
    }

    fn report_failure(&self, reason: &FailureReason) {
        let description = match reason {
            FailureReason::Remote { message } | FailureReason::Submission { message } => {
                message.clone()
            }
            _ => "There was an error generating your image.".to_string(),
        };
        self.push(Toast::new("Generation Failed", description, ToastVariant::Destructive));
    }

    fn report_timeout(&self) {
        self.push(Toast::new(
            "Generation Timeout",
            "Image generation is taking too long. Please try again.",
            ToastVariant::Destructive,
        ));
    }

    fn report_cancelled(&self) {
        self.push(Toast::new(
            "Generation Cancelled",
            "The image generation was cancelled.",
            ToastVariant::Default,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_reports_elapsed_seconds() {
        let notifier = ToastNotifier::new();
        notifier.report_progress(Duration::from_millis(4_000));
        notifier.report_progress(Duration::from_millis(12_300));
        notifier.report_success(&Artifact::new("https://cdn/x.png"));

        let toasts = notifier.toasts();
        assert_eq!(toasts.len(), 1);
        assert_eq!(toasts[0].title, "Generation Complete!");
        assert_eq!(toasts[0].description, "Image generated in 12s");
    }

    #[test]
    fn test_accepted_then_success() {
        let notifier = ToastNotifier::new();
        notifier.report_accepted(&JobId::new("42"));
        notifier.report_success(&Artifact::new("https://cdn/x.png"));

        let toasts = notifier.toasts();
        assert_eq!(toasts.len(), 2);
        assert_eq!(toasts[0].title, "Processing Started");
        assert_eq!(
            toasts[0].description,
            "Your image is being processed. Please wait..."
        );
        assert_eq!(toasts[0].variant, ToastVariant::Default);
        assert_eq!(toasts[1].title, "Generation Complete!");
    }

    #[test]
    fn test_timeout_message() {
        let notifier = ToastNotifier::new();
        notifier.report_timeout();
        let toast = &notifier.toasts()[0];
        assert_eq!(toast.title, "Generation Timeout");
        assert_eq!(
            toast.description,
            "Image generation is taking too long. Please try again."
        );
        assert_eq!(toast.variant, ToastVariant::Destructive);
    }

    #[test]
    fn test_failure_messages() {
        let notifier = ToastNotifier::new();
        notifier.report_failure(&FailureReason::Remote {
            message: "NSFW content".into(),
        });
        notifier.report_failure(&FailureReason::PollingUnreachable {
            attempts: 4,
            last_error: "connection refused".into(),
        });
        let toasts = notifier.toasts();
        assert_eq!(toasts[0].description, "NSFW content");
        assert_eq!(
            toasts[1].description,
            "There was an error generating your image."
        );
    }
}
