//! Remote job orchestration for the AI tool panels.
//!
//! A job is submitted once through a [`JobSubmitter`], polled through a
//! [`StatusPoller`] until it reaches a terminal state or its time budget runs
//! out, and then dispatched exactly once: a success goes to the
//! [`ResultSink`] and the [`Notifier`], every other outcome only to the
//! [`Notifier`].

pub mod collaborators;
pub mod error;
pub mod handle;
pub mod orchestrator;
pub mod types;

mod driver;

pub use arqonz_core::PollingConfig;
pub use collaborators::{JobSubmitter, Notifier, ResultSink, StatusPoller, TracingNotifier};
pub use error::{SinkError, SubmitError, TransportError};
pub use handle::{CancelHandle, JobHandle};
pub use orchestrator::{orchestrate, Collaborators, JobOrchestrator};
pub use types::*;
