//! Errors raised by job collaborators.
//!
//! None of these escape [`crate::orchestrate`]: each is folded into the
//! terminal [`crate::JobOutcome`] of the job it occurred in.

use thiserror::Error;

/// The initial submission failed outright. Never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error("rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("request failed: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// A single status check failed at the network or protocol level.
///
/// Retried in place by the orchestrator up to its configured bound.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),

    #[error("status endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("undecodable status response: {0}")]
    Decode(String),
}

/// Recording a successful artifact failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("result sink error: {0}")]
pub struct SinkError(pub String);
