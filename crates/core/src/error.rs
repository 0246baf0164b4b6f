//! Error types for the event-synchronization layer.
//!
//! None of these ever reach the remote agent. `ArgumentsError` is a recovered
//! degradation (the invocation proceeds with an empty record); the others are
//! reported to the Session Lifecycle Manager through its logs.

/// Why accumulated tool-call arguments could not be used as a structured record.
#[derive(Debug, thiserror::Error)]
pub enum ArgumentsError {
    #[error("arguments are not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("arguments decoded to a JSON {0}, expected an object")]
    NotARecord(&'static str),
}

/// The outbound send primitive is no longer accepting events.
#[derive(Debug, thiserror::Error)]
#[error("outbound channel closed")]
pub struct SinkError;

/// Failures when talking to a running session from the outside.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session task has already stopped")]
    Stopped,
    #[error("session task panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
}
