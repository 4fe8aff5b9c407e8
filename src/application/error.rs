// Pipeline error types
use thiserror::Error;

/// Failure talking to the query backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Request never produced a response (connect, timeout, body read).
    #[error("request to backend failed: {0}")]
    Transport(String),

    /// Backend answered 404. Treated as an empty result, not a failure.
    #[error("no data found")]
    NotFound,

    /// Backend answered with an error status; `message` is the `data` field of its body.
    #[error("backend returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("failed to decode backend response: {0}")]
    Decode(String),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid result set: {0}")]
    InvalidResult(String),
}
