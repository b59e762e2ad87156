use std::path::PathBuf;

use thiserror::Error;

/// Error kinds of the schedule core.
///
/// Decode and I/O failures are recovered inside the scheduler loop. Routing
/// failures only ever surface to protocol callers as a 400 status.
#[derive(Debug, Error)]
pub enum AkerError {
    #[error("failed to decode schedule: {0}")]
    DecodeFailure(String),

    #[error("I/O error at {path}: {source}")]
    IoFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("invalid destination: {0}")]
    InvalidDestination(String),

    #[error("no schedule is active")]
    NoActiveSchedule,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("agent is not running (socket missing: {socket})")]
    AgentNotRunning { socket: PathBuf },

    #[error("background task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> AkerError {
    AkerError::IoFailure {
        path: path.into(),
        source,
    }
}
