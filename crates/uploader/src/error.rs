//! Engine error types.

use ferry_transfer::TransferStatus;

/// Errors produced while moving a payload to the remote endpoint.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UploadError {
    /// Rejected before any network activity.
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// Per-call options override the configuration with invalid values.
    #[error("invalid transfer options: {0}")]
    InvalidOptions(String),

    /// Network or connection failure on a single request.
    #[error("transport error: {0}")]
    Transport(String),

    /// The endpoint answered with a non-success HTTP status.
    #[error("remote returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// The endpoint accepted the request but the response is unusable.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A cancellation signal was observed.
    #[error("cancelled")]
    Cancelled,
}

impl UploadError {
    /// Transport failures and HTTP error statuses are retried; everything
    /// else is terminal.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Status { .. })
    }
}

/// Precondition failures of registry lifecycle calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("transfer {0} not found")]
    NotFound(String),

    #[error("cannot {action} transfer {id} while it is {status}")]
    InvalidState {
        id: String,
        status: TransferStatus,
        action: &'static str,
    },

    #[error("transfer {0} is still uploading; cancel it first")]
    StillUploading(String),
}
