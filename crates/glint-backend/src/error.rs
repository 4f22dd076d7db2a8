//! Backend error types.

use thiserror::Error;

/// Errors surfaced by a render backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// A handle does not name a live resource.
    #[error("invalid {kind} handle {id}")]
    InvalidHandle {
        /// Resource kind, e.g. "mesh" or "fence"
        kind: &'static str,
        /// The raw handle id
        id: u32,
    },

    /// An operation was issued against a resource in the wrong state,
    /// e.g. recording into a command buffer that was never begun.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The device rejected a submission.
    #[error("submission failed: {0}")]
    SubmitFailed(String),
}

/// Result type alias using our BackendError type.
pub type Result<T> = std::result::Result<T, BackendError>;
