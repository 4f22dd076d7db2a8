//! Frame-graph error taxonomy.
//!
//! Setup errors (`Config`, `Cycle`, `Capacity`) are fatal to graph
//! construction. `Recording` is fatal to the current frame only: the caller
//! skips presenting and may retry next frame. Fence timeouts are not errors
//! at all; they surface as `WaitStatus::TimedOut` from the wait calls.

use thiserror::Error;

use glint_backend::BackendError;

use crate::pass::PassState;

/// Errors produced by the frame graph, recorder and frame slots.
#[derive(Error, Debug)]
pub enum GraphError {
    /// A pass definition is invalid: duplicate name, unknown dependency,
    /// or an attachment format incompatible with its declared usage.
    #[error("invalid pass {pass:?}: {reason}")]
    Config {
        /// The offending pass
        pass: String,
        /// What was wrong with it
        reason: String,
    },

    /// The dependency graph contains a cycle.
    #[error("dependency cycle between passes {passes:?}")]
    Cycle {
        /// The passes that could not be scheduled
        passes: Vec<String>,
    },

    /// A worker failed to record an object. The pass was aborted and none
    /// of its secondary buffers were spliced or submitted.
    #[error("recording failed in pass {pass:?} at object {object_index}: {source}")]
    Recording {
        /// The pass being recorded
        pass: String,
        /// Index of the offending object in the frame's object list
        object_index: usize,
        /// The underlying backend failure
        source: BackendError,
    },

    /// An operation was issued against a pass in the wrong lifecycle state.
    #[error("pass {pass:?} is {actual:?}, expected {expected:?}")]
    State {
        /// The pass
        pass: String,
        /// State required by the operation
        expected: PassState,
        /// State the pass was actually in
        actual: PassState,
    },

    /// A recorder worker thread terminated outside the shutdown protocol.
    #[error("a recorder worker terminated unexpectedly")]
    WorkerLost,

    /// A bounded sequence would overflow its capacity.
    #[error(transparent)]
    Capacity(#[from] glint_core::Error),

    /// The backend rejected an operation outside per-object recording.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Result type alias using our GraphError type.
pub type Result<T> = std::result::Result<T, GraphError>;
