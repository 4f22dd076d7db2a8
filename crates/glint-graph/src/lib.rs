//! Pass scheduling, parallel command recording and frame synchronization.
//!
//! This crate is the core of Glint:
//! - [`FrameGraph`] registers render passes with their attachments and
//!   dependencies, orders them topologically, and emits one semaphore wait
//!   plus layout barriers per producer/consumer edge
//! - [`RecorderPool`] records per-object draw commands into secondary
//!   command buffers on a fixed pool of worker threads, splicing the
//!   results in deterministic worker-index order
//! - [`FrameSlots`] bounds the number of frames in flight, blocking the
//!   host on the oldest frame's fence when the device falls behind
//!
//! All GPU work goes through the `RenderBackend` trait from
//! `glint-backend`; the graph itself owns nothing but handles.

pub mod error;
pub mod pass;
pub mod recorder;
pub mod schedule;
pub mod sync;

pub use error::{GraphError, Result};
pub use pass::{PassId, PassState};
pub use recorder::{PassRecording, RecorderPool};
pub use schedule::{FrameGraph, PassWait, SyncPoint};
pub use sync::{FrameSlot, FrameSlots};
