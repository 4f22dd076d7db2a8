//! Core types and math for the Glint frame-graph recorder.
//!
//! This crate provides the foundational types used throughout Glint:
//! - Opaque typed handles for backend-owned GPU resources
//! - Per-object draw descriptors produced by the scene layer
//! - Frustum extraction and sphere visibility testing
//! - Common error types and engine constants

pub mod error;
pub mod handle;
pub mod math;
pub mod object;

pub use error::{ensure_capacity, Error, Result};
pub use handle::{
    Fence, Handle, Image, MeshBuffer, Pipeline, PrimaryBuffer, SecondaryBuffer, Semaphore,
};
pub use math::{Frustum, Plane};
pub use object::{ObjectDrawDescriptor, ObjectPushConstants};

/// Engine-wide constants
pub mod constants {
    /// Most attachments a single pass may declare
    pub const MAX_PASS_ATTACHMENTS: usize = 8;
    /// Most semaphores a single submission may wait on
    pub const MAX_WAIT_SEMAPHORES: usize = 8;
    /// Default number of frames the host may run ahead of the device
    pub const DEFAULT_FRAMES_IN_FLIGHT: usize = 2;
    /// Upper bound on frames in flight
    pub const MAX_FRAMES_IN_FLIGHT: usize = 3;
}
