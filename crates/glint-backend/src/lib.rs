//! Handle-based render backend interface for Glint.
//!
//! The frame graph never talks to a GPU API directly. Everything it needs
//! from the device - images, command buffers, queue submission, fences -
//! goes through the [`RenderBackend`] trait, keyed by the opaque handles
//! from `glint-core`. Shader binaries, textures and meshes are loaded by
//! unrelated external code and referenced only by handle.

pub mod backend;
pub mod error;
pub mod types;

pub use backend::RenderBackend;
pub use error::{BackendError, Result};
pub use types::{
    AttachmentDesc, AttachmentFormat, AttachmentUsage, BarrierUsage, DrawCommand, ImageBarrier,
    SubmitDesc, WaitStatus,
};
