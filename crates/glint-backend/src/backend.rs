//! The render backend trait.

use std::time::Duration;

use glint_core::handle::{
    Fence, Handle, Image, PrimaryBuffer, SecondaryBuffer, Semaphore,
};

use crate::error::Result;
use crate::types::{AttachmentDesc, DrawCommand, ImageBarrier, SubmitDesc, WaitStatus};

/// Handle-based interface to the GPU.
///
/// All methods take `&self`: a backend synchronizes its own internal
/// tables. The frame graph guarantees that a given command buffer handle is
/// only ever used from one thread at a time, but *distinct* secondary
/// buffers are recorded from distinct worker threads concurrently, so
/// implementations must tolerate parallel calls on disjoint handles.
pub trait RenderBackend: Send + Sync + 'static {
    /// Create a render-target image for an attachment slot.
    fn create_image(&self, desc: AttachmentDesc) -> Result<Handle<Image>>;

    /// Create a device-side synchronization primitive.
    fn create_semaphore(&self) -> Result<Handle<Semaphore>>;

    /// Create a host-visible synchronization primitive, unsignaled.
    fn create_fence(&self) -> Result<Handle<Fence>>;

    /// Create a primary command buffer.
    fn create_primary(&self) -> Result<Handle<PrimaryBuffer>>;

    /// Create a secondary command buffer.
    fn create_secondary(&self) -> Result<Handle<SecondaryBuffer>>;

    /// Begin recording a secondary buffer, discarding prior contents.
    fn begin_secondary(&self, buffer: Handle<SecondaryBuffer>) -> Result<()>;

    /// Record one draw into a secondary buffer.
    ///
    /// Fails with [`BackendError::InvalidHandle`](crate::BackendError) if
    /// the draw references a pipeline or mesh the backend does not know.
    fn record_draw(&self, buffer: Handle<SecondaryBuffer>, draw: DrawCommand) -> Result<()>;

    /// Finish recording a secondary buffer.
    fn end_secondary(&self, buffer: Handle<SecondaryBuffer>) -> Result<()>;

    /// Begin recording a primary buffer, discarding prior contents.
    fn begin_primary(&self, buffer: Handle<PrimaryBuffer>) -> Result<()>;

    /// Record a layout/usage transition into a primary buffer.
    fn record_barrier(&self, buffer: Handle<PrimaryBuffer>, barrier: ImageBarrier) -> Result<()>;

    /// Splice fully recorded secondary buffers into a primary buffer.
    ///
    /// Execution order follows slice order exactly.
    fn execute_secondaries(
        &self,
        buffer: Handle<PrimaryBuffer>,
        secondaries: &[Handle<SecondaryBuffer>],
    ) -> Result<()>;

    /// Finish recording a primary buffer.
    fn end_primary(&self, buffer: Handle<PrimaryBuffer>) -> Result<()>;

    /// Submit a primary buffer to the device queue.
    fn submit(&self, desc: SubmitDesc) -> Result<()>;

    /// Block the calling thread until the fence signals or the timeout
    /// elapses. `Duration::MAX` waits indefinitely.
    fn wait_fence(&self, fence: Handle<Fence>, timeout: Duration) -> Result<WaitStatus>;

    /// Poll a fence without blocking.
    fn fence_signaled(&self, fence: Handle<Fence>) -> Result<bool>;

    /// Return a fence to the unsignaled state.
    fn reset_fence(&self, fence: Handle<Fence>) -> Result<()>;
}
