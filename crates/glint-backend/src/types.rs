//! Data model shared between the frame graph and backends.

use glint_core::handle::{
    Fence, Handle, Image, MeshBuffer, Pipeline, PrimaryBuffer, Semaphore,
};
use glint_core::object::ObjectPushConstants;

/// Pixel format of a render-target image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttachmentFormat {
    /// 8-bit RGBA, unsigned normalized
    Rgba8Unorm,
    /// 16-bit float RGBA
    Rgba16Float,
    /// 32-bit float depth
    Depth32Float,
    /// 24-bit depth with 8-bit stencil
    Depth24Stencil8,
}

impl AttachmentFormat {
    /// Whether this is a depth (or depth-stencil) format.
    #[must_use]
    pub const fn is_depth(self) -> bool {
        matches!(self, Self::Depth32Float | Self::Depth24Stencil8)
    }
}

/// How a pass uses an attachment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttachmentUsage {
    /// Written as a color target
    Color,
    /// Written as the depth/stencil target
    DepthStencil,
}

/// One attachment slot of a pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttachmentDesc {
    /// Image format
    pub format: AttachmentFormat,
    /// Declared usage
    pub usage: AttachmentUsage,
}

impl AttachmentDesc {
    /// A color attachment.
    #[must_use]
    pub const fn color(format: AttachmentFormat) -> Self {
        Self {
            format,
            usage: AttachmentUsage::Color,
        }
    }

    /// A depth-stencil attachment.
    #[must_use]
    pub const fn depth(format: AttachmentFormat) -> Self {
        Self {
            format,
            usage: AttachmentUsage::DepthStencil,
        }
    }

    /// Whether the format matches the declared usage.
    ///
    /// Color formats must not be bound as depth targets and vice versa;
    /// the scheduler rejects incompatible declarations at definition time.
    #[must_use]
    pub const fn is_compatible(self) -> bool {
        match self.usage {
            AttachmentUsage::Color => !self.format.is_depth(),
            AttachmentUsage::DepthStencil => self.format.is_depth(),
        }
    }
}

/// One draw call: bind state plus the per-object push constants.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawCommand {
    /// Pipeline to bind
    pub pipeline: Handle<Pipeline>,
    /// Mesh to draw
    pub mesh: Handle<MeshBuffer>,
    /// Per-object payload
    pub push_constants: ObjectPushConstants,
}

/// Pipeline usage an image transitions between across passes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BarrierUsage {
    /// Written as a color attachment
    ColorWrite,
    /// Written as a depth attachment
    DepthWrite,
    /// Sampled in a shader
    ShaderRead,
}

/// Layout/usage transition recorded before a consumer pass reads an image
/// written by a producer pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageBarrier {
    /// The image transitioning
    pub image: Handle<Image>,
    /// Usage in the producer pass
    pub from: BarrierUsage,
    /// Usage in the consumer pass
    pub to: BarrierUsage,
}

/// A queue submission: one primary buffer plus its synchronization lists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmitDesc {
    /// Primary command buffer to execute
    pub primary: Handle<PrimaryBuffer>,
    /// Semaphores the device waits on before executing
    pub wait_semaphores: Vec<Handle<Semaphore>>,
    /// Semaphores signaled when execution completes
    pub signal_semaphores: Vec<Handle<Semaphore>>,
    /// Optional fence signaled when execution completes, for host-side joins
    pub fence: Option<Handle<Fence>>,
}

impl SubmitDesc {
    /// A submission with empty synchronization lists.
    #[must_use]
    pub const fn new(primary: Handle<PrimaryBuffer>) -> Self {
        Self {
            primary,
            wait_semaphores: Vec::new(),
            signal_semaphores: Vec::new(),
            fence: None,
        }
    }

    /// Add a wait semaphore.
    #[must_use]
    pub fn with_wait(mut self, semaphore: Handle<Semaphore>) -> Self {
        self.wait_semaphores.push(semaphore);
        self
    }

    /// Add a signal semaphore.
    #[must_use]
    pub fn with_signal(mut self, semaphore: Handle<Semaphore>) -> Self {
        self.signal_semaphores.push(semaphore);
        self
    }

    /// Attach a fence.
    #[must_use]
    pub const fn with_fence(mut self, fence: Handle<Fence>) -> Self {
        self.fence = Some(fence);
        self
    }
}

/// Outcome of a fence wait.
///
/// A timeout is a recoverable condition for the caller to log and retry,
/// not an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitStatus {
    /// The fence signaled within the timeout
    Signaled,
    /// The timeout elapsed first
    TimedOut,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_formats_are_depth() {
        assert!(AttachmentFormat::Depth32Float.is_depth());
        assert!(AttachmentFormat::Depth24Stencil8.is_depth());
        assert!(!AttachmentFormat::Rgba8Unorm.is_depth());
    }

    #[test]
    fn compatibility_matches_usage() {
        assert!(AttachmentDesc::color(AttachmentFormat::Rgba8Unorm).is_compatible());
        assert!(AttachmentDesc::depth(AttachmentFormat::Depth32Float).is_compatible());
        assert!(!AttachmentDesc::color(AttachmentFormat::Depth32Float).is_compatible());
        assert!(!AttachmentDesc::depth(AttachmentFormat::Rgba16Float).is_compatible());
    }
}
