//! Pass identity and lifecycle.

use glint_backend::types::AttachmentDesc;
use glint_core::handle::{Handle, Image, PrimaryBuffer};

/// Identifier of a pass within its graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PassId(pub(crate) usize);

impl PassId {
    /// Position of the pass in definition order.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Lifecycle of a pass across one frame.
///
/// `Defined` passes become `Scheduled` when the schedule is built, cycle
/// through `Recording` and `Submitted` each frame, and return to
/// `Scheduled` at the start of the next frame. Only a graph rebuild (for
/// example on resize) returns a pass to `Defined`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassState {
    /// Registered, not yet scheduled
    Defined,
    /// Part of the built schedule, ready to record
    Scheduled,
    /// Secondary buffers are being recorded for this frame
    Recording,
    /// Handed to the device queue this frame
    Submitted,
    /// Device work for the frame has been observed complete
    Retired,
}

pub(crate) struct Pass {
    pub(crate) name: String,
    pub(crate) attachments: Vec<(AttachmentDesc, Handle<Image>)>,
    pub(crate) depends_on: Vec<PassId>,
    pub(crate) state: PassState,
    pub(crate) primary: Handle<PrimaryBuffer>,
}
