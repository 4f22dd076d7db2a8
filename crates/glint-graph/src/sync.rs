//! Cross-pass and host synchronization.
//!
//! Cross-pass ordering is device-side: a producer pass signals its edge
//! semaphores at submission and consumers wait on them, so the host never
//! blocks between passes. The host blocks in exactly one place -
//! [`FrameSlots::acquire_slot`] - when every frame slot is still in
//! flight, which is the backpressure that keeps the CPU from running away
//! from a slow device.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};

use glint_backend::types::{SubmitDesc, WaitStatus};
use glint_backend::RenderBackend;
use glint_core::constants::{MAX_FRAMES_IN_FLIGHT, MAX_WAIT_SEMAPHORES};
use glint_core::ensure_capacity;
use glint_core::handle::{Fence, Handle};

use crate::error::Result;
use crate::pass::PassId;
use crate::schedule::FrameGraph;

/// An acquired frame slot, valid until the next acquisition cycle reuses
/// its fence.
#[derive(Clone, Copy, Debug)]
pub struct FrameSlot {
    /// Position in the ring
    pub index: usize,
    /// The slot's fence, signaled when the frame's device work completes
    pub fence: Handle<Fence>,
}

struct Slot {
    fence: Handle<Fence>,
    in_flight: bool,
}

/// Bounded ring of frames in flight.
pub struct FrameSlots<B: RenderBackend> {
    backend: Arc<B>,
    slots: Vec<Slot>,
    cursor: usize,
}

impl<B: RenderBackend> FrameSlots<B> {
    /// Create a ring of `frames_in_flight` slots (clamped to at least one,
    /// bounded by `MAX_FRAMES_IN_FLIGHT`).
    pub fn new(backend: Arc<B>, frames_in_flight: usize) -> Result<Self> {
        ensure_capacity("frames in flight", MAX_FRAMES_IN_FLIGHT, frames_in_flight)?;
        let frames_in_flight = frames_in_flight.max(1);

        let mut slots = Vec::with_capacity(frames_in_flight);
        for _ in 0..frames_in_flight {
            slots.push(Slot {
                fence: backend.create_fence()?,
                in_flight: false,
            });
        }
        debug!(frames_in_flight, "frame slots ready");

        Ok(Self {
            backend,
            slots,
            cursor: 0,
        })
    }

    /// Number of slots in the ring.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots currently in flight.
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.in_flight).count()
    }

    /// Claim the next frame slot.
    ///
    /// If the slot at the ring cursor is still in flight, this blocks on
    /// its fence until the device retires that frame. There is no
    /// cancellation of device work; a slow device simply delays the host
    /// here.
    pub fn acquire_slot(&mut self) -> Result<FrameSlot> {
        let cursor = self.cursor;
        let fence = self.slots[cursor].fence;
        if self.slots[cursor].in_flight {
            trace!(slot = cursor, "all frame slots in flight, waiting");
            loop {
                match self.backend.wait_fence(fence, Duration::MAX)? {
                    WaitStatus::Signaled => break,
                    WaitStatus::TimedOut => {}
                }
            }
            self.slots[cursor].in_flight = false;
        }
        self.cursor = (cursor + 1) % self.slots.len();
        Ok(FrameSlot {
            index: cursor,
            fence,
        })
    }

    /// Submit a recorded pass with its edge semaphores and no fence.
    ///
    /// Used for every pass but the frame's last: the consumer's device-side
    /// wait is ordering enough, the host keeps going.
    pub fn submit_pass(&self, graph: &mut FrameGraph<B>, pass: PassId) -> Result<()> {
        self.submit_inner(graph, pass, None)
    }

    /// Submit a recorded pass and attach the frame slot's fence.
    ///
    /// Used for the frame's final pass, or any pass whose results the host
    /// must observe (readbacks, double-buffered resource reuse).
    pub fn submit_and_fence(
        &mut self,
        graph: &mut FrameGraph<B>,
        slot: &FrameSlot,
        pass: PassId,
    ) -> Result<Handle<Fence>> {
        self.backend.reset_fence(slot.fence)?;
        self.submit_inner(graph, pass, Some(slot.fence))?;
        self.slots[slot.index].in_flight = true;
        Ok(slot.fence)
    }

    /// Block until a fence signals or the timeout elapses.
    ///
    /// `TimedOut` is a recoverable status: log it and retry, the frame's
    /// device work is merely late.
    pub fn wait_fence(&self, fence: Handle<Fence>, timeout: Duration) -> Result<WaitStatus> {
        let status = self.backend.wait_fence(fence, timeout)?;
        if status == WaitStatus::TimedOut {
            warn!(fence = fence.raw(), ?timeout, "fence wait timed out");
        }
        Ok(status)
    }

    fn submit_inner(
        &self,
        graph: &mut FrameGraph<B>,
        pass: PassId,
        fence: Option<Handle<Fence>>,
    ) -> Result<()> {
        let waits: Vec<_> = graph
            .wait_points(pass)?
            .into_iter()
            .map(|wait| wait.semaphore)
            .collect();
        ensure_capacity("wait semaphores", MAX_WAIT_SEMAPHORES, waits.len())?;
        let signals = graph.signal_semaphores(pass)?;
        let primary = graph.pass_primary(pass)?;

        let desc = SubmitDesc {
            primary,
            wait_semaphores: waits,
            signal_semaphores: signals,
            fence,
        };
        self.backend.submit(desc)?;
        graph.mark_submitted(pass)?;
        trace!(pass = graph.pass_name(pass).unwrap_or("?"), "submitted pass");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;

    use glint_backend::types::{AttachmentDesc, AttachmentFormat};
    use glint_core::math::{Frustum, Plane};
    use glint_core::object::ObjectDrawDescriptor;
    use glint_test::{create_object_row, MockBackend};

    use crate::error::GraphError;
    use crate::pass::PassState;
    use crate::recorder::RecorderPool;

    fn open_frustum() -> Frustum {
        let open = Plane {
            normal: glam::Vec3::Z,
            d: 1.0e9,
        };
        Frustum { planes: [open; 6] }
    }

    struct Fixture {
        backend: Arc<MockBackend>,
        graph: FrameGraph<MockBackend>,
        pool: RecorderPool<MockBackend>,
        objects: Arc<[ObjectDrawDescriptor]>,
    }

    fn single_pass_fixture() -> (Fixture, PassId) {
        let backend = Arc::new(MockBackend::new());
        let mut graph = FrameGraph::new(Arc::clone(&backend));
        let pass = graph
            .define_pass(
                "main",
                &[AttachmentDesc::color(AttachmentFormat::Rgba8Unorm)],
                &[],
            )
            .unwrap();
        graph.build_schedule().unwrap();

        let pipeline = backend.register_pipeline();
        let mesh = backend.register_mesh();
        let objects: Arc<[_]> = create_object_row(4, pipeline, mesh).into();
        let pool = RecorderPool::new(Arc::clone(&backend), 2);

        (
            Fixture {
                backend,
                graph,
                pool,
                objects,
            },
            pass,
        )
    }

    #[test]
    fn slot_count_is_bounded() {
        let backend = Arc::new(MockBackend::new());
        assert!(matches!(
            FrameSlots::new(Arc::clone(&backend), MAX_FRAMES_IN_FLIGHT + 1),
            Err(GraphError::Capacity(_))
        ));
        let slots = FrameSlots::new(backend, 0).unwrap();
        assert_eq!(slots.capacity(), 1);
    }

    #[test]
    fn third_acquire_blocks_until_a_fence_signals() {
        let (mut fixture, pass) = single_pass_fixture();
        let mut slots = FrameSlots::new(Arc::clone(&fixture.backend), 2).unwrap();

        // Two frames in flight.
        let slot0 = slots.acquire_slot().unwrap();
        fixture
            .pool
            .record_pass(&mut fixture.graph, pass, &fixture.objects, &open_frustum(), 0.0)
            .unwrap();
        slots
            .submit_and_fence(&mut fixture.graph, &slot0, pass)
            .unwrap();

        fixture.graph.begin_frame().unwrap();
        let slot1 = slots.acquire_slot().unwrap();
        fixture
            .pool
            .record_pass(&mut fixture.graph, pass, &fixture.objects, &open_frustum(), 1.0)
            .unwrap();
        slots
            .submit_and_fence(&mut fixture.graph, &slot1, pass)
            .unwrap();

        assert_eq!(slots.in_flight_count(), 2);
        let oldest_fence = slot0.fence;

        let (acquired_tx, acquired_rx) = mpsc::channel();
        let waiter = thread::spawn(move || {
            let slot = slots.acquire_slot().unwrap();
            acquired_tx.send(slot.index).unwrap();
        });

        // Still blocked while both frames are unfenced.
        assert!(acquired_rx
            .recv_timeout(Duration::from_millis(100))
            .is_err());

        fixture.backend.signal_fence(oldest_fence);
        assert_eq!(
            acquired_rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            0
        );
        waiter.join().unwrap();
    }

    #[test]
    fn producer_signal_matches_consumer_wait() {
        let backend = Arc::new(MockBackend::new());
        let mut graph = FrameGraph::new(Arc::clone(&backend));
        let offscreen = graph
            .define_pass(
                "offscreen",
                &[AttachmentDesc::color(AttachmentFormat::Rgba16Float)],
                &[],
            )
            .unwrap();
        let final_pass = graph
            .define_pass(
                "final",
                &[AttachmentDesc::color(AttachmentFormat::Rgba8Unorm)],
                &["offscreen"],
            )
            .unwrap();
        graph.build_schedule().unwrap();

        let pipeline = backend.register_pipeline();
        let mesh = backend.register_mesh();
        let objects: Arc<[_]> = create_object_row(6, pipeline, mesh).into();
        let pool = RecorderPool::new(Arc::clone(&backend), 2);
        let mut slots = FrameSlots::new(Arc::clone(&backend), 2).unwrap();

        let slot = slots.acquire_slot().unwrap();
        pool.record_pass(&mut graph, offscreen, &objects, &open_frustum(), 0.0)
            .unwrap();
        pool.record_pass(&mut graph, final_pass, &objects, &open_frustum(), 0.0)
            .unwrap();
        slots.submit_pass(&mut graph, offscreen).unwrap();
        let fence = slots
            .submit_and_fence(&mut graph, &slot, final_pass)
            .unwrap();

        let submissions = backend.submissions();
        assert_eq!(submissions.len(), 2);

        // Independent of anything: the offscreen pass waits on nothing.
        assert!(submissions[0].wait_semaphores.is_empty());
        assert_eq!(submissions[0].signal_semaphores.len(), 1);
        assert_eq!(submissions[0].fence, None);

        // The final pass waits on exactly the semaphore offscreen signals.
        assert_eq!(
            submissions[1].wait_semaphores,
            submissions[0].signal_semaphores
        );
        assert!(submissions[1].signal_semaphores.is_empty());
        assert_eq!(submissions[1].fence, Some(fence));
    }

    #[test]
    fn pass_lifecycle_cycles_through_retired() {
        let (mut fixture, pass) = single_pass_fixture();
        let mut slots = FrameSlots::new(Arc::clone(&fixture.backend), 2).unwrap();

        let slot = slots.acquire_slot().unwrap();
        fixture
            .pool
            .record_pass(&mut fixture.graph, pass, &fixture.objects, &open_frustum(), 0.0)
            .unwrap();
        let fence = slots
            .submit_and_fence(&mut fixture.graph, &slot, pass)
            .unwrap();
        assert_eq!(
            fixture.graph.pass_state(pass).unwrap(),
            PassState::Submitted
        );

        fixture.backend.signal_fence(fence);
        assert_eq!(
            slots.wait_fence(fence, Duration::from_secs(1)).unwrap(),
            WaitStatus::Signaled
        );

        fixture.graph.retire_frame();
        assert_eq!(fixture.graph.pass_state(pass).unwrap(), PassState::Retired);

        fixture.graph.begin_frame().unwrap();
        assert_eq!(
            fixture.graph.pass_state(pass).unwrap(),
            PassState::Scheduled
        );
    }

    #[test]
    fn fence_wait_times_out_and_recovers() {
        let (fixture, _) = single_pass_fixture();
        let slots = FrameSlots::new(Arc::clone(&fixture.backend), 2).unwrap();
        let fence = fixture.backend.create_fence().unwrap();

        assert_eq!(
            slots.wait_fence(fence, Duration::from_millis(10)).unwrap(),
            WaitStatus::TimedOut
        );
        fixture.backend.signal_fence(fence);
        assert_eq!(
            slots.wait_fence(fence, Duration::from_millis(10)).unwrap(),
            WaitStatus::Signaled
        );
    }
}
