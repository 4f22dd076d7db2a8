//! Deterministic in-memory render backend.
//!
//! The mock keeps every recorded command so tests can assert on the exact
//! spliced draw order, and keeps fence completion under test control:
//! fences signal only via [`MockBackend::signal_fence`] unless the backend
//! was built with `auto_signal`, which signals at submit time.

use std::time::{Duration, Instant};

use hashbrown::HashMap;
use parking_lot::{Condvar, Mutex};
use rand::Rng;

use glint_backend::error::{BackendError, Result};
use glint_backend::types::{
    AttachmentDesc, DrawCommand, ImageBarrier, SubmitDesc, WaitStatus,
};
use glint_backend::RenderBackend;
use glint_core::handle::{
    Fence, Handle, Image, MeshBuffer, Pipeline, PrimaryBuffer, SecondaryBuffer, Semaphore,
};

/// One command recorded into a primary buffer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MockCommand {
    /// A draw spliced in from a secondary buffer
    Draw(DrawCommand),
    /// A layout/usage transition
    Barrier(ImageBarrier),
}

#[derive(Default)]
struct SecondaryState {
    recording: bool,
    ended: bool,
    draws: Vec<DrawCommand>,
}

#[derive(Default)]
struct PrimaryState {
    recording: bool,
    ended: bool,
    commands: Vec<MockCommand>,
    executed: Vec<Handle<SecondaryBuffer>>,
}

#[derive(Default)]
struct MockState {
    images: Vec<AttachmentDesc>,
    pipeline_count: u32,
    mesh_count: u32,
    semaphores: Vec<bool>,
    fences: Vec<bool>,
    secondaries: HashMap<u32, SecondaryState>,
    primaries: HashMap<u32, PrimaryState>,
    submissions: Vec<SubmitDesc>,
}

/// Builder for [`MockBackend`].
#[derive(Default)]
pub struct MockBackendBuilder {
    auto_signal: bool,
    record_jitter: Option<Duration>,
}

impl MockBackendBuilder {
    /// Create a builder with manual fence control and no jitter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal fences and semaphores at submit time instead of waiting for
    /// [`MockBackend::signal_fence`]. Used by drivers that run full frame
    /// loops without a test poking fences from outside.
    #[must_use]
    pub const fn auto_signal(mut self, auto_signal: bool) -> Self {
        self.auto_signal = auto_signal;
        self
    }

    /// Sleep a random duration up to `jitter` inside every `record_draw`,
    /// perturbing worker timing to expose order dependence on thread
    /// scheduling.
    #[must_use]
    pub const fn record_jitter(mut self, jitter: Duration) -> Self {
        self.record_jitter = Some(jitter);
        self
    }

    /// Build the backend.
    #[must_use]
    pub fn build(self) -> MockBackend {
        MockBackend {
            state: Mutex::new(MockState::default()),
            fence_signal: Condvar::new(),
            auto_signal: self.auto_signal,
            record_jitter: self.record_jitter,
        }
    }
}

/// Deterministic in-memory [`RenderBackend`].
pub struct MockBackend {
    state: Mutex<MockState>,
    fence_signal: Condvar,
    auto_signal: bool,
    record_jitter: Option<Duration>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// A backend with manual fence control.
    #[must_use]
    pub fn new() -> Self {
        MockBackendBuilder::new().build()
    }

    /// Start building a configured backend.
    #[must_use]
    pub fn builder() -> MockBackendBuilder {
        MockBackendBuilder::new()
    }

    /// Mint a valid pipeline handle.
    pub fn register_pipeline(&self) -> Handle<Pipeline> {
        let mut state = self.state.lock();
        let id = state.pipeline_count;
        state.pipeline_count += 1;
        Handle::from_raw(id)
    }

    /// Mint a valid mesh handle.
    pub fn register_mesh(&self) -> Handle<MeshBuffer> {
        let mut state = self.state.lock();
        let id = state.mesh_count;
        state.mesh_count += 1;
        Handle::from_raw(id)
    }

    /// Signal a fence from the test, waking any blocked waiters.
    ///
    /// # Panics
    /// Panics on an unknown fence handle.
    pub fn signal_fence(&self, fence: Handle<Fence>) {
        let mut state = self.state.lock();
        state.fences[fence.index()] = true;
        self.fence_signal.notify_all();
    }

    /// Draws recorded into a secondary buffer.
    ///
    /// # Panics
    /// Panics on an unknown handle.
    #[must_use]
    pub fn secondary_draws(&self, buffer: Handle<SecondaryBuffer>) -> Vec<DrawCommand> {
        self.state.lock().secondaries[&buffer.raw()].draws.clone()
    }

    /// Full command stream of a primary buffer, in splice order.
    ///
    /// # Panics
    /// Panics on an unknown handle.
    #[must_use]
    pub fn primary_commands(&self, buffer: Handle<PrimaryBuffer>) -> Vec<MockCommand> {
        self.state.lock().primaries[&buffer.raw()].commands.clone()
    }

    /// Just the draws of a primary buffer, in splice order.
    #[must_use]
    pub fn primary_draws(&self, buffer: Handle<PrimaryBuffer>) -> Vec<DrawCommand> {
        self.primary_commands(buffer)
            .into_iter()
            .filter_map(|command| match command {
                MockCommand::Draw(draw) => Some(draw),
                MockCommand::Barrier(_) => None,
            })
            .collect()
    }

    /// Secondary buffers spliced into a primary, in splice order.
    ///
    /// # Panics
    /// Panics on an unknown handle.
    #[must_use]
    pub fn executed_secondaries(
        &self,
        buffer: Handle<PrimaryBuffer>,
    ) -> Vec<Handle<SecondaryBuffer>> {
        self.state.lock().primaries[&buffer.raw()].executed.clone()
    }

    /// Every submission seen so far, in order.
    #[must_use]
    pub fn submissions(&self) -> Vec<SubmitDesc> {
        self.state.lock().submissions.clone()
    }

    /// Whether a semaphore has been signaled by a submission.
    ///
    /// # Panics
    /// Panics on an unknown handle.
    #[must_use]
    pub fn semaphore_signaled(&self, semaphore: Handle<Semaphore>) -> bool {
        self.state.lock().semaphores[semaphore.index()]
    }
}

fn secondary_mut<'a>(
    state: &'a mut MockState,
    buffer: Handle<SecondaryBuffer>,
) -> Result<&'a mut SecondaryState> {
    state
        .secondaries
        .get_mut(&buffer.raw())
        .ok_or(BackendError::InvalidHandle {
            kind: "secondary buffer",
            id: buffer.raw(),
        })
}

fn primary_mut<'a>(
    state: &'a mut MockState,
    buffer: Handle<PrimaryBuffer>,
) -> Result<&'a mut PrimaryState> {
    state
        .primaries
        .get_mut(&buffer.raw())
        .ok_or(BackendError::InvalidHandle {
            kind: "primary buffer",
            id: buffer.raw(),
        })
}

fn check_fence(state: &MockState, fence: Handle<Fence>) -> Result<()> {
    if fence.index() >= state.fences.len() {
        return Err(BackendError::InvalidHandle {
            kind: "fence",
            id: fence.raw(),
        });
    }
    Ok(())
}

impl RenderBackend for MockBackend {
    fn create_image(&self, desc: AttachmentDesc) -> Result<Handle<Image>> {
        let mut state = self.state.lock();
        let id = state.images.len() as u32;
        state.images.push(desc);
        Ok(Handle::from_raw(id))
    }

    fn create_semaphore(&self) -> Result<Handle<Semaphore>> {
        let mut state = self.state.lock();
        let id = state.semaphores.len() as u32;
        state.semaphores.push(false);
        Ok(Handle::from_raw(id))
    }

    fn create_fence(&self) -> Result<Handle<Fence>> {
        let mut state = self.state.lock();
        let id = state.fences.len() as u32;
        state.fences.push(false);
        Ok(Handle::from_raw(id))
    }

    fn create_primary(&self) -> Result<Handle<PrimaryBuffer>> {
        let mut state = self.state.lock();
        let id = state.primaries.len() as u32;
        state.primaries.insert(id, PrimaryState::default());
        Ok(Handle::from_raw(id))
    }

    fn create_secondary(&self) -> Result<Handle<SecondaryBuffer>> {
        let mut state = self.state.lock();
        let id = state.secondaries.len() as u32;
        state.secondaries.insert(id, SecondaryState::default());
        Ok(Handle::from_raw(id))
    }

    fn begin_secondary(&self, buffer: Handle<SecondaryBuffer>) -> Result<()> {
        let mut state = self.state.lock();
        let secondary = secondary_mut(&mut state, buffer)?;
        secondary.recording = true;
        secondary.ended = false;
        secondary.draws.clear();
        Ok(())
    }

    fn record_draw(&self, buffer: Handle<SecondaryBuffer>, draw: DrawCommand) -> Result<()> {
        if let Some(jitter) = self.record_jitter {
            let nanos = rand::thread_rng().gen_range(0..=jitter.as_nanos() as u64);
            std::thread::sleep(Duration::from_nanos(nanos));
        }

        let mut state = self.state.lock();
        if draw.pipeline.raw() >= state.pipeline_count {
            return Err(BackendError::InvalidHandle {
                kind: "pipeline",
                id: draw.pipeline.raw(),
            });
        }
        if draw.mesh.raw() >= state.mesh_count {
            return Err(BackendError::InvalidHandle {
                kind: "mesh",
                id: draw.mesh.raw(),
            });
        }
        let secondary = secondary_mut(&mut state, buffer)?;
        if !secondary.recording {
            return Err(BackendError::InvalidState(format!(
                "secondary buffer {} is not recording",
                buffer.raw()
            )));
        }
        secondary.draws.push(draw);
        Ok(())
    }

    fn end_secondary(&self, buffer: Handle<SecondaryBuffer>) -> Result<()> {
        let mut state = self.state.lock();
        let secondary = secondary_mut(&mut state, buffer)?;
        if !secondary.recording {
            return Err(BackendError::InvalidState(format!(
                "secondary buffer {} is not recording",
                buffer.raw()
            )));
        }
        secondary.recording = false;
        secondary.ended = true;
        Ok(())
    }

    fn begin_primary(&self, buffer: Handle<PrimaryBuffer>) -> Result<()> {
        let mut state = self.state.lock();
        let primary = primary_mut(&mut state, buffer)?;
        primary.recording = true;
        primary.ended = false;
        primary.commands.clear();
        primary.executed.clear();
        Ok(())
    }

    fn record_barrier(&self, buffer: Handle<PrimaryBuffer>, barrier: ImageBarrier) -> Result<()> {
        let mut state = self.state.lock();
        if barrier.image.index() >= state.images.len() {
            return Err(BackendError::InvalidHandle {
                kind: "image",
                id: barrier.image.raw(),
            });
        }
        let primary = primary_mut(&mut state, buffer)?;
        if !primary.recording {
            return Err(BackendError::InvalidState(format!(
                "primary buffer {} is not recording",
                buffer.raw()
            )));
        }
        primary.commands.push(MockCommand::Barrier(barrier));
        Ok(())
    }

    fn execute_secondaries(
        &self,
        buffer: Handle<PrimaryBuffer>,
        secondaries: &[Handle<SecondaryBuffer>],
    ) -> Result<()> {
        let mut state = self.state.lock();

        let mut spliced = Vec::new();
        for &secondary in secondaries {
            let shard = state.secondaries.get(&secondary.raw()).ok_or(
                BackendError::InvalidHandle {
                    kind: "secondary buffer",
                    id: secondary.raw(),
                },
            )?;
            if !shard.ended {
                return Err(BackendError::InvalidState(format!(
                    "secondary buffer {} executed before end_secondary",
                    secondary.raw()
                )));
            }
            spliced.extend(shard.draws.iter().copied().map(MockCommand::Draw));
        }

        let primary = primary_mut(&mut state, buffer)?;
        if !primary.recording {
            return Err(BackendError::InvalidState(format!(
                "primary buffer {} is not recording",
                buffer.raw()
            )));
        }
        primary.commands.extend(spliced);
        primary.executed.extend_from_slice(secondaries);
        Ok(())
    }

    fn end_primary(&self, buffer: Handle<PrimaryBuffer>) -> Result<()> {
        let mut state = self.state.lock();
        let primary = primary_mut(&mut state, buffer)?;
        if !primary.recording {
            return Err(BackendError::InvalidState(format!(
                "primary buffer {} is not recording",
                buffer.raw()
            )));
        }
        primary.recording = false;
        primary.ended = true;
        Ok(())
    }

    fn submit(&self, desc: SubmitDesc) -> Result<()> {
        let mut state = self.state.lock();

        let primary = state.primaries.get(&desc.primary.raw()).ok_or(
            BackendError::InvalidHandle {
                kind: "primary buffer",
                id: desc.primary.raw(),
            },
        )?;
        if !primary.ended {
            return Err(BackendError::SubmitFailed(format!(
                "primary buffer {} submitted before end_primary",
                desc.primary.raw()
            )));
        }
        for semaphore in desc.wait_semaphores.iter().chain(&desc.signal_semaphores) {
            if semaphore.index() >= state.semaphores.len() {
                return Err(BackendError::InvalidHandle {
                    kind: "semaphore",
                    id: semaphore.raw(),
                });
            }
        }
        if let Some(fence) = desc.fence {
            check_fence(&state, fence)?;
        }

        if self.auto_signal {
            for semaphore in &desc.signal_semaphores {
                state.semaphores[semaphore.index()] = true;
            }
            if let Some(fence) = desc.fence {
                state.fences[fence.index()] = true;
                self.fence_signal.notify_all();
            }
        }

        state.submissions.push(desc);
        Ok(())
    }

    fn wait_fence(&self, fence: Handle<Fence>, timeout: Duration) -> Result<WaitStatus> {
        let mut state = self.state.lock();
        check_fence(&state, fence)?;

        if timeout == Duration::MAX {
            while !state.fences[fence.index()] {
                self.fence_signal.wait(&mut state);
            }
            return Ok(WaitStatus::Signaled);
        }

        let deadline = Instant::now() + timeout;
        while !state.fences[fence.index()] {
            if self
                .fence_signal
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return Ok(if state.fences[fence.index()] {
                    WaitStatus::Signaled
                } else {
                    WaitStatus::TimedOut
                });
            }
        }
        Ok(WaitStatus::Signaled)
    }

    fn fence_signaled(&self, fence: Handle<Fence>) -> Result<bool> {
        let state = self.state.lock();
        check_fence(&state, fence)?;
        Ok(state.fences[fence.index()])
    }

    fn reset_fence(&self, fence: Handle<Fence>) -> Result<()> {
        let mut state = self.state.lock();
        check_fence(&state, fence)?;
        state.fences[fence.index()] = false;
        Ok(())
    }
}
