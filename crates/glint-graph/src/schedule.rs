//! Pass registration and topological scheduling.

use std::sync::Arc;

use hashbrown::HashMap;
use tracing::debug;

use glint_backend::types::{
    AttachmentDesc, AttachmentUsage, BarrierUsage, ImageBarrier,
};
use glint_backend::RenderBackend;
use glint_core::constants::MAX_PASS_ATTACHMENTS;
use glint_core::ensure_capacity;
use glint_core::handle::{Handle, Image, PrimaryBuffer, Semaphore};

use crate::error::{GraphError, Result};
use crate::pass::{Pass, PassId, PassState};

/// The synchronization a consumer pass must perform before reading a
/// producer's output.
#[derive(Clone, Debug)]
pub struct PassWait {
    /// Semaphore the consumer's submission waits on
    pub semaphore: Handle<Semaphore>,
    /// Layout transitions for the producer's attachments
    pub barriers: Vec<ImageBarrier>,
}

/// Result of [`FrameGraph::emit_synchronization`] for a pass pair.
///
/// `wait` is `None` when the consumer declares no dependency on the
/// producer; unrelated passes must not be serialized against each other.
#[derive(Clone, Debug)]
pub struct SyncPoint {
    /// The wait the consumer performs, if any
    pub wait: Option<PassWait>,
}

/// An ordered collection of render passes and their dependencies.
///
/// Passes are registered with [`define_pass`](Self::define_pass), ordered
/// with [`build_schedule`](Self::build_schedule), and reused every frame;
/// attachments are allocated once at definition time and survive until
/// [`rebuild`](Self::rebuild).
pub struct FrameGraph<B: RenderBackend> {
    backend: Arc<B>,
    passes: Vec<Pass>,
    names: HashMap<String, PassId>,
    schedule: Vec<PassId>,
    edge_semaphores: HashMap<(PassId, PassId), Handle<Semaphore>>,
}

impl<B: RenderBackend> FrameGraph<B> {
    /// Create an empty graph on the given backend.
    #[must_use]
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            passes: Vec::new(),
            names: HashMap::new(),
            schedule: Vec::new(),
            edge_semaphores: HashMap::new(),
        }
    }

    /// The backend this graph allocates through.
    #[must_use]
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Register a pass.
    ///
    /// `depends_on` names passes whose output this pass reads; they must
    /// already be defined. Attachment images and the pass's primary command
    /// buffer are created here, not per frame.
    pub fn define_pass(
        &mut self,
        name: &str,
        attachments: &[AttachmentDesc],
        depends_on: &[&str],
    ) -> Result<PassId> {
        if !self.schedule.is_empty() {
            return Err(GraphError::Config {
                pass: name.to_string(),
                reason: "graph is already scheduled; rebuild before adding passes".to_string(),
            });
        }
        if self.names.contains_key(name) {
            return Err(GraphError::Config {
                pass: name.to_string(),
                reason: "a pass with this name already exists".to_string(),
            });
        }
        ensure_capacity("pass attachments", MAX_PASS_ATTACHMENTS, attachments.len())?;
        for desc in attachments {
            if !desc.is_compatible() {
                return Err(GraphError::Config {
                    pass: name.to_string(),
                    reason: format!(
                        "attachment format {:?} is incompatible with usage {:?}",
                        desc.format, desc.usage
                    ),
                });
            }
        }

        let mut depends = Vec::with_capacity(depends_on.len());
        for dep in depends_on {
            let id = self.names.get(*dep).ok_or_else(|| GraphError::Config {
                pass: name.to_string(),
                reason: format!("depends on undefined pass {dep:?}"),
            })?;
            depends.push(*id);
        }

        let mut images = Vec::with_capacity(attachments.len());
        for desc in attachments {
            images.push((*desc, self.backend.create_image(*desc)?));
        }
        let primary = self.backend.create_primary()?;

        let id = PassId(self.passes.len());
        self.passes.push(Pass {
            name: name.to_string(),
            attachments: images,
            depends_on: depends,
            state: PassState::Defined,
            primary,
        });
        self.names.insert(name.to_string(), id);
        debug!(pass = name, id = id.0, "defined pass");
        Ok(id)
    }

    /// Add a dependency edge between two already-defined passes.
    ///
    /// Lets a producer be wired to a consumer defined later; most graphs
    /// only need the `depends_on` list of [`define_pass`](Self::define_pass).
    pub fn add_dependency(&mut self, pass: &str, on: &str) -> Result<()> {
        if !self.schedule.is_empty() {
            return Err(GraphError::Config {
                pass: pass.to_string(),
                reason: "graph is already scheduled; rebuild before adding dependencies"
                    .to_string(),
            });
        }
        let on_id = *self.names.get(on).ok_or_else(|| GraphError::Config {
            pass: pass.to_string(),
            reason: format!("depends on undefined pass {on:?}"),
        })?;
        let pass_id = *self.names.get(pass).ok_or_else(|| GraphError::Config {
            pass: pass.to_string(),
            reason: "unknown pass".to_string(),
        })?;
        let entry = &mut self.passes[pass_id.0];
        if !entry.depends_on.contains(&on_id) {
            entry.depends_on.push(on_id);
        }
        Ok(())
    }

    /// Topologically sort the passes and create the per-edge semaphores.
    ///
    /// The order is stable: among passes whose dependencies are all
    /// satisfied, definition order wins. Returns [`GraphError::Cycle`]
    /// naming the unschedulable passes if the dependencies loop.
    pub fn build_schedule(&mut self) -> Result<&[PassId]> {
        if !self.schedule.is_empty() {
            return Ok(&self.schedule);
        }

        let mut order = Vec::with_capacity(self.passes.len());
        let mut placed = vec![false; self.passes.len()];
        while order.len() < self.passes.len() {
            let mut progressed = false;
            for (index, pass) in self.passes.iter().enumerate() {
                if placed[index] {
                    continue;
                }
                if pass.depends_on.iter().all(|dep| placed[dep.0]) {
                    placed[index] = true;
                    order.push(PassId(index));
                    progressed = true;
                }
            }
            if !progressed {
                let passes = self
                    .passes
                    .iter()
                    .enumerate()
                    .filter(|(index, _)| !placed[*index])
                    .map(|(_, pass)| pass.name.clone())
                    .collect();
                return Err(GraphError::Cycle { passes });
            }
        }

        // One semaphore per producer/consumer edge, reused every frame.
        for (index, pass) in self.passes.iter().enumerate() {
            for &dep in &pass.depends_on {
                let edge = (dep, PassId(index));
                if !self.edge_semaphores.contains_key(&edge) {
                    self.edge_semaphores
                        .insert(edge, self.backend.create_semaphore()?);
                }
            }
        }

        for pass in &mut self.passes {
            pass.state = PassState::Scheduled;
        }
        self.schedule = order;
        debug!(passes = self.schedule.len(), "built schedule");
        Ok(&self.schedule)
    }

    /// The built schedule, empty before [`build_schedule`](Self::build_schedule).
    #[must_use]
    pub fn schedule(&self) -> &[PassId] {
        &self.schedule
    }

    /// The synchronization `consumer` must perform against `producer`.
    ///
    /// Returns a wait exactly when `consumer` declares a dependency on
    /// `producer`: the edge semaphore plus one barrier per producer
    /// attachment. Repeated calls for the same edge return the same
    /// semaphore.
    pub fn emit_synchronization(
        &self,
        producer: PassId,
        consumer: PassId,
    ) -> Result<SyncPoint> {
        let producer_pass = self.pass(producer)?;
        let consumer_pass = self.pass(consumer)?;

        if !consumer_pass.depends_on.contains(&producer) {
            return Ok(SyncPoint { wait: None });
        }

        let semaphore = *self
            .edge_semaphores
            .get(&(producer, consumer))
            .ok_or_else(|| GraphError::Config {
                pass: consumer_pass.name.clone(),
                reason: "synchronization requested before build_schedule".to_string(),
            })?;

        let barriers = producer_pass
            .attachments
            .iter()
            .map(|(desc, image)| ImageBarrier {
                image: *image,
                from: match desc.usage {
                    AttachmentUsage::Color => BarrierUsage::ColorWrite,
                    AttachmentUsage::DepthStencil => BarrierUsage::DepthWrite,
                },
                to: BarrierUsage::ShaderRead,
            })
            .collect();

        Ok(SyncPoint {
            wait: Some(PassWait { semaphore, barriers }),
        })
    }

    /// All waits a pass performs, one per declared dependency.
    pub fn wait_points(&self, pass: PassId) -> Result<Vec<PassWait>> {
        let deps = self.pass(pass)?.depends_on.clone();
        let mut waits = Vec::with_capacity(deps.len());
        for dep in deps {
            if let Some(wait) = self.emit_synchronization(dep, pass)?.wait {
                waits.push(wait);
            }
        }
        Ok(waits)
    }

    /// Semaphores a pass signals, one per consumer depending on it.
    pub fn signal_semaphores(&self, pass: PassId) -> Result<Vec<Handle<Semaphore>>> {
        self.pass(pass)?;
        let mut signals: Vec<_> = self
            .edge_semaphores
            .iter()
            .filter(|((producer, _), _)| *producer == pass)
            .map(|((_, consumer), semaphore)| (*consumer, *semaphore))
            .collect();
        // HashMap iteration order is arbitrary; submissions should not be.
        signals.sort_by_key(|(consumer, _)| *consumer);
        Ok(signals.into_iter().map(|(_, semaphore)| semaphore).collect())
    }

    /// Current lifecycle state of a pass.
    pub fn pass_state(&self, pass: PassId) -> Result<PassState> {
        Ok(self.pass(pass)?.state)
    }

    /// Name of a pass.
    pub fn pass_name(&self, pass: PassId) -> Result<&str> {
        Ok(self.pass(pass)?.name.as_str())
    }

    /// The pass's primary command buffer.
    pub fn pass_primary(&self, pass: PassId) -> Result<Handle<PrimaryBuffer>> {
        Ok(self.pass(pass)?.primary)
    }

    /// The pass's attachments and their images.
    pub fn pass_attachments(
        &self,
        pass: PassId,
    ) -> Result<&[(AttachmentDesc, Handle<Image>)]> {
        Ok(self.pass(pass)?.attachments.as_slice())
    }

    /// Reset last frame's passes so the schedule can be reused.
    ///
    /// `Submitted` and `Retired` passes return to `Scheduled`. A pass still
    /// `Recording` indicates a driver bug and fails with
    /// [`GraphError::State`].
    pub fn begin_frame(&mut self) -> Result<()> {
        for pass in &self.passes {
            if pass.state == PassState::Recording {
                return Err(GraphError::State {
                    pass: pass.name.clone(),
                    expected: PassState::Submitted,
                    actual: PassState::Recording,
                });
            }
        }
        for pass in &mut self.passes {
            if matches!(pass.state, PassState::Submitted | PassState::Retired) {
                pass.state = PassState::Scheduled;
            }
        }
        Ok(())
    }

    /// Mark every `Submitted` pass `Retired`.
    ///
    /// Call once the frame's fence has been observed signaled.
    pub fn retire_frame(&mut self) {
        for pass in &mut self.passes {
            if pass.state == PassState::Submitted {
                pass.state = PassState::Retired;
            }
        }
    }

    /// Drop the schedule and edge semaphores, returning all passes to
    /// `Defined`. Used when the graph must be rebuilt, e.g. after a
    /// resize reallocates attachments.
    pub fn rebuild(&mut self) {
        self.schedule.clear();
        self.edge_semaphores.clear();
        for pass in &mut self.passes {
            pass.state = PassState::Defined;
        }
        debug!("graph reset for rebuild");
    }

    pub(crate) fn begin_recording(&mut self, pass: PassId) -> Result<String> {
        let entry = self.pass_entry(pass)?;
        if entry.state != PassState::Scheduled {
            return Err(GraphError::State {
                pass: entry.name.clone(),
                expected: PassState::Scheduled,
                actual: entry.state,
            });
        }
        entry.state = PassState::Recording;
        Ok(entry.name.clone())
    }

    pub(crate) fn abort_recording(&mut self, pass: PassId) {
        if let Ok(entry) = self.pass_entry(pass) {
            if entry.state == PassState::Recording {
                entry.state = PassState::Scheduled;
            }
        }
    }

    pub(crate) fn mark_submitted(&mut self, pass: PassId) -> Result<()> {
        let entry = self.pass_entry(pass)?;
        if entry.state != PassState::Recording {
            return Err(GraphError::State {
                pass: entry.name.clone(),
                expected: PassState::Recording,
                actual: entry.state,
            });
        }
        entry.state = PassState::Submitted;
        Ok(())
    }

    fn pass(&self, pass: PassId) -> Result<&Pass> {
        self.passes.get(pass.0).ok_or_else(|| GraphError::Config {
            pass: format!("#{}", pass.0),
            reason: "unknown pass id".to_string(),
        })
    }

    fn pass_entry(&mut self, pass: PassId) -> Result<&mut Pass> {
        self.passes
            .get_mut(pass.0)
            .ok_or_else(|| GraphError::Config {
                pass: format!("#{}", pass.0),
                reason: "unknown pass id".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glint_backend::types::AttachmentFormat;
    use glint_test::MockBackend;

    fn color() -> AttachmentDesc {
        AttachmentDesc::color(AttachmentFormat::Rgba8Unorm)
    }

    fn depth() -> AttachmentDesc {
        AttachmentDesc::depth(AttachmentFormat::Depth32Float)
    }

    fn graph() -> FrameGraph<MockBackend> {
        FrameGraph::new(Arc::new(MockBackend::new()))
    }

    #[test]
    fn linear_chain_schedules_in_order() {
        let mut graph = graph();
        let a = graph.define_pass("a", &[color(), depth()], &[]).unwrap();
        let b = graph.define_pass("b", &[color()], &["a"]).unwrap();
        let c = graph.define_pass("c", &[color()], &["b"]).unwrap();

        assert_eq!(graph.build_schedule().unwrap(), &[a, b, c]);
        assert_eq!(graph.pass_state(a).unwrap(), PassState::Scheduled);
    }

    #[test]
    fn independent_passes_keep_definition_order() {
        let mut graph = graph();
        let first = graph.define_pass("first", &[color()], &[]).unwrap();
        let second = graph.define_pass("second", &[color()], &[]).unwrap();
        assert_eq!(graph.build_schedule().unwrap(), &[first, second]);
    }

    #[test]
    fn cycle_is_rejected() {
        let mut graph = graph();
        graph.define_pass("a", &[color()], &[]).unwrap();
        graph.define_pass("b", &[color()], &["a"]).unwrap();
        graph.add_dependency("a", "b").unwrap();

        match graph.build_schedule() {
            Err(GraphError::Cycle { passes }) => {
                assert_eq!(passes, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("expected cycle error, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let mut graph = graph();
        graph.define_pass("main", &[color()], &[]).unwrap();
        assert!(matches!(
            graph.define_pass("main", &[color()], &[]),
            Err(GraphError::Config { .. })
        ));
    }

    #[test]
    fn undefined_dependency_is_rejected() {
        let mut graph = graph();
        assert!(matches!(
            graph.define_pass("main", &[color()], &["missing"]),
            Err(GraphError::Config { .. })
        ));
    }

    #[test]
    fn depth_format_as_color_is_rejected() {
        let mut graph = graph();
        let bad = AttachmentDesc {
            format: AttachmentFormat::Depth32Float,
            usage: AttachmentUsage::Color,
        };
        assert!(matches!(
            graph.define_pass("main", &[bad], &[]),
            Err(GraphError::Config { .. })
        ));
    }

    #[test]
    fn attachment_capacity_is_bounded() {
        let mut graph = graph();
        let attachments = vec![color(); MAX_PASS_ATTACHMENTS + 1];
        assert!(matches!(
            graph.define_pass("main", &attachments, &[]),
            Err(GraphError::Capacity(_))
        ));
    }

    #[test]
    fn no_dependency_means_no_wait() {
        let mut graph = graph();
        let a = graph.define_pass("a", &[color()], &[]).unwrap();
        let b = graph.define_pass("b", &[color()], &[]).unwrap();
        graph.build_schedule().unwrap();

        assert!(graph.emit_synchronization(a, b).unwrap().wait.is_none());
        assert!(graph.wait_points(b).unwrap().is_empty());
    }

    #[test]
    fn dependency_edge_gets_exactly_one_semaphore() {
        let mut graph = graph();
        let offscreen = graph
            .define_pass("offscreen", &[color(), depth()], &[])
            .unwrap();
        let final_pass = graph
            .define_pass("final", &[color()], &["offscreen"])
            .unwrap();
        graph.build_schedule().unwrap();

        let first = graph
            .emit_synchronization(offscreen, final_pass)
            .unwrap()
            .wait
            .expect("dependency edge must produce a wait");
        let second = graph
            .emit_synchronization(offscreen, final_pass)
            .unwrap()
            .wait
            .unwrap();
        assert_eq!(first.semaphore, second.semaphore);

        // One barrier per producer attachment, transitioning to shader read.
        assert_eq!(first.barriers.len(), 2);
        assert_eq!(first.barriers[0].from, BarrierUsage::ColorWrite);
        assert_eq!(first.barriers[1].from, BarrierUsage::DepthWrite);
        assert!(first
            .barriers
            .iter()
            .all(|barrier| barrier.to == BarrierUsage::ShaderRead));

        assert_eq!(
            graph.signal_semaphores(offscreen).unwrap(),
            vec![first.semaphore]
        );
        assert!(graph.signal_semaphores(final_pass).unwrap().is_empty());
    }

    #[test]
    fn defining_after_schedule_requires_rebuild() {
        let mut graph = graph();
        graph.define_pass("a", &[color()], &[]).unwrap();
        graph.build_schedule().unwrap();

        assert!(matches!(
            graph.define_pass("late", &[color()], &[]),
            Err(GraphError::Config { .. })
        ));

        graph.rebuild();
        graph.define_pass("late", &[color()], &[]).unwrap();
        assert_eq!(graph.build_schedule().unwrap().len(), 2);
    }
}
