//! Parallel secondary command buffer recording.
//!
//! A fixed pool of worker threads records draw commands for contiguous
//! shards of the frame's object list. Static sharding is deliberate: the
//! per-object cost (one visibility test, one matrix, one draw) is close to
//! uniform, so a work queue would buy nothing but synchronization
//! overhead. Each worker exclusively owns its shard's secondary buffer;
//! the only shared state is the read-only object list and the frustum.

use std::ops::Range;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};
use tracing::debug;

use glint_backend::types::DrawCommand;
use glint_backend::{BackendError, RenderBackend};
use glint_core::handle::{Handle, PrimaryBuffer, SecondaryBuffer};
use glint_core::math::Frustum;
use glint_core::object::{ObjectDrawDescriptor, ObjectPushConstants};

use crate::error::{GraphError, Result};
use crate::pass::PassId;
use crate::schedule::FrameGraph;

/// A fully recorded pass, ready for submission.
#[derive(Clone, Copy, Debug)]
pub struct PassRecording {
    /// The recorded pass
    pub pass: PassId,
    /// Its primary command buffer, with all shards spliced in
    pub primary: Handle<PrimaryBuffer>,
    /// Objects drawn after culling
    pub drawn: u32,
    /// Objects skipped by the frustum test
    pub culled: u32,
}

struct RecordShard {
    secondary: Handle<SecondaryBuffer>,
    objects: Arc<[ObjectDrawDescriptor]>,
    range: Range<usize>,
    frustum: Frustum,
    frame_time: f32,
}

struct ShardOutcome {
    drawn: u32,
    culled: u32,
}

enum ShardFailure {
    Begin(BackendError),
    Draw {
        object_index: usize,
        source: BackendError,
    },
    End(BackendError),
}

struct ShardReport {
    worker_index: usize,
    result: std::result::Result<ShardOutcome, ShardFailure>,
}

enum WorkerRequest {
    Record(RecordShard),
    Shutdown,
}

struct Worker {
    request_tx: Sender<WorkerRequest>,
    thread: Option<JoinHandle<()>>,
}

/// Fixed-size worker pool recording passes in parallel.
pub struct RecorderPool<B: RenderBackend> {
    backend: Arc<B>,
    workers: Vec<Worker>,
    report_rx: Receiver<ShardReport>,
}

impl<B: RenderBackend> RecorderPool<B> {
    /// Spawn `worker_count` recording threads (at least one).
    #[must_use]
    pub fn new(backend: Arc<B>, worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let (report_tx, report_rx) = channel::bounded::<ShardReport>(worker_count);

        let mut workers = Vec::with_capacity(worker_count);
        for worker_index in 0..worker_count {
            let (request_tx, request_rx) = channel::bounded::<WorkerRequest>(1);
            let backend = Arc::clone(&backend);
            let report_tx = report_tx.clone();
            let thread = thread::Builder::new()
                .name(format!("glint-worker-{worker_index}"))
                .spawn(move || Self::worker_loop(worker_index, &backend, &request_rx, &report_tx))
                .expect("Failed to spawn recorder worker thread");
            workers.push(Worker {
                request_tx,
                thread: Some(thread),
            });
        }
        debug!(worker_count, "recorder pool started");

        Self {
            backend,
            workers,
            report_rx,
        }
    }

    /// Number of workers in the pool.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Record one pass across the worker pool.
    ///
    /// The object list is split into `worker_count` contiguous shards (the
    /// last may be short, trailing shards may be empty). After dispatch the
    /// call blocks until every worker has reported - the barrier is
    /// unconditional, partially recorded buffers are unusable. On success
    /// the secondaries are spliced into the pass's primary buffer in
    /// worker-index order, after the pass's dependency barriers, so the
    /// draw sequence is identical across runs no matter how recording
    /// interleaves in time.
    ///
    /// If any worker fails, the whole pass aborts: nothing is spliced or
    /// submitted, the pass returns to `Scheduled`, and the error names the
    /// offending object index. The caller skips this frame and may retry
    /// on the next one.
    pub fn record_pass(
        &self,
        graph: &mut FrameGraph<B>,
        pass: PassId,
        objects: &Arc<[ObjectDrawDescriptor]>,
        frustum: &Frustum,
        frame_time: f32,
    ) -> Result<PassRecording> {
        debug_assert!(
            Arc::ptr_eq(&self.backend, graph.backend()),
            "recorder pool and frame graph must share a backend"
        );

        let pass_name = graph.begin_recording(pass)?;

        let worker_count = self.workers.len();
        let object_count = objects.len();
        let shard_len = object_count.div_ceil(worker_count).max(1);

        let mut secondaries = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            match self.backend.create_secondary() {
                Ok(handle) => secondaries.push(handle),
                Err(source) => {
                    graph.abort_recording(pass);
                    return Err(source.into());
                }
            }
        }

        let mut dispatched = 0usize;
        let mut worker_lost = false;
        for (worker_index, worker) in self.workers.iter().enumerate() {
            let start = (worker_index * shard_len).min(object_count);
            let end = (start + shard_len).min(object_count);
            let request = WorkerRequest::Record(RecordShard {
                secondary: secondaries[worker_index],
                objects: Arc::clone(objects),
                range: start..end,
                frustum: *frustum,
                frame_time,
            });
            if worker.request_tx.send(request).is_err() {
                worker_lost = true;
                break;
            }
            dispatched += 1;
        }

        // Counting join: every dispatched shard reports exactly once.
        let mut outcomes: Vec<Option<ShardOutcome>> =
            (0..worker_count).map(|_| None).collect();
        let mut failures = Vec::new();
        for _ in 0..dispatched {
            match self.report_rx.recv() {
                Ok(report) => match report.result {
                    Ok(outcome) => outcomes[report.worker_index] = Some(outcome),
                    Err(failure) => failures.push(failure),
                },
                Err(_) => {
                    worker_lost = true;
                    break;
                }
            }
        }

        if worker_lost {
            graph.abort_recording(pass);
            return Err(GraphError::WorkerLost);
        }
        if !failures.is_empty() {
            graph.abort_recording(pass);
            return Err(Self::pick_failure(failures, &pass_name));
        }

        let primary = match graph.pass_primary(pass) {
            Ok(primary) => primary,
            Err(err) => {
                graph.abort_recording(pass);
                return Err(err);
            }
        };
        if let Err(err) = self.splice(graph, pass, primary, &secondaries, &outcomes) {
            graph.abort_recording(pass);
            return Err(err);
        }

        let (drawn, culled) = outcomes
            .iter()
            .flatten()
            .fold((0, 0), |(drawn, culled), outcome| {
                (drawn + outcome.drawn, culled + outcome.culled)
            });
        debug!(pass = %pass_name, drawn, culled, "recorded pass");

        Ok(PassRecording {
            pass,
            primary,
            drawn,
            culled,
        })
    }

    fn splice(
        &self,
        graph: &FrameGraph<B>,
        pass: PassId,
        primary: Handle<PrimaryBuffer>,
        secondaries: &[Handle<SecondaryBuffer>],
        outcomes: &[Option<ShardOutcome>],
    ) -> Result<()> {
        self.backend.begin_primary(primary)?;
        for wait in graph.wait_points(pass)? {
            for barrier in wait.barriers {
                self.backend.record_barrier(primary, barrier)?;
            }
        }
        // Worker-index order; shards that drew nothing are left out.
        let spliced: Vec<_> = secondaries
            .iter()
            .zip(outcomes)
            .filter(|(_, outcome)| outcome.as_ref().map_or(false, |outcome| outcome.drawn > 0))
            .map(|(secondary, _)| *secondary)
            .collect();
        self.backend.execute_secondaries(primary, &spliced)?;
        self.backend.end_primary(primary)?;
        Ok(())
    }

    /// Report the most useful failure: the lowest failing object index,
    /// with begin/end breakage only when no draw failed.
    fn pick_failure(failures: Vec<ShardFailure>, pass_name: &str) -> GraphError {
        let mut best: Option<(usize, BackendError)> = None;
        let mut fallback: Option<BackendError> = None;
        for failure in failures {
            match failure {
                ShardFailure::Draw {
                    object_index,
                    source,
                } => {
                    if best.as_ref().map_or(true, |(index, _)| object_index < *index) {
                        best = Some((object_index, source));
                    }
                }
                ShardFailure::Begin(source) | ShardFailure::End(source) => {
                    fallback.get_or_insert(source);
                }
            }
        }
        match (best, fallback) {
            (Some((object_index, source)), _) => GraphError::Recording {
                pass: pass_name.to_string(),
                object_index,
                source,
            },
            (None, Some(source)) => GraphError::Backend(source),
            (None, None) => GraphError::WorkerLost,
        }
    }

    fn worker_loop(
        worker_index: usize,
        backend: &Arc<B>,
        request_rx: &Receiver<WorkerRequest>,
        report_tx: &Sender<ShardReport>,
    ) {
        loop {
            match request_rx.recv() {
                Ok(WorkerRequest::Record(shard)) => {
                    let result = Self::record_shard(backend.as_ref(), &shard);
                    if report_tx
                        .send(ShardReport {
                            worker_index,
                            result,
                        })
                        .is_err()
                    {
                        return;
                    }
                }
                Ok(WorkerRequest::Shutdown) | Err(_) => return,
            }
        }
    }

    fn record_shard(
        backend: &B,
        shard: &RecordShard,
    ) -> std::result::Result<ShardOutcome, ShardFailure> {
        backend
            .begin_secondary(shard.secondary)
            .map_err(ShardFailure::Begin)?;

        let mut drawn = 0u32;
        let mut culled = 0u32;
        for object_index in shard.range.clone() {
            let object = &shard.objects[object_index];
            if !shard.frustum.check_sphere(object.center, object.radius) {
                culled += 1;
                continue;
            }
            let draw = DrawCommand {
                pipeline: object.pipeline,
                mesh: object.mesh,
                push_constants: ObjectPushConstants::new(
                    object.transform_at(shard.frame_time),
                ),
            };
            backend
                .record_draw(shard.secondary, draw)
                .map_err(|source| ShardFailure::Draw {
                    object_index,
                    source,
                })?;
            drawn += 1;
        }

        backend
            .end_secondary(shard.secondary)
            .map_err(ShardFailure::End)?;
        Ok(ShardOutcome { drawn, culled })
    }
}

impl<B: RenderBackend> Drop for RecorderPool<B> {
    fn drop(&mut self) {
        for worker in &self.workers {
            let _ = worker.request_tx.send(WorkerRequest::Shutdown);
        }
        for worker in &mut self.workers {
            if let Some(thread) = worker.thread.take() {
                let _ = thread.join();
            }
        }
    }
}
