//! Headless Glint demo.
//!
//! Drives the full frame loop against the deterministic mock backend: an
//! offscreen pass feeding a final pass, 512 animated objects recorded
//! across a worker pool, a camera orbiting the field, and a bounded number
//! of frames in flight.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use glam::{Mat4, Vec3};
use tracing::info;
use tracing_subscriber::EnvFilter;

use glint_backend::types::{AttachmentDesc, AttachmentFormat};
use glint_core::constants::DEFAULT_FRAMES_IN_FLIGHT;
use glint_core::handle::{Handle, MeshBuffer, Pipeline};
use glint_core::math::Frustum;
use glint_core::object::ObjectDrawDescriptor;
use glint_graph::{FrameGraph, FrameSlots, RecorderPool};
use glint_test::MockBackend;

const GRID_SIDE: usize = 8;
const OBJECT_COUNT: usize = GRID_SIDE * GRID_SIDE * GRID_SIDE;
const WORKER_COUNT: usize = 4;
const FRAME_COUNT: u32 = 120;
const TIMESTEP: f32 = 1.0 / 60.0;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Glint demo starting...");

    let backend = Arc::new(MockBackend::builder().auto_signal(true).build());
    let pipeline = backend.register_pipeline();
    let mesh = backend.register_mesh();

    let mut graph = FrameGraph::new(Arc::clone(&backend));
    let offscreen = graph.define_pass(
        "offscreen",
        &[
            AttachmentDesc::color(AttachmentFormat::Rgba16Float),
            AttachmentDesc::depth(AttachmentFormat::Depth32Float),
        ],
        &[],
    )?;
    let final_pass = graph.define_pass(
        "final",
        &[AttachmentDesc::color(AttachmentFormat::Rgba8Unorm)],
        &["offscreen"],
    )?;
    let pass_count = graph.build_schedule()?.len();
    info!(passes = pass_count, "schedule built");

    let objects: Arc<[ObjectDrawDescriptor]> = object_grid(pipeline, mesh).into();
    let pool = RecorderPool::new(Arc::clone(&backend), WORKER_COUNT);
    let mut slots = FrameSlots::new(Arc::clone(&backend), DEFAULT_FRAMES_IN_FLIGHT)?;
    info!(
        objects = objects.len(),
        workers = pool.worker_count(),
        frames_in_flight = slots.capacity(),
        "scene ready"
    );

    let started = Instant::now();
    let mut total_drawn = 0u64;
    let mut total_culled = 0u64;

    for frame in 0..FRAME_COUNT {
        let time = frame as f32 * TIMESTEP;
        let frustum = orbit_camera(time);

        let slot = slots.acquire_slot()?;
        graph.begin_frame()?;

        let offscreen_rec = pool.record_pass(&mut graph, offscreen, &objects, &frustum, time)?;
        let final_rec = pool.record_pass(&mut graph, final_pass, &objects, &frustum, time)?;

        slots.submit_pass(&mut graph, offscreen)?;
        slots.submit_and_fence(&mut graph, &slot, final_pass)?;

        total_drawn += u64::from(offscreen_rec.drawn) + u64::from(final_rec.drawn);
        total_culled += u64::from(offscreen_rec.culled) + u64::from(final_rec.culled);

        if frame % 30 == 0 {
            info!(
                frame,
                drawn = offscreen_rec.drawn,
                culled = offscreen_rec.culled,
                "frame recorded"
            );
        }
    }

    let elapsed = started.elapsed();
    info!(
        frames = FRAME_COUNT,
        total_drawn,
        total_culled,
        elapsed_ms = elapsed.as_millis() as u64,
        "demo complete"
    );

    Ok(())
}

/// A centered grid of objects with varied spins, 4 world units apart.
fn object_grid(pipeline: Handle<Pipeline>, mesh: Handle<MeshBuffer>) -> Vec<ObjectDrawDescriptor> {
    let mut objects = Vec::with_capacity(OBJECT_COUNT);
    let offset = (GRID_SIDE as f32 - 1.0) / 2.0;
    for x in 0..GRID_SIDE {
        for y in 0..GRID_SIDE {
            for z in 0..GRID_SIDE {
                let index = (x * GRID_SIDE + y) * GRID_SIDE + z;
                let position =
                    Vec3::new(x as f32 - offset, y as f32 - offset, z as f32 - offset) * 4.0;
                let spin = Vec3::new(
                    0.3 + 0.05 * (index % 7) as f32,
                    0.7,
                    0.1 * (index % 3) as f32,
                );
                objects.push(
                    ObjectDrawDescriptor::new(
                        Mat4::from_translation(position),
                        position,
                        1.0,
                        pipeline,
                        mesh,
                    )
                    .with_spin(spin),
                );
            }
        }
    }
    objects
}

/// Frustum of a camera orbiting the grid.
///
/// The far plane is kept tight so part of the grid drops out of view each
/// frame and the cull statistics stay interesting.
fn orbit_camera(time: f32) -> Frustum {
    let angle = time * 0.5;
    let eye = Vec3::new(angle.cos() * 40.0, 18.0, angle.sin() * 40.0);
    let view = Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y);
    let projection =
        Mat4::perspective_rh(60.0_f32.to_radians(), 16.0 / 9.0, 0.1, 60.0);
    Frustum::from_view_projection(projection * view)
}
