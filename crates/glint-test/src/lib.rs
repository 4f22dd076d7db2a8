//! Test harness for the Glint frame graph.
//!
//! Provides a deterministic in-memory [`MockBackend`] with controllable
//! fence completion, plus helpers for building object lists whose draw
//! commands can be traced back to object indices.

pub mod harness;

pub use harness::{MockBackend, MockBackendBuilder, MockCommand};

use glam::{Mat4, Vec3};
use glint_core::handle::{Handle, MeshBuffer, Pipeline};
use glint_core::object::ObjectDrawDescriptor;
use glint_backend::DrawCommand;

/// Build `count` unit-radius objects in a row along +X, one world unit
/// apart. Object `i` sits at `x == i`, so its index can be recovered from
/// the translation column of any draw recorded for it.
#[must_use]
pub fn create_object_row(
    count: usize,
    pipeline: Handle<Pipeline>,
    mesh: Handle<MeshBuffer>,
) -> Vec<ObjectDrawDescriptor> {
    (0..count)
        .map(|i| {
            let position = Vec3::new(i as f32, 0.0, 0.0);
            ObjectDrawDescriptor::new(
                Mat4::from_translation(position),
                position,
                0.5,
                pipeline,
                mesh,
            )
        })
        .collect()
}

/// Recover the object x positions from a sequence of draw commands built
/// from [`create_object_row`] objects.
#[must_use]
pub fn drawn_x_positions(draws: &[DrawCommand]) -> Vec<f32> {
    draws
        .iter()
        .map(|draw| draw.push_constants.model[3][0])
        .collect()
}
