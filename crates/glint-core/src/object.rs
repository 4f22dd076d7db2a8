//! Per-object draw descriptors produced by the scene layer.

use glam::{EulerRot, Mat4, Quat, Vec3};

use crate::handle::{Handle, MeshBuffer, Pipeline};

/// Everything the recorder needs to draw one object.
///
/// The object list handed to the recorder is shared read-only across all
/// worker threads, so the per-frame animation update is a pure function of
/// frame time ([`transform_at`](Self::transform_at)) rather than in-place
/// mutation.
#[derive(Clone, Copy, Debug)]
pub struct ObjectDrawDescriptor {
    /// Model matrix at rest
    pub transform: Mat4,
    /// Bounding-sphere center in world space
    pub center: Vec3,
    /// Bounding-sphere radius
    pub radius: f32,
    /// Angular velocity in radians per second, per axis
    pub spin: Vec3,
    /// Pipeline to bind for this object
    pub pipeline: Handle<Pipeline>,
    /// Mesh to draw
    pub mesh: Handle<MeshBuffer>,
}

impl ObjectDrawDescriptor {
    /// Create a stationary object at the given transform.
    #[must_use]
    pub const fn new(
        transform: Mat4,
        center: Vec3,
        radius: f32,
        pipeline: Handle<Pipeline>,
        mesh: Handle<MeshBuffer>,
    ) -> Self {
        Self {
            transform,
            center,
            radius,
            spin: Vec3::ZERO,
            pipeline,
            mesh,
        }
    }

    /// Set the angular velocity.
    #[must_use]
    pub const fn with_spin(mut self, spin: Vec3) -> Self {
        self.spin = spin;
        self
    }

    /// The animated model matrix at the given frame time, in seconds.
    #[must_use]
    pub fn transform_at(&self, time: f32) -> Mat4 {
        if self.spin == Vec3::ZERO {
            return self.transform;
        }
        let rotation = Quat::from_euler(
            EulerRot::XYZ,
            self.spin.x * time,
            self.spin.y * time,
            self.spin.z * time,
        );
        self.transform * Mat4::from_quat(rotation)
    }
}

/// Push-constant payload emitted with every draw command.
///
/// Layout must match the shader push-constant block exactly.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ObjectPushConstants {
    /// Animated model matrix, column major.
    pub model: [[f32; 4]; 4],
}

impl ObjectPushConstants {
    /// Size in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Pack a model matrix.
    #[must_use]
    pub fn new(model: Mat4) -> Self {
        Self {
            model: model.to_cols_array_2d(),
        }
    }

    /// The packed matrix.
    #[must_use]
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.model)
    }
}
