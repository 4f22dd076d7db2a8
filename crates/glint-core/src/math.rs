//! Frustum extraction and visibility testing.

use glam::{Mat4, Vec3, Vec4};

/// A plane in the form `normal · p + d = 0`, with `normal` unit length.
#[derive(Clone, Copy, Debug)]
pub struct Plane {
    /// Unit-length plane normal, pointing into the visible half-space
    pub normal: Vec3,
    /// Signed distance of the origin from the plane
    pub d: f32,
}

impl Plane {
    /// Build a plane from raw `(a, b, c, d)` coefficients.
    ///
    /// The coefficients are divided by the length of `(a, b, c)` so that
    /// [`signed_distance`](Self::signed_distance) is measured in world
    /// units. Skipping this step makes radius comparisons wrong, which is
    /// why normalization happens here and not at the call sites.
    #[must_use]
    pub fn from_coefficients(coefficients: Vec4) -> Self {
        let normal = Vec3::new(coefficients.x, coefficients.y, coefficients.z);
        let length = normal.length();
        Self {
            normal: normal / length,
            d: coefficients.w / length,
        }
    }

    /// Signed distance from the plane to a point.
    ///
    /// Positive on the visible side.
    #[inline]
    #[must_use]
    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.d
    }
}

/// View frustum as six inward-facing planes.
#[derive(Clone, Copy, Debug)]
pub struct Frustum {
    /// Left, right, bottom, top, near, far
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Extract frustum planes from a view-projection matrix.
    ///
    /// Standard Gribb/Hartmann row combinations; each plane is normalized
    /// before storage.
    #[must_use]
    pub fn from_view_projection(view_projection: Mat4) -> Self {
        let row0 = view_projection.row(0);
        let row1 = view_projection.row(1);
        let row2 = view_projection.row(2);
        let row3 = view_projection.row(3);

        let planes = [
            Plane::from_coefficients(row3 + row0), // Left
            Plane::from_coefficients(row3 - row0), // Right
            Plane::from_coefficients(row3 + row1), // Bottom
            Plane::from_coefficients(row3 - row1), // Top
            Plane::from_coefficients(row3 + row2), // Near
            Plane::from_coefficients(row3 - row2), // Far
        ];

        Self { planes }
    }

    /// Test whether a sphere is at least partially inside the frustum.
    ///
    /// A sphere exactly touching a plane (`distance == -radius`) counts as
    /// visible, so silhouette-grazing objects do not pop.
    #[must_use]
    pub fn check_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.signed_distance(center) >= -radius)
    }

    /// Test whether a point is inside the frustum.
    #[must_use]
    pub fn check_point(&self, point: Vec3) -> bool {
        self.check_sphere(point, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn looking_down_negative_z() -> Frustum {
        let projection =
            Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 1000.0);
        let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        Frustum::from_view_projection(projection * view)
    }

    #[test]
    fn planes_are_normalized() {
        let frustum = looking_down_negative_z();
        for plane in &frustum.planes {
            assert_relative_eq!(plane.normal.length(), 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn point_in_front_is_visible() {
        let frustum = looking_down_negative_z();
        assert!(frustum.check_point(Vec3::new(0.0, 0.0, -10.0)));
        assert!(!frustum.check_point(Vec3::new(0.0, 0.0, 10.0)));
    }

    #[test]
    fn sphere_behind_near_plane_is_culled() {
        let frustum = looking_down_negative_z();
        // Center behind the camera, radius too small to reach the near plane.
        assert!(!frustum.check_sphere(Vec3::new(0.0, 0.0, 5.0), 1.0));
        // Large enough to poke through.
        assert!(frustum.check_sphere(Vec3::new(0.0, 0.0, 5.0), 10.0));
    }

    #[test]
    fn touching_a_plane_counts_as_visible() {
        // Hand-built single-plane arrangement so the boundary is exact:
        // everything with z <= 100 is visible.
        let boundary = Plane {
            normal: Vec3::NEG_Z,
            d: 100.0,
        };
        let open = Plane {
            normal: Vec3::Z,
            d: 1.0e9,
        };
        let frustum = Frustum {
            planes: [boundary, open, open, open, open, open],
        };

        assert!(frustum.check_point(Vec3::new(0.0, 0.0, 100.0)));
        assert!(!frustum.check_point(Vec3::new(0.0, 0.0, 100.5)));
        // distance == -radius exactly
        assert!(frustum.check_sphere(Vec3::new(0.0, 0.0, 101.0), 1.0));
        assert!(!frustum.check_sphere(Vec3::new(0.0, 0.0, 101.5), 1.0));
    }

    /// Brute-force reference: compare against the unnormalized coefficients
    /// with the radius scaled by the plane length instead.
    fn reference_check(view_projection: Mat4, center: Vec3, radius: f32) -> bool {
        let row0 = view_projection.row(0);
        let row1 = view_projection.row(1);
        let row2 = view_projection.row(2);
        let row3 = view_projection.row(3);
        let coefficients = [
            row3 + row0,
            row3 - row0,
            row3 + row1,
            row3 - row1,
            row3 + row2,
            row3 - row2,
        ];
        coefficients.iter().all(|c| {
            let normal = Vec3::new(c.x, c.y, c.z);
            normal.dot(center) + c.w >= -radius * normal.length()
        })
    }

    /// Normalized slack of the tightest plane; near zero means the sphere
    /// grazes the frustum boundary.
    fn boundary_slack(frustum: &Frustum, center: Vec3, radius: f32) -> f32 {
        frustum
            .planes
            .iter()
            .map(|plane| plane.signed_distance(center) + radius)
            .fold(f32::INFINITY, f32::min)
    }

    #[test]
    fn agrees_with_reference_on_randomized_cameras() {
        let mut rng = StdRng::seed_from_u64(0x67_6c_69_6e_74);
        let mut checked = 0usize;

        while checked < 10_000 {
            let fov = rng.gen_range(0.3..2.5);
            let aspect = rng.gen_range(0.5..2.0);
            let near = rng.gen_range(0.05..1.0);
            let far = near * rng.gen_range(10.0..1000.0);
            let eye = Vec3::new(
                rng.gen_range(-50.0..50.0),
                rng.gen_range(-50.0..50.0),
                rng.gen_range(-50.0..50.0),
            );
            let target = eye
                + Vec3::new(
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(-1.0..1.0),
                );
            if (target - eye).length_squared() < 1e-3 {
                continue;
            }

            let view_projection = Mat4::perspective_rh(fov, aspect, near, far)
                * Mat4::look_at_rh(eye, target, Vec3::Y);
            let frustum = Frustum::from_view_projection(view_projection);

            let center = Vec3::new(
                rng.gen_range(-200.0..200.0),
                rng.gen_range(-200.0..200.0),
                rng.gen_range(-200.0..200.0),
            );
            let radius = rng.gen_range(0.0..50.0);

            // The two formulations can disagree in the last ulp when the
            // sphere grazes a plane; those pairs are not informative.
            if boundary_slack(&frustum, center, radius).abs() < 1e-3 {
                continue;
            }

            assert_eq!(
                frustum.check_sphere(center, radius),
                reference_check(view_projection, center, radius),
                "disagreement for center {center:?} radius {radius}"
            );
            checked += 1;
        }
    }
}
