//! Container and source geometry.
//!
//! The solver only needs two things from geometry: a containment test that
//! says which faces a point crossed, and the box it should clamp into.

use glam::{IVec3, Vec3};
use serde::{Deserialize, Serialize};

/// A closed region particles must stay inside.
pub trait Container: Send + Sync {
    /// Whether `point` lies inside the region.
    fn contains_point(&self, point: Vec3) -> bool;

    /// Containment plus per-axis violations: `-1` past the min face, `1`
    /// past the max face, `0` otherwise. Inside means all zero.
    fn contains_point_with_violations(&self, point: Vec3) -> (bool, IVec3);

    /// Axis-aligned `(min, max)` of the region.
    fn bounds(&self) -> (Vec3, Vec3);
}

/// Axis-aligned box given by center and full size.
///
/// A point on the min face counts as a violation, a point on the max face
/// does not.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoxContainer {
    #[serde(with = "crate::serde_utils::vec3")]
    pub center: Vec3,
    #[serde(with = "crate::serde_utils::vec3")]
    pub size: Vec3,
}

impl BoxContainer {
    pub fn new(center: Vec3, size: Vec3) -> Self {
        Self { center, size }
    }

    /// Box spanning `[min, max]`.
    pub fn from_min_max(min: Vec3, max: Vec3) -> Self {
        Self {
            center: (min + max) * 0.5,
            size: max - min,
        }
    }

    /// Box centered on the origin, like a unit cube scaled by `size`.
    pub fn centered(size: Vec3) -> Self {
        Self::new(Vec3::ZERO, size)
    }

    pub fn min(&self) -> Vec3 {
        self.center - self.size * 0.5
    }

    pub fn max(&self) -> Vec3 {
        self.center + self.size * 0.5
    }

    /// Lattice points spaced `separation` apart, inset half a separation
    /// from every face. Ordered x-major, then y, then z.
    pub fn fill_points(&self, separation: f32) -> Vec<Vec3> {
        assert!(separation > 0.0, "separation must be positive, got {}", separation);
        let start = self.min() + Vec3::splat(separation * 0.5);
        let span = self.size - Vec3::splat(separation);
        if span.min_element() < 0.0 {
            return Vec::new();
        }
        // Small slack so a span that is an exact multiple keeps its last point
        let counts = (span / separation + Vec3::splat(1e-4)).floor().as_uvec3() + 1;

        let mut points = Vec::with_capacity((counts.x * counts.y * counts.z) as usize);
        for i in 0..counts.x {
            for j in 0..counts.y {
                for k in 0..counts.z {
                    points.push(start + Vec3::new(i as f32, j as f32, k as f32) * separation);
                }
            }
        }
        points
    }
}

impl Container for BoxContainer {
    fn contains_point(&self, point: Vec3) -> bool {
        self.contains_point_with_violations(point).0
    }

    fn contains_point_with_violations(&self, point: Vec3) -> (bool, IVec3) {
        let (min, max) = (self.min(), self.max());
        let axis = |p: f32, lo: f32, hi: f32| {
            if p <= lo {
                -1
            } else if p > hi {
                1
            } else {
                0
            }
        };
        let violations = IVec3::new(
            axis(point.x, min.x, max.x),
            axis(point.y, min.y, max.y),
            axis(point.z, min.z, max.z),
        );
        (violations == IVec3::ZERO, violations)
    }

    fn bounds(&self) -> (Vec3, Vec3) {
        (self.min(), self.max())
    }
}
