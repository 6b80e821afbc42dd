//! Geometric primitives for placing video planes in 3D.

use glam::{EulerRot, Mat4, Quat, Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// Position, rotation (Euler XYZ, radians) and scale of a plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform3D {
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Transform3D {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Vec3::ZERO,
        scale: Vec3::ONE,
    };

    #[inline]
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }

    #[inline]
    pub fn quat(&self) -> Quat {
        Quat::from_euler(EulerRot::XYZ, self.rotation.x, self.rotation.y, self.rotation.z)
    }

    /// Model matrix (scale, then rotate, then translate).
    #[inline]
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.quat(), self.position)
    }
}

impl Default for Transform3D {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Axis-aligned bounding box in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// An inverted box that any `extend` will overwrite.
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    #[inline]
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_points(points: &[Vec3]) -> Self {
        points.iter().fold(Self::EMPTY, |mut b, &p| {
            b.extend(p);
            b
        })
    }

    #[inline]
    pub fn extend(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }
}

/// A plane `normal · p + d = 0`; points with positive distance are inside.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrustumPlane {
    pub normal: Vec3,
    pub d: f32,
}

impl FrustumPlane {
    fn from_row(v: Vec4) -> Self {
        let normal = v.truncate();
        let len = normal.length();
        if len <= f32::EPSILON {
            return Self {
                normal: Vec3::ZERO,
                d: v.w,
            };
        }
        Self {
            normal: normal / len,
            d: v.w / len,
        }
    }

    #[inline]
    pub fn distance(&self, p: Vec3) -> f32 {
        self.normal.dot(p) + self.d
    }
}

/// Six clipping planes of a camera volume: left, right, bottom, top, near, far.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    pub planes: [FrustumPlane; 6],
}

impl Frustum {
    /// Extract planes from a view-projection matrix (Gribb/Hartmann).
    ///
    /// Assumes a `[0, 1]` depth range as produced by glam's `perspective_rh`.
    pub fn from_view_projection(m: &Mat4) -> Self {
        let r0 = m.row(0);
        let r1 = m.row(1);
        let r2 = m.row(2);
        let r3 = m.row(3);
        Self {
            planes: [
                FrustumPlane::from_row(r3 + r0),
                FrustumPlane::from_row(r3 - r0),
                FrustumPlane::from_row(r3 + r1),
                FrustumPlane::from_row(r3 - r1),
                FrustumPlane::from_row(r2),
                FrustumPlane::from_row(r3 - r2),
            ],
        }
    }

    /// Conservative box test: a box is outside only when its most positive
    /// corner is behind some plane.
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        if aabb.is_empty() {
            return false;
        }
        self.planes.iter().all(|plane| {
            let n = plane.normal;
            let positive = Vec3::new(
                if n.x >= 0.0 { aabb.max.x } else { aabb.min.x },
                if n.y >= 0.0 { aabb.max.y } else { aabb.min.y },
                if n.z >= 0.0 { aabb.max.z } else { aabb.min.z },
            );
            plane.distance(positive) >= 0.0
        })
    }

    pub fn contains_point(&self, p: Vec3) -> bool {
        self.planes.iter().all(|plane| plane.distance(p) >= 0.0)
    }
}

impl Default for Frustum {
    /// A frustum that contains everything.
    fn default() -> Self {
        let open = FrustumPlane {
            normal: Vec3::ZERO,
            d: 1.0,
        };
        Self { planes: [open; 6] }
    }
}
