//! Axis-aligned bounding box.
//!
//! Used as the cached bounding volume for every scene node and as the
//! broad-phase volume for picking. The ray test is the standard slab
//! method: intersect the per-axis parametric intervals and reject when
//! the result is empty or entirely behind the ray origin.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::ray::Ray;

/// Axis-aligned box. An empty box has `min > max` on every axis and
/// absorbs nothing into unions; `Aabb::EMPTY` is the merge identity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Merge identity: expanding or merging into this yields the operand.
    pub const EMPTY: Aabb = Aabb {
        min: Vec3::splat(f32::MAX),
        max: Vec3::splat(f32::MIN),
    };

    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    /// Cube of half-extent `half` centered at `center`.
    pub fn cube(center: Vec3, half: f32) -> Self {
        Self {
            min: center - Vec3::splat(half),
            max: center + Vec3::splat(half),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Grow to contain `point`.
    pub fn expand(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    /// Union of two boxes. Merging with an empty box returns the other.
    pub fn merge(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn contains(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    /// Slab test: forward parametric interval where `ray` overlaps the box.
    ///
    /// Returns `Some((t_near, t_far))` with `t_near <= t_far` and
    /// `t_far >= 0`; `t_near` is clamped to 0 when the origin is inside.
    /// Returns `None` for a miss or when the box lies behind the ray.
    pub fn intersect_ray(&self, ray: &Ray) -> Option<(f32, f32)> {
        if self.is_empty() {
            return None;
        }
        let mut t_near = f32::NEG_INFINITY;
        let mut t_far = f32::INFINITY;
        for axis in 0..3 {
            let origin = ray.origin[axis];
            let dir = ray.dir[axis];
            if dir.abs() < f32::EPSILON {
                // Parallel to slab: miss unless origin lies between the planes.
                if origin < self.min[axis] || origin > self.max[axis] {
                    return None;
                }
            } else {
                let inv = 1.0 / dir;
                let t0 = (self.min[axis] - origin) * inv;
                let t1 = (self.max[axis] - origin) * inv;
                let (t0, t1) = if t0 <= t1 { (t0, t1) } else { (t1, t0) };
                t_near = t_near.max(t0);
                t_far = t_far.min(t1);
                if t_near > t_far {
                    return None;
                }
            }
        }
        if t_far < 0.0 {
            return None;
        }
        Some((t_near.max(0.0), t_far))
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_cube() -> Aabb {
        Aabb::cube(Vec3::ZERO, 0.5)
    }

    #[test]
    fn test_merge_identity() {
        let cube = unit_cube();
        assert_eq!(Aabb::EMPTY.merge(&cube), cube);
        assert_eq!(cube.merge(&Aabb::EMPTY), cube);
        assert!(Aabb::EMPTY.is_empty());
    }

    #[test]
    fn test_expand_and_contains() {
        let mut bbox = Aabb::EMPTY;
        bbox.expand(Vec3::new(-1.0, 0.0, 0.0));
        bbox.expand(Vec3::new(1.0, 2.0, 3.0));
        assert!(bbox.contains(Vec3::new(0.0, 1.0, 1.5)));
        assert!(!bbox.contains(Vec3::new(0.0, 3.0, 0.0)));
        assert_eq!(bbox.size(), Vec3::new(2.0, 2.0, 3.0));
    }

    #[test]
    fn test_ray_hit_front() {
        let ray = Ray::new(Vec3::new(0.0, 0.0, -5.0), Vec3::Z);
        let (t_near, t_far) = unit_cube().intersect_ray(&ray).unwrap();
        assert!((t_near - 4.5).abs() < 1e-5);
        assert!((t_far - 5.5).abs() < 1e-5);
    }

    #[test]
    fn test_ray_miss() {
        let ray = Ray::new(Vec3::new(2.0, 0.0, -5.0), Vec3::Z);
        assert!(unit_cube().intersect_ray(&ray).is_none());
    }

    #[test]
    fn test_ray_behind_origin() {
        let ray = Ray::new(Vec3::new(0.0, 0.0, 5.0), Vec3::Z);
        assert!(unit_cube().intersect_ray(&ray).is_none());
    }

    #[test]
    fn test_ray_origin_inside() {
        let ray = Ray::new(Vec3::ZERO, Vec3::X);
        let (t_near, t_far) = unit_cube().intersect_ray(&ray).unwrap();
        assert_eq!(t_near, 0.0);
        assert!((t_far - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_ray_parallel_inside_slabs() {
        // Parallel to the X faces but inside the X/Y slabs: still a hit.
        let ray = Ray::new(Vec3::new(0.25, 0.25, -5.0), Vec3::Z);
        assert!(unit_cube().intersect_ray(&ray).is_some());
    }
}
