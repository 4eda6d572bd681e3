//! Plane / half-space primitive for brush faces.
//!
//! A brush is the intersection of the half-spaces behind its face planes
//! (normals point outward). The narrow-phase pick clips a ray's running
//! `[t_near, t_far]` interval by each half-space in turn.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::ray::Ray;

/// Result of clipping a ray interval by one half-space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaneClip {
    /// Ray enters the half-space at `t`: raise `t_near` to `max(t_near, t)`.
    Enter(f32),
    /// Ray exits the half-space at `t`: lower `t_far` to `min(t_far, t)`.
    Exit(f32),
    /// Ray is parallel and inside the half-space: interval unchanged.
    Inside,
    /// Ray is parallel and outside: interval is empty, no hit possible.
    Outside,
}

/// Plane in `normal . p = distance` form, normal unit-length and outward.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    pub normal: Vec3,
    pub distance: f32,
}

impl Plane {
    pub fn new(normal: Vec3, distance: f32) -> Self {
        Self {
            normal: normal.normalize_or_zero(),
            distance,
        }
    }

    /// Plane through `point` with the given outward normal.
    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Self {
        let normal = normal.normalize_or_zero();
        Self {
            normal,
            distance: normal.dot(point),
        }
    }

    /// Signed distance: positive in front of (outside) the plane.
    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) - self.distance
    }

    /// Clip `ray` against the half-space behind this plane.
    pub fn clip_ray(&self, ray: &Ray) -> PlaneClip {
        let denom = self.normal.dot(ray.dir);
        let dist = self.signed_distance(ray.origin);
        if denom.abs() < f32::EPSILON {
            if dist > 0.0 {
                PlaneClip::Outside
            } else {
                PlaneClip::Inside
            }
        } else {
            let t = -dist / denom;
            if denom < 0.0 {
                // Moving against the normal: crossing into the half-space.
                PlaneClip::Enter(t)
            } else {
                PlaneClip::Exit(t)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_distance() {
        let plane = Plane::from_point_normal(Vec3::new(0.0, 0.0, 1.0), Vec3::Z);
        assert!((plane.signed_distance(Vec3::new(0.0, 0.0, 3.0)) - 2.0).abs() < 1e-6);
        assert!(plane.signed_distance(Vec3::ZERO) < 0.0);
    }

    #[test]
    fn test_clip_enter_exit() {
        let plane = Plane::from_point_normal(Vec3::ZERO, Vec3::Z);
        // Flying toward the plane from the front: enters the half-space.
        let ray = Ray::new(Vec3::new(0.0, 0.0, 2.0), -Vec3::Z);
        assert_eq!(plane.clip_ray(&ray), PlaneClip::Enter(2.0));
        // Flying away from behind: exits.
        let ray = Ray::new(Vec3::new(0.0, 0.0, -2.0), Vec3::Z);
        assert_eq!(plane.clip_ray(&ray), PlaneClip::Exit(2.0));
    }

    #[test]
    fn test_clip_parallel() {
        let plane = Plane::from_point_normal(Vec3::ZERO, Vec3::Z);
        let inside = Ray::new(Vec3::new(0.0, 0.0, -1.0), Vec3::X);
        assert_eq!(plane.clip_ray(&inside), PlaneClip::Inside);
        let outside = Ray::new(Vec3::new(0.0, 0.0, 1.0), Vec3::X);
        assert_eq!(plane.clip_ray(&outside), PlaneClip::Outside);
    }
}
