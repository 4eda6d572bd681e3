//! Brush node: a convex solid described by its face planes.
//!
//! The full solid-geometry pipeline (intersecting planes into polygons) is
//! out of scope; faces carry both their plane and their already-derived
//! polygon points. Planes drive the convex narrow-phase pick, points drive
//! the bounding box. `Brush::cuboid` builds the axis-aligned case directly,
//! which is all the tests and most editor workflows need.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::geom::{Aabb, Plane};

use super::node::NodeId;

/// One face: outward plane, derived polygon, surface attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Face {
    pub plane: Plane,
    /// Polygon vertices on the plane, already derived. May be empty for a
    /// face whose polygon has not been computed; such faces still clip rays.
    pub points: Vec<Vec3>,
    /// Texture/material name shown in the face inspector.
    pub texture: String,
}

impl Face {
    pub fn new(plane: Plane, points: Vec<Vec3>, texture: impl Into<String>) -> Self {
        Self {
            plane,
            points,
            texture: texture.into(),
        }
    }
}

/// A convex solid. Owns no children; the owning entity is a non-owning
/// back reference maintained by the document's attach/detach operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Brush {
    faces: Vec<Face>,
    owner: Option<NodeId>,
}

impl Brush {
    pub fn new(faces: Vec<Face>) -> Self {
        Self { faces, owner: None }
    }

    /// Axis-aligned cuboid: six outward faces with quad polygons.
    pub fn cuboid(bounds: Aabb, texture: &str) -> Self {
        let (lo, hi) = (bounds.min, bounds.max);
        let corner = |x: f32, y: f32, z: f32| Vec3::new(x, y, z);
        let quad = |a: Vec3, b: Vec3, c: Vec3, d: Vec3| vec![a, b, c, d];
        let faces = vec![
            Face::new(
                Plane::from_point_normal(lo, -Vec3::X),
                quad(lo, corner(lo.x, hi.y, lo.z), corner(lo.x, hi.y, hi.z), corner(lo.x, lo.y, hi.z)),
                texture,
            ),
            Face::new(
                Plane::from_point_normal(hi, Vec3::X),
                quad(corner(hi.x, lo.y, lo.z), corner(hi.x, lo.y, hi.z), hi, corner(hi.x, hi.y, lo.z)),
                texture,
            ),
            Face::new(
                Plane::from_point_normal(lo, -Vec3::Y),
                quad(lo, corner(lo.x, lo.y, hi.z), corner(hi.x, lo.y, hi.z), corner(hi.x, lo.y, lo.z)),
                texture,
            ),
            Face::new(
                Plane::from_point_normal(hi, Vec3::Y),
                quad(corner(lo.x, hi.y, lo.z), corner(hi.x, hi.y, lo.z), hi, corner(lo.x, hi.y, hi.z)),
                texture,
            ),
            Face::new(
                Plane::from_point_normal(lo, -Vec3::Z),
                quad(lo, corner(hi.x, lo.y, lo.z), corner(hi.x, hi.y, lo.z), corner(lo.x, hi.y, lo.z)),
                texture,
            ),
            Face::new(
                Plane::from_point_normal(hi, Vec3::Z),
                quad(corner(lo.x, lo.y, hi.z), corner(lo.x, hi.y, hi.z), hi, corner(hi.x, lo.y, hi.z)),
                texture,
            ),
        ];
        Self { faces, owner: None }
    }

    pub fn faces(&self) -> &[Face] {
        &self.faces
    }

    /// Owning entity, if attached.
    pub fn owner(&self) -> Option<NodeId> {
        self.owner
    }

    pub(crate) fn set_owner(&mut self, owner: Option<NodeId>) {
        self.owner = owner;
    }

    /// Extent of all face polygon points.
    pub fn compute_bounds(&self) -> Aabb {
        let mut bounds = Aabb::EMPTY;
        for face in &self.faces {
            for &point in &face.points {
                bounds.expand(point);
            }
        }
        bounds
    }
}
