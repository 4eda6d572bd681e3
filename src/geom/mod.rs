//! Geometry primitives shared by bounds caching and picking.

pub mod bbox;
pub mod plane;
pub mod ray;

pub use bbox::Aabb;
pub use plane::{Plane, PlaneClip};
pub use ray::Ray;
