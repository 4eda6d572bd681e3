//! Ray picking over the document.
//!
//! Two phases: a broad phase slab test against each candidate's cached
//! bounding box, then a narrow phase per kind - convex plane clipping for
//! brushes, the icon box for brushless entities. Hits come back sorted
//! nearest-first with ties broken by node id, so identical queries over
//! identical state always produce identical sequences.
//!
//! Picking never mutates; it may run concurrently with other reads under
//! the document's threading contract.

use std::cmp::Ordering;

use glam::Vec3;

use crate::geom::{PlaneClip, Ray};

use super::brush::Brush;
use super::map::MapDocument;
use super::node::{NodeId, NodeKind};

/// Which nodes participate in a pick.
#[derive(Debug, Clone, Copy)]
pub struct PickFilter {
    pub entities: bool,
    pub brushes: bool,
    pub include_hidden: bool,
    pub include_locked: bool,
}

impl Default for PickFilter {
    /// Both kinds, visible and unlocked only.
    fn default() -> Self {
        Self {
            entities: true,
            brushes: true,
            include_hidden: false,
            include_locked: false,
        }
    }
}

/// What part of a node the ray struck.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitKind {
    /// Icon box of a brushless entity.
    Entity,
    /// Brush surface; `face` indexes the entry face in the brush's face
    /// list (the exit face when the ray starts inside).
    Brush { face: usize },
}

/// One ray/geometry intersection. Transient - constructed fresh per query,
/// never owned by the document.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub node: NodeId,
    pub kind: HitKind,
    /// Ray parameter, world distance since ray directions are normalized.
    pub t: f32,
    pub point: Vec3,
}

/// Convex narrow phase: clip the ray's `[t_near, t_far]` interval by every
/// face half-space. Hit iff the final interval is non-empty and reaches
/// forward; the hit parameter is the surviving `t_near` clamped to 0.
fn clip_brush(brush: &Brush, ray: &Ray) -> Option<(f32, usize)> {
    if brush.faces().is_empty() {
        return None;
    }
    let mut t_near = f32::NEG_INFINITY;
    let mut t_far = f32::INFINITY;
    let mut enter_face: Option<usize> = None;
    let mut exit_face: Option<usize> = None;
    for (index, face) in brush.faces().iter().enumerate() {
        match face.plane.clip_ray(ray) {
            PlaneClip::Enter(t) => {
                if t > t_near {
                    t_near = t;
                    enter_face = Some(index);
                }
            }
            PlaneClip::Exit(t) => {
                if t < t_far {
                    t_far = t;
                    exit_face = Some(index);
                }
            }
            PlaneClip::Inside => {}
            PlaneClip::Outside => return None,
        }
        if t_near > t_far {
            return None;
        }
    }
    if t_far < 0.0 {
        return None;
    }
    if t_near >= 0.0 {
        enter_face.map(|face| (t_near, face))
    } else {
        // Ray starts inside the solid: surface at t=0, report the exit face.
        exit_face.map(|face| (0.0, face))
    }
}

/// Pick entry point; called through `MapDocument::pick`.
pub(crate) fn pick_nodes(doc: &MapDocument, ray: &Ray, filter: &PickFilter) -> Vec<Hit> {
    let mut hits = Vec::new();
    for (id, node) in doc.nodes() {
        let flags = match doc.effective_flags(id) {
            Ok(flags) => flags,
            Err(_) => continue,
        };
        if (flags.hidden && !filter.include_hidden) || (flags.locked && !filter.include_locked) {
            continue;
        }
        match &node.kind {
            NodeKind::Entity(entity) => {
                // Entities with brushes are hit through their brushes.
                if !filter.entities || entity.has_brushes() {
                    continue;
                }
                let Ok(bounds) = doc.bounds(id) else { continue };
                if let Some((t_near, _)) = bounds.intersect_ray(ray) {
                    hits.push(Hit {
                        node: id,
                        kind: HitKind::Entity,
                        t: t_near,
                        point: ray.point_at(t_near),
                    });
                }
            }
            NodeKind::Brush(brush) => {
                if !filter.brushes {
                    continue;
                }
                // Broad phase: cheap reject on the cached bounds.
                let Ok(bounds) = doc.bounds(id) else { continue };
                if bounds.intersect_ray(ray).is_none() {
                    continue;
                }
                if let Some((t, face)) = clip_brush(brush, ray) {
                    hits.push(Hit {
                        node: id,
                        kind: HitKind::Brush { face },
                        t,
                        point: ray.point_at(t),
                    });
                }
            }
        }
    }
    // Nearest first; id order breaks ties deterministically.
    hits.sort_by(|a, b| {
        a.t.partial_cmp(&b.t)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.node.cmp(&b.node))
    });
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Aabb;

    #[test]
    fn test_clip_unit_cube() {
        let brush = Brush::cuboid(Aabb::cube(Vec3::ZERO, 0.5), "t");
        let ray = Ray::new(Vec3::new(0.0, 0.0, -5.0), Vec3::Z);
        let (t, face) = clip_brush(&brush, &ray).unwrap();
        assert!((t - 4.5).abs() < 1e-5);
        // Entry face must be the -Z face.
        assert!((brush.faces()[face].plane.normal - (-Vec3::Z)).length() < 1e-5);
    }

    #[test]
    fn test_clip_miss() {
        let brush = Brush::cuboid(Aabb::cube(Vec3::ZERO, 0.5), "t");
        let ray = Ray::new(Vec3::new(3.0, 0.0, -5.0), Vec3::Z);
        assert!(clip_brush(&brush, &ray).is_none());
    }

    #[test]
    fn test_clip_behind() {
        let brush = Brush::cuboid(Aabb::cube(Vec3::ZERO, 0.5), "t");
        let ray = Ray::new(Vec3::new(0.0, 0.0, 5.0), Vec3::Z);
        assert!(clip_brush(&brush, &ray).is_none());
    }

    #[test]
    fn test_clip_origin_inside() {
        let brush = Brush::cuboid(Aabb::cube(Vec3::ZERO, 0.5), "t");
        let ray = Ray::new(Vec3::ZERO, Vec3::X);
        let (t, face) = clip_brush(&brush, &ray).unwrap();
        assert_eq!(t, 0.0);
        // Exit face is the +X face.
        assert!((brush.faces()[face].plane.normal - Vec3::X).length() < 1e-5);
    }
}
