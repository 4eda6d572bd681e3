//! Entity node: property store plus an ordered list of owned brushes.

use glam::Vec3;

use super::attrs::Attrs;
use super::keys::K_ORIGIN;
use super::node::NodeId;

/// A placeable scene node. Owns its properties and zero or more brushes;
/// ownership is exclusive (a brush has exactly one owning entity at a time,
/// enforced by the document's attach/detach operations).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entity {
    pub attrs: Attrs,
    brushes: Vec<NodeId>,
}

impl Entity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Owned brush ids in insertion order.
    pub fn brushes(&self) -> &[NodeId] {
        &self.brushes
    }

    pub fn has_brushes(&self) -> bool {
        !self.brushes.is_empty()
    }

    pub fn owns_brush(&self, id: NodeId) -> bool {
        self.brushes.contains(&id)
    }

    /// Append a brush id. The document keeps the brush's back reference and
    /// prior owner consistent; this only maintains the list.
    pub(crate) fn push_brush(&mut self, id: NodeId) {
        debug_assert!(!self.brushes.contains(&id), "brush attached twice");
        self.brushes.push(id);
    }

    /// Drop a brush id from the list. Returns false when absent.
    pub(crate) fn drop_brush(&mut self, id: NodeId) -> bool {
        let before = self.brushes.len();
        self.brushes.retain(|&b| b != id);
        self.brushes.len() != before
    }

    /// Re-insert a brush id at `index` (undo of a detach). Appends when the
    /// index is out of range.
    pub(crate) fn insert_brush_at(&mut self, index: usize, id: NodeId) {
        if index >= self.brushes.len() {
            self.brushes.push(id);
        } else {
            self.brushes.insert(index, id);
        }
    }

    pub(crate) fn brush_index(&self, id: NodeId) -> Option<usize> {
        self.brushes.iter().position(|&b| b == id)
    }

    /// Entity position from the `origin` property ("x y z"), `Vec3::ZERO`
    /// when absent or malformed. Used for the icon bound of brushless
    /// entities.
    pub fn origin(&self) -> Vec3 {
        let Some(raw) = self.attrs.get(K_ORIGIN) else {
            return Vec3::ZERO;
        };
        let mut parts = raw.split_whitespace().map(|p| p.parse::<f32>());
        match (parts.next(), parts.next(), parts.next()) {
            (Some(Ok(x)), Some(Ok(y)), Some(Ok(z))) => Vec3::new(x, y, z),
            _ => Vec3::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brush_list_order() {
        let mut entity = Entity::new();
        let a = NodeId::new(1, 0);
        let b = NodeId::new(2, 0);
        entity.push_brush(a);
        entity.push_brush(b);
        assert_eq!(entity.brushes(), &[a, b]);
        assert!(entity.owns_brush(a));

        assert!(entity.drop_brush(a));
        assert!(!entity.drop_brush(a));
        assert_eq!(entity.brushes(), &[b]);

        entity.insert_brush_at(0, a);
        assert_eq!(entity.brushes(), &[a, b]);
    }

    #[test]
    fn test_origin_parsing() {
        let mut entity = Entity::new();
        assert_eq!(entity.origin(), Vec3::ZERO);
        entity.attrs.set(K_ORIGIN, "16 -32 64");
        assert_eq!(entity.origin(), Vec3::new(16.0, -32.0, 64.0));
        entity.attrs.set(K_ORIGIN, "not a vector");
        assert_eq!(entity.origin(), Vec3::ZERO);
    }
}
