//! Node identity and the node variants stored in the document arena.
//!
//! Nodes use a generational index pattern: the arena recycles slots and
//! bumps the generation, so a stale `NodeId` held after removal is
//! detectably dead instead of silently aliasing a new node. All
//! cross-references (brush owner, brush lists, selection) are `NodeId`
//! lookups into the arena, never owning pointers - no cycles by
//! construction.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::brush::Brush;
use super::entity::Entity;

/// Stable node identity: arena index plus generation.
///
/// Ordering is by index then generation, which gives the deterministic
/// tie-break order used by the picker.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub const fn index(self) -> u32 {
        self.index
    }

    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({}v{})", self.index, self.generation)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Visibility / lock state shared by all node kinds.
///
/// Hidden nodes are skipped by rendering and (by default) picking; locked
/// nodes stay visible but are excluded from selection-oriented picks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeFlags {
    pub hidden: bool,
    pub locked: bool,
}

/// Node kind stored per arena slot.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Entity(Entity),
    Brush(Brush),
}

/// One scene node: common flags plus the kind-specific payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub flags: NodeFlags,
    pub kind: NodeKind,
}

impl Node {
    pub fn entity(entity: Entity) -> Self {
        Self {
            flags: NodeFlags::default(),
            kind: NodeKind::Entity(entity),
        }
    }

    pub fn brush(brush: Brush) -> Self {
        Self {
            flags: NodeFlags::default(),
            kind: NodeKind::Brush(brush),
        }
    }

    pub fn is_entity(&self) -> bool {
        matches!(self.kind, NodeKind::Entity(_))
    }

    pub fn is_brush(&self) -> bool {
        matches!(self.kind, NodeKind::Brush(_))
    }

    pub fn as_entity(&self) -> Option<&Entity> {
        match &self.kind {
            NodeKind::Entity(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_entity_mut(&mut self) -> Option<&mut Entity> {
        match &mut self.kind {
            NodeKind::Entity(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_brush(&self) -> Option<&Brush> {
        match &self.kind {
            NodeKind::Brush(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_brush_mut(&mut self) -> Option<&mut Brush> {
        match &mut self.kind {
            NodeKind::Brush(b) => Some(b),
            _ => None,
        }
    }
}

/// Arena allocator: nodes in slots, generations detect stale ids.
///
/// Slots are recycled through a free list; deallocation bumps the slot's
/// generation so every previously handed-out id for that slot dies.
#[derive(Debug, Default)]
pub struct NodeArena {
    slots: Vec<Option<Node>>,
    generations: Vec<u32>,
    free_list: Vec<u32>,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node, returning its id.
    pub fn insert(&mut self, node: Node) -> NodeId {
        if let Some(index) = self.free_list.pop() {
            let generation = self.generations[index as usize];
            self.slots[index as usize] = Some(node);
            NodeId::new(index, generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Some(node));
            self.generations.push(0);
            NodeId::new(index, 0)
        }
    }

    /// Re-insert a node under its previous id (undo of a removal).
    /// The slot must currently be free at exactly `id.generation()`.
    pub fn restore(&mut self, id: NodeId, node: Node) {
        let index = id.index() as usize;
        debug_assert!(index < self.slots.len(), "restore past end of arena");
        debug_assert!(self.slots[index].is_none(), "restore into live slot");
        // Roll the generation back: ids recorded before the removal are
        // valid again, exactly as the spec's rollback guarantee requires.
        self.generations[index] = id.generation();
        self.slots[index] = Some(node);
        self.free_list.retain(|&i| i != id.index());
    }

    /// Remove a node, invalidating its id. Returns the node, or `None`
    /// if the id was stale.
    pub fn remove(&mut self, id: NodeId) -> Option<Node> {
        let index = id.index() as usize;
        if index >= self.slots.len() || self.generations[index] != id.generation() {
            return None;
        }
        let node = self.slots[index].take()?;
        self.generations[index] += 1;
        self.free_list.push(id.index());
        Some(node)
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        let index = id.index() as usize;
        if index >= self.slots.len() || self.generations[index] != id.generation() {
            return None;
        }
        self.slots[index].as_ref()
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        let index = id.index() as usize;
        if index >= self.slots.len() || self.generations[index] != id.generation() {
            return None;
        }
        self.slots[index].as_mut()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Live nodes in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.as_ref()
                .map(|node| (NodeId::new(i as u32, self.generations[i]), node))
        })
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
