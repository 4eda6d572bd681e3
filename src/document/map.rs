//! MapDocument: the editable document root.
//!
//! Owns the node arena, the selection, the event bus, the open transaction
//! slot and the undo/redo stacks. All mutations require an open transaction
//! and append reversible records to it; commit publishes exactly one
//! `NodesChanged` batch, rollback reverse-replays the log and publishes
//! nothing.
//!
//! Threading contract: single writer. All mutations happen on the document's
//! owning thread; the core holds no locks around the arena. Read-only
//! queries (bounds, pick, property get) may run from other threads only if
//! the caller guarantees no mutation is in flight. Bounds use a lazy cache
//! keyed by node id, dropped on invalidation and recomputed on the next
//! read - queries never observe stale bounds.

use std::collections::HashMap;
use std::sync::RwLock;

use log::{debug, error, info};

use crate::config::ICON_HALF_EXTENT;
use crate::core::event_bus::EventBus;
use crate::core::events::{
    DocumentCreated, DocumentLoaded, NodesChanged, SelectionChanged, SelectionWillChange,
    TransactionRedone, TransactionUndone,
};
use crate::error::{DocError, DocResult};
use crate::geom::{Aabb, Ray};

use super::attrs::Attrs;
use super::brush::Brush;
use super::entity::Entity;
use super::node::{Node, NodeArena, NodeFlags, NodeId};
use super::pick::{Hit, PickFilter, pick_nodes};
use super::transaction::{Mutation, Transaction};

pub struct MapDocument {
    arena: NodeArena,
    selection: Vec<NodeId>,
    bus: EventBus,
    txn: Option<Transaction>,
    undo_stack: Vec<Transaction>,
    redo_stack: Vec<Transaction>,
    /// Lazy bounds cache. RwLock only for interior mutability on the read
    /// path; the threading contract above still applies.
    bounds_cache: RwLock<HashMap<NodeId, Aabb>>,
}

impl Default for MapDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl MapDocument {
    /// Fresh empty document. Publishes `DocumentCreated` on its own bus so
    /// late subscribers can still pick it up via `poll()`.
    pub fn new() -> Self {
        info!("MapDocument::new()");
        let doc = Self {
            arena: NodeArena::new(),
            selection: Vec::new(),
            bus: EventBus::new(),
            txn: None,
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            bounds_cache: RwLock::new(HashMap::new()),
        };
        doc.bus.publish(DocumentCreated);
        doc
    }

    /// The document's event bus. Collaborators subscribe here and keep the
    /// returned handle for unsubscription at their own teardown.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Importers call this after populating a document: drops edit history
    /// (loading is not undoable) and publishes `DocumentLoaded`.
    pub fn mark_loaded(&mut self) {
        info!("document loaded: {} nodes", self.arena.len());
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.bus.publish(DocumentLoaded);
    }

    // === Queries (read-only, no transaction required) ===

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.arena.get(id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.arena.contains(id)
    }

    /// Live nodes in ascending id order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.arena.iter()
    }

    /// All entity nodes in ascending id order.
    pub fn entities(&self) -> impl Iterator<Item = (NodeId, &Entity)> {
        self.arena
            .iter()
            .filter_map(|(id, node)| node.as_entity().map(|e| (id, e)))
    }

    /// Lazy traversal of every brush in the document; compose with
    /// `.filter(...)` for predicate traversal.
    pub fn each_brush(&self) -> impl Iterator<Item = (NodeId, &Brush)> {
        self.arena
            .iter()
            .filter_map(|(id, node)| node.as_brush().map(|b| (id, b)))
    }

    /// Brushes owned by `entity`, in list order.
    pub fn each_brush_of(
        &self,
        entity: NodeId,
    ) -> DocResult<impl Iterator<Item = (NodeId, &Brush)>> {
        let ent = self.entity_ref(entity)?;
        Ok(ent
            .brushes()
            .iter()
            .filter_map(|&id| self.arena.get(id).and_then(Node::as_brush).map(|b| (id, b))))
    }

    /// Owned brush ids of `entity` in insertion order.
    pub fn brushes_of(&self, entity: NodeId) -> DocResult<&[NodeId]> {
        Ok(self.entity_ref(entity)?.brushes())
    }

    pub fn properties(&self, entity: NodeId) -> DocResult<&Attrs> {
        Ok(&self.entity_ref(entity)?.attrs)
    }

    /// Classname of `entity`, falling back to the documented sentinel.
    pub fn classname(&self, entity: NodeId) -> DocResult<&str> {
        Ok(self.entity_ref(entity)?.attrs.classname())
    }

    /// Node flags merged with the owner's (a brush inside a hidden or
    /// locked entity inherits that state).
    pub fn effective_flags(&self, id: NodeId) -> DocResult<NodeFlags> {
        let node = self.arena.get(id).ok_or(DocError::NodeNotFound(id))?;
        let mut flags = node.flags;
        if let Some(owner) = node.as_brush().and_then(Brush::owner)
            && let Some(owner_node) = self.arena.get(owner)
        {
            flags.hidden |= owner_node.flags.hidden;
            flags.locked |= owner_node.flags.locked;
        }
        Ok(flags)
    }

    /// Current selection in selection order.
    pub fn selection(&self) -> &[NodeId] {
        &self.selection
    }

    /// Bounding box of a node, recomputed lazily when invalidated.
    ///
    /// Entity bounds are the union of owned brush bounds, or a fixed icon
    /// box at the entity origin when it owns none. Brush bounds are the
    /// extent of its face polygons.
    pub fn bounds(&self, id: NodeId) -> DocResult<Aabb> {
        if let Some(cached) = self
            .bounds_cache
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
        {
            return Ok(*cached);
        }
        let node = self.arena.get(id).ok_or(DocError::NodeNotFound(id))?;
        let bounds = match &node.kind {
            super::node::NodeKind::Brush(brush) => brush.compute_bounds(),
            super::node::NodeKind::Entity(entity) => {
                if entity.has_brushes() {
                    let mut union = Aabb::EMPTY;
                    for &brush_id in entity.brushes() {
                        union = union.merge(&self.bounds(brush_id)?);
                    }
                    union
                } else {
                    Aabb::cube(entity.origin(), ICON_HALF_EXTENT)
                }
            }
        };
        self.bounds_cache
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, bounds);
        Ok(bounds)
    }

    /// Ray pick over the current document state. Pure read path; results
    /// are sorted nearest-first with stable id tie-break.
    pub fn pick(&self, ray: &Ray, filter: &PickFilter) -> Vec<Hit> {
        pick_nodes(self, ray, filter)
    }

    // === Transactions ===

    /// Open a named transaction. Fails with `TransactionAlreadyOpen` while
    /// another is open (single active transaction per document, no nesting);
    /// the open one is left untouched.
    pub fn begin_transaction(&mut self, name: &str) -> DocResult<()> {
        if let Some(open) = &self.txn {
            return Err(DocError::TransactionAlreadyOpen {
                name: open.name().to_string(),
            });
        }
        debug!("begin transaction: {name}");
        self.txn = Some(Transaction::new(name));
        Ok(())
    }

    pub fn transaction_open(&self) -> bool {
        self.txn.is_some()
    }

    /// Commit the open transaction: push it onto the undo stack, clear the
    /// redo stack, and publish exactly one `NodesChanged` with the net
    /// changed set (plus selection events when the selection was replaced).
    /// An empty transaction commits silently and is not undoable.
    pub fn commit_transaction(&mut self) -> DocResult<()> {
        let txn = self.txn.take().ok_or(DocError::NoTransaction)?;
        if txn.is_empty() {
            debug!("commit (empty): {}", txn.name());
            return Ok(());
        }
        let changed = txn.changed_nodes();
        let selection_changed = txn.selection_changed();
        debug!("commit: {} ({} nodes changed)", txn.name(), changed.len());
        self.undo_stack.push(txn);
        self.redo_stack.clear();
        if selection_changed {
            self.bus.publish(SelectionWillChange);
        }
        if !changed.is_empty() {
            self.bus.publish(NodesChanged { nodes: changed });
        }
        if selection_changed {
            self.bus.publish(SelectionChanged {
                selected: self.selection.clone(),
            });
        }
        Ok(())
    }

    /// Roll back the open transaction: reverse-replay its log, restoring the
    /// document exactly as it was before `begin_transaction`. Publishes
    /// nothing - from an observer's perspective nothing ever happened.
    pub fn rollback_transaction(&mut self) -> DocResult<()> {
        let txn = self.txn.take().ok_or(DocError::NoTransaction)?;
        debug!("rollback: {} ({} steps)", txn.name(), txn.log().len());
        for mutation in txn.log().iter().rev() {
            self.revert(mutation);
        }
        self.drop_bounds_cache();
        Ok(())
    }

    /// Run `f` inside a transaction: commit on `Ok`, auto-rollback on `Err`.
    /// Guarantees all-or-nothing for multi-step edits.
    pub fn transact<T>(
        &mut self,
        name: &str,
        f: impl FnOnce(&mut Self) -> DocResult<T>,
    ) -> DocResult<T> {
        self.begin_transaction(name)?;
        match f(self) {
            Ok(value) => {
                self.commit_transaction()?;
                Ok(value)
            }
            Err(err) => {
                error!("transaction '{name}' failed: {err}; rolling back");
                self.rollback_transaction()?;
                Err(err)
            }
        }
    }

    // === Mutations (open transaction required) ===

    /// Allocate a new entity with an empty property store and no brushes.
    pub fn create_entity(&mut self) -> DocResult<NodeId> {
        self.ensure_open()?;
        let id = self.arena.insert(Node::entity(Entity::new()));
        debug!("create_entity -> {id}");
        self.record(Mutation::EntityCreated { id });
        Ok(id)
    }

    /// Remove an entity and every brush it owns. Selected nodes among them
    /// are deselected first (recorded, so rollback restores the selection).
    pub fn remove_entity(&mut self, id: NodeId) -> DocResult<()> {
        self.ensure_open()?;
        let entity = self.entity_ref(id)?;
        let brush_ids: Vec<NodeId> = entity.brushes().to_vec();

        let mut doomed: Vec<NodeId> = brush_ids.clone();
        doomed.push(id);
        if self.selection.iter().any(|sel| doomed.contains(sel)) {
            let next: Vec<NodeId> = self
                .selection
                .iter()
                .copied()
                .filter(|sel| !doomed.contains(sel))
                .collect();
            self.replace_selection(next);
        }

        let mut brushes = Vec::with_capacity(brush_ids.len());
        for brush_id in brush_ids {
            if let Some(node) = self.arena.remove(brush_id) {
                brushes.push((brush_id, node));
            }
        }
        let node = self.arena.remove(id).ok_or(DocError::NodeNotFound(id))?;
        debug!("remove_entity {id} ({} brushes)", brushes.len());
        self.invalidate(id);
        for (brush_id, _) in &brushes {
            self.invalidate(*brush_id);
        }
        self.record(Mutation::EntityRemoved { id, node, brushes });
        Ok(())
    }

    /// Create a brush node owned by `entity`. Returns the new brush id.
    pub fn add_brush(&mut self, entity: NodeId, brush: Brush) -> DocResult<NodeId> {
        self.ensure_open()?;
        self.entity_ref(entity)?;
        let mut brush = brush;
        brush.set_owner(Some(entity));
        let node = Node::brush(brush);
        let snapshot = node.clone();
        let brush_id = self.arena.insert(node);
        if let Some(ent) = self.entity_mut_unchecked(entity) {
            ent.push_brush(brush_id);
        }
        debug!("add_brush {brush_id} -> entity {entity}");
        self.invalidate(entity);
        self.record(Mutation::BrushAdded {
            entity,
            brush: brush_id,
            node: snapshot,
        });
        Ok(brush_id)
    }

    /// Transfer ownership of an existing brush to `entity`, detaching it
    /// from any prior owner first. No-op when already owned by `entity`.
    pub fn attach_brush(&mut self, entity: NodeId, brush: NodeId) -> DocResult<()> {
        self.ensure_open()?;
        self.entity_ref(entity)?;
        let brush_node = self
            .arena
            .get(brush)
            .ok_or(DocError::NodeNotFound(brush))?
            .as_brush()
            .ok_or(DocError::NotABrush(brush))?;
        let old_owner = brush_node.owner();
        if old_owner == Some(entity) {
            return Ok(());
        }

        let old_index = match old_owner {
            Some(old) => {
                let index = self.entity_ref(old)?.brush_index(brush);
                if let Some(ent) = self.entity_mut_unchecked(old) {
                    ent.drop_brush(brush);
                }
                self.invalidate(old);
                index
            }
            None => None,
        };
        if let Some(ent) = self.entity_mut_unchecked(entity) {
            ent.push_brush(brush);
        }
        if let Some(b) = self.brush_mut_unchecked(brush) {
            b.set_owner(Some(entity));
        }
        debug!("attach_brush {brush}: {old_owner:?} -> {entity}");
        self.invalidate(entity);
        self.invalidate(brush);
        self.record(Mutation::BrushAttached {
            brush,
            new_owner: entity,
            old_owner,
            old_index,
        });
        Ok(())
    }

    /// Detach a brush from `entity` (the brush stays in the arena, unowned).
    /// Fails with `BrushNotOwned` when `entity` does not own it; no state
    /// changes in that case.
    pub fn remove_brush(&mut self, entity: NodeId, brush: NodeId) -> DocResult<()> {
        self.ensure_open()?;
        let ent = self.entity_ref(entity)?;
        let index = ent
            .brush_index(brush)
            .ok_or(DocError::BrushNotOwned { brush, entity })?;
        if let Some(ent) = self.entity_mut_unchecked(entity) {
            ent.drop_brush(brush);
        }
        if let Some(b) = self.brush_mut_unchecked(brush) {
            b.set_owner(None);
        }
        debug!("remove_brush {brush} from {entity}");
        self.invalidate(entity);
        self.invalidate(brush);
        self.record(Mutation::BrushDetached {
            brush,
            entity,
            index,
        });
        Ok(())
    }

    /// Set a property. Returns true when the key was newly created.
    /// Setting a key to its current value records nothing.
    pub fn set_property(&mut self, entity: NodeId, key: &str, value: &str) -> DocResult<bool> {
        self.ensure_open()?;
        let prior = self.entity_ref(entity)?.attrs.get(key).map(str::to_string);
        if prior.as_deref() == Some(value) {
            return Ok(false);
        }
        let is_new = prior.is_none();
        if let Some(ent) = self.entity_mut_unchecked(entity) {
            ent.attrs.set(key, value);
        }
        // Origin drives the icon bound of brushless entities.
        self.invalidate(entity);
        self.record(Mutation::PropertySet {
            entity,
            key: key.to_string(),
            value: value.to_string(),
            prior,
        });
        Ok(is_new)
    }

    /// Remove a property. Returns false (recording nothing) when absent.
    pub fn remove_property(&mut self, entity: NodeId, key: &str) -> DocResult<bool> {
        self.ensure_open()?;
        let ent = self.entity_ref(entity)?;
        let Some(prior_index) = ent.attrs.index_of(key) else {
            return Ok(false);
        };
        let prior_value = match self.entity_mut_unchecked(entity).and_then(|e| e.attrs.remove(key))
        {
            Some(value) => value,
            None => return Ok(false),
        };
        self.invalidate(entity);
        self.record(Mutation::PropertyRemoved {
            entity,
            key: key.to_string(),
            prior_value,
            prior_index,
        });
        Ok(true)
    }

    /// Change visibility/lock flags on any node.
    pub fn set_flags(&mut self, id: NodeId, next: NodeFlags) -> DocResult<()> {
        self.ensure_open()?;
        let node = self.arena.get(id).ok_or(DocError::NodeNotFound(id))?;
        let prior = node.flags;
        if prior == next {
            return Ok(());
        }
        if let Some(node) = self.arena.get_mut(id) {
            node.flags = next;
        }
        self.record(Mutation::FlagsChanged { id, prior, next });
        Ok(())
    }

    /// Replace the selection. All ids must be live. `SelectionWillChange` /
    /// `SelectionChanged` are published at commit, bracketing the single
    /// `NodesChanged` batch.
    pub fn select(&mut self, nodes: Vec<NodeId>) -> DocResult<()> {
        self.ensure_open()?;
        for &id in &nodes {
            if !self.arena.contains(id) {
                return Err(DocError::NodeNotFound(id));
            }
        }
        if nodes == self.selection {
            return Ok(());
        }
        self.replace_selection(nodes);
        Ok(())
    }

    pub fn deselect_all(&mut self) -> DocResult<()> {
        self.select(Vec::new())
    }

    // === Undo / redo ===

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Name of the transaction `undo` would revert (for menu labels).
    pub fn undo_name(&self) -> Option<&str> {
        self.undo_stack.last().map(Transaction::name)
    }

    pub fn redo_name(&self) -> Option<&str> {
        self.redo_stack.last().map(Transaction::name)
    }

    /// Revert the most recently committed transaction. Not allowed while a
    /// transaction is open.
    pub fn undo(&mut self) -> DocResult<()> {
        if let Some(open) = &self.txn {
            return Err(DocError::TransactionAlreadyOpen {
                name: open.name().to_string(),
            });
        }
        let txn = self.undo_stack.pop().ok_or(DocError::NothingToUndo)?;
        info!("undo: {}", txn.name());
        for mutation in txn.log().iter().rev() {
            self.revert(mutation);
        }
        self.drop_bounds_cache();
        self.publish_replay(&txn);
        self.bus.publish(TransactionUndone {
            name: txn.name().to_string(),
        });
        self.redo_stack.push(txn);
        Ok(())
    }

    /// Re-apply the most recently undone transaction.
    pub fn redo(&mut self) -> DocResult<()> {
        if let Some(open) = &self.txn {
            return Err(DocError::TransactionAlreadyOpen {
                name: open.name().to_string(),
            });
        }
        let txn = self.redo_stack.pop().ok_or(DocError::NothingToRedo)?;
        info!("redo: {}", txn.name());
        for mutation in txn.log() {
            self.apply(mutation);
        }
        self.drop_bounds_cache();
        self.publish_replay(&txn);
        self.bus.publish(TransactionRedone {
            name: txn.name().to_string(),
        });
        self.undo_stack.push(txn);
        Ok(())
    }

    // === Internals ===

    fn ensure_open(&self) -> DocResult<()> {
        if self.txn.is_none() {
            error!("mutating operation outside a transaction");
            return Err(DocError::NoTransaction);
        }
        Ok(())
    }

    fn record(&mut self, mutation: Mutation) {
        if let Some(txn) = &mut self.txn {
            txn.record(mutation);
        }
    }

    fn entity_ref(&self, id: NodeId) -> DocResult<&Entity> {
        self.arena
            .get(id)
            .ok_or(DocError::NodeNotFound(id))?
            .as_entity()
            .ok_or(DocError::NotAnEntity(id))
    }

    fn entity_mut_unchecked(&mut self, id: NodeId) -> Option<&mut Entity> {
        self.arena.get_mut(id).and_then(Node::as_entity_mut)
    }

    fn brush_mut_unchecked(&mut self, id: NodeId) -> Option<&mut Brush> {
        self.arena.get_mut(id).and_then(Node::as_brush_mut)
    }

    /// Swap in a new selection and record the replacement.
    fn replace_selection(&mut self, next: Vec<NodeId>) {
        let prior = std::mem::replace(&mut self.selection, next.clone());
        self.record(Mutation::SelectionReplaced { prior, next });
    }

    /// Drop a node's cached bounds together with its owner chain.
    fn invalidate(&self, id: NodeId) {
        let mut cache = self.bounds_cache.write().unwrap_or_else(|e| e.into_inner());
        cache.remove(&id);
        if let Some(owner) = self
            .arena
            .get(id)
            .and_then(Node::as_brush)
            .and_then(Brush::owner)
        {
            cache.remove(&owner);
        }
    }

    fn drop_bounds_cache(&self) {
        self.bounds_cache
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Publish the notification batch for an undo/redo replay: one
    /// `NodesChanged` plus selection events when applicable.
    fn publish_replay(&self, txn: &Transaction) {
        let changed = txn.changed_nodes();
        let selection_changed = txn.selection_changed();
        if selection_changed {
            self.bus.publish(SelectionWillChange);
        }
        if !changed.is_empty() {
            self.bus.publish(NodesChanged { nodes: changed });
        }
        if selection_changed {
            self.bus.publish(SelectionChanged {
                selected: self.selection.clone(),
            });
        }
    }

    /// Reverse one recorded step. Replay invariants guarantee referenced
    /// nodes exist; inconsistencies are logged, never propagated.
    fn revert(&mut self, mutation: &Mutation) {
        match mutation {
            Mutation::EntityCreated { id } => {
                if self.arena.remove(*id).is_none() {
                    error!("revert EntityCreated: {id} already gone");
                }
            }
            Mutation::EntityRemoved { id, node, brushes } => {
                for (brush_id, brush_node) in brushes {
                    self.arena.restore(*brush_id, brush_node.clone());
                }
                self.arena.restore(*id, node.clone());
            }
            Mutation::BrushAdded { entity, brush, .. } => {
                if let Some(ent) = self.entity_mut_unchecked(*entity) {
                    ent.drop_brush(*brush);
                }
                self.arena.remove(*brush);
            }
            Mutation::BrushAttached {
                brush,
                new_owner,
                old_owner,
                old_index,
            } => {
                if let Some(ent) = self.entity_mut_unchecked(*new_owner) {
                    ent.drop_brush(*brush);
                }
                if let Some(old) = old_owner {
                    if let Some(ent) = self.entity_mut_unchecked(*old) {
                        ent.insert_brush_at(old_index.unwrap_or(usize::MAX), *brush);
                    }
                }
                if let Some(b) = self.brush_mut_unchecked(*brush) {
                    b.set_owner(*old_owner);
                }
            }
            Mutation::BrushDetached {
                brush,
                entity,
                index,
            } => {
                if let Some(ent) = self.entity_mut_unchecked(*entity) {
                    ent.insert_brush_at(*index, *brush);
                }
                if let Some(b) = self.brush_mut_unchecked(*brush) {
                    b.set_owner(Some(*entity));
                }
            }
            Mutation::PropertySet {
                entity, key, prior, ..
            } => {
                if let Some(ent) = self.entity_mut_unchecked(*entity) {
                    match prior {
                        Some(value) => {
                            ent.attrs.set(key.clone(), value.clone());
                        }
                        None => {
                            ent.attrs.remove(key);
                        }
                    }
                }
            }
            Mutation::PropertyRemoved {
                entity,
                key,
                prior_value,
                prior_index,
            } => {
                if let Some(ent) = self.entity_mut_unchecked(*entity) {
                    ent.attrs
                        .insert_at(*prior_index, key.clone(), prior_value.clone());
                }
            }
            Mutation::FlagsChanged { id, prior, .. } => {
                if let Some(node) = self.arena.get_mut(*id) {
                    node.flags = *prior;
                }
            }
            Mutation::SelectionReplaced { prior, .. } => {
                self.selection = prior.clone();
            }
        }
    }

    /// Re-apply one recorded step (redo).
    fn apply(&mut self, mutation: &Mutation) {
        match mutation {
            Mutation::EntityCreated { id } => {
                self.arena.restore(*id, Node::entity(Entity::new()));
            }
            Mutation::EntityRemoved { id, brushes, .. } => {
                for (brush_id, _) in brushes {
                    self.arena.remove(*brush_id);
                }
                self.arena.remove(*id);
            }
            Mutation::BrushAdded {
                entity,
                brush,
                node,
            } => {
                self.arena.restore(*brush, node.clone());
                if let Some(ent) = self.entity_mut_unchecked(*entity) {
                    ent.push_brush(*brush);
                }
            }
            Mutation::BrushAttached {
                brush,
                new_owner,
                old_owner,
                ..
            } => {
                if let Some(old) = old_owner {
                    if let Some(ent) = self.entity_mut_unchecked(*old) {
                        ent.drop_brush(*brush);
                    }
                }
                if let Some(ent) = self.entity_mut_unchecked(*new_owner) {
                    ent.push_brush(*brush);
                }
                if let Some(b) = self.brush_mut_unchecked(*brush) {
                    b.set_owner(Some(*new_owner));
                }
            }
            Mutation::BrushDetached { brush, entity, .. } => {
                if let Some(ent) = self.entity_mut_unchecked(*entity) {
                    ent.drop_brush(*brush);
                }
                if let Some(b) = self.brush_mut_unchecked(*brush) {
                    b.set_owner(None);
                }
            }
            Mutation::PropertySet {
                entity, key, value, ..
            } => {
                if let Some(ent) = self.entity_mut_unchecked(*entity) {
                    ent.attrs.set(key.clone(), value.clone());
                }
            }
            Mutation::PropertyRemoved { entity, key, .. } => {
                if let Some(ent) = self.entity_mut_unchecked(*entity) {
                    ent.attrs.remove(key);
                }
            }
            Mutation::FlagsChanged { id, next, .. } => {
                if let Some(node) = self.arena.get_mut(*id) {
                    node.flags = *next;
                }
            }
            Mutation::SelectionReplaced { next, .. } => {
                self.selection = next.clone();
            }
        }
    }
}

impl std::fmt::Debug for MapDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapDocument")
            .field("nodes", &self.arena.len())
            .field("selection", &self.selection)
            .field("transaction_open", &self.txn.is_some())
            .field("undo_depth", &self.undo_stack.len())
            .field("redo_depth", &self.redo_stack.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use glam::Vec3;

    use super::*;
    use crate::document::keys::K_CLASSNAME;
    use crate::document::pick::HitKind;

    fn init_logs() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    /// Full content snapshot for deep state comparison.
    fn snapshot(doc: &MapDocument) -> (Vec<(NodeId, Node)>, Vec<NodeId>) {
        (
            doc.nodes().map(|(id, n)| (id, n.clone())).collect(),
            doc.selection().to_vec(),
        )
    }

    fn unit_cube() -> Brush {
        Brush::cuboid(Aabb::cube(Vec3::ZERO, 0.5), "base/metal1")
    }

    /// Document with one entity owning a unit cube at the origin.
    fn doc_with_cube() -> (MapDocument, NodeId, NodeId) {
        init_logs();
        let mut doc = MapDocument::new();
        let (entity, brush) = doc
            .transact("Create cube", |doc| {
                let entity = doc.create_entity()?;
                let brush = doc.add_brush(entity, unit_cube())?;
                Ok((entity, brush))
            })
            .unwrap();
        (doc, entity, brush)
    }

    fn nodes_changed_counter(doc: &MapDocument) -> Arc<AtomicUsize> {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        doc.bus().subscribe::<NodesChanged, _>(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        counter
    }

    #[test]
    fn test_mutation_outside_transaction_rejected() {
        let mut doc = MapDocument::new();
        assert_eq!(doc.create_entity(), Err(DocError::NoTransaction));
        assert_eq!(doc.nodes().count(), 0);
    }

    #[test]
    fn test_second_begin_rejected_open_unaffected() {
        let mut doc = MapDocument::new();
        doc.begin_transaction("First").unwrap();
        let entity = doc.create_entity().unwrap();
        assert_eq!(
            doc.begin_transaction("Second"),
            Err(DocError::TransactionAlreadyOpen {
                name: "First".into()
            })
        );
        // The open transaction is unaffected and still commits.
        doc.commit_transaction().unwrap();
        assert!(doc.contains(entity));
        assert_eq!(doc.undo_name(), Some("First"));
    }

    #[test]
    fn test_commit_emits_one_nodes_changed() {
        let mut doc = MapDocument::new();
        let counter = nodes_changed_counter(&doc);
        doc.transact("Build room", |doc| {
            let a = doc.create_entity()?;
            let b = doc.create_entity()?;
            doc.add_brush(a, unit_cube())?;
            doc.add_brush(b, unit_cube())?;
            doc.set_property(a, K_CLASSNAME, "func_door")?;
            doc.set_property(a, "speed", "200")?;
            doc.remove_property(a, "speed")?;
            Ok(())
        })
        .unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_empty_transaction_publishes_nothing() {
        let mut doc = MapDocument::new();
        let counter = nodes_changed_counter(&doc);
        doc.begin_transaction("Nothing").unwrap();
        doc.commit_transaction().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert!(!doc.can_undo());
    }

    #[test]
    fn test_property_roundtrip_and_defaults() {
        let (mut doc, entity, _) = doc_with_cube();
        doc.transact("Set classname", |doc| {
            assert!(doc.set_property(entity, K_CLASSNAME, "func_door")?);
            assert!(!doc.set_property(entity, K_CLASSNAME, "func_plat")?);
            Ok(())
        })
        .unwrap();
        assert_eq!(doc.classname(entity).unwrap(), "func_plat");
        let attrs = doc.properties(entity).unwrap();
        assert_eq!(attrs.get_or("missing", "fallback"), "fallback");
    }

    #[test]
    fn test_classname_sentinel_without_property() {
        let (doc, entity, _) = doc_with_cube();
        assert_eq!(doc.classname(entity).unwrap(), crate::config::NO_CLASSNAME);
        assert!(!doc.classname(entity).unwrap().is_empty());
    }

    #[test]
    fn test_move_brush_between_entities() {
        let (mut doc, a, brush) = doc_with_cube();
        let b = doc
            .transact("Create target", |doc| doc.create_entity())
            .unwrap();

        doc.transact("Move brush", |doc| doc.attach_brush(b, brush))
            .unwrap();

        assert!(!doc.brushes_of(a).unwrap().contains(&brush));
        assert!(doc.brushes_of(b).unwrap().contains(&brush));
        assert_eq!(doc.node(brush).unwrap().as_brush().unwrap().owner(), Some(b));

        // Bounds recomputed on both sides: A falls back to its icon box,
        // B now spans the cube.
        let icon = Aabb::cube(Vec3::ZERO, ICON_HALF_EXTENT);
        assert_eq!(doc.bounds(a).unwrap(), icon);
        assert_eq!(doc.bounds(b).unwrap(), Aabb::cube(Vec3::ZERO, 0.5));
    }

    #[test]
    fn test_remove_brush_wrong_entity_fails_clean() {
        let (mut doc, _a, brush) = doc_with_cube();
        let b = doc
            .transact("Create other", |doc| doc.create_entity())
            .unwrap();
        let before = snapshot(&doc);
        doc.begin_transaction("Bad detach").unwrap();
        assert_eq!(
            doc.remove_brush(b, brush),
            Err(DocError::BrushNotOwned { brush, entity: b })
        );
        doc.rollback_transaction().unwrap();
        assert_eq!(snapshot(&doc), before);
    }

    #[test]
    fn test_pick_unit_cube_nearest_face() {
        let (doc, _entity, brush) = doc_with_cube();
        let ray = Ray::new(Vec3::new(0.0, 0.0, -5.0), Vec3::Z);
        let hits = doc.pick(&ray, &PickFilter::default());
        assert_eq!(hits.len(), 1);
        let hit = hits[0];
        assert_eq!(hit.node, brush);
        assert!((hit.t - 4.5).abs() < 1e-5);
        assert!(matches!(hit.kind, HitKind::Brush { .. }));
        assert!((hit.point - Vec3::new(0.0, 0.0, -0.5)).length() < 1e-5);

        // Ray missing the bounding box: empty result.
        let miss = Ray::new(Vec3::new(10.0, 0.0, -5.0), Vec3::Z);
        assert!(doc.pick(&miss, &PickFilter::default()).is_empty());
    }

    #[test]
    fn test_pick_brushless_entity_icon() {
        let mut doc = MapDocument::new();
        let entity = doc
            .transact("Create light", |doc| {
                let id = doc.create_entity()?;
                doc.set_property(id, K_CLASSNAME, "light")?;
                doc.set_property(id, "origin", "0 0 100")?;
                Ok(id)
            })
            .unwrap();
        let ray = Ray::new(Vec3::new(0.0, -50.0, 100.0), Vec3::Y);
        let hits = doc.pick(&ray, &PickFilter::default());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].node, entity);
        assert_eq!(hits[0].kind, HitKind::Entity);
        assert!((hits[0].t - (50.0 - ICON_HALF_EXTENT)).abs() < 1e-4);
    }

    #[test]
    fn test_pick_deterministic_tiebreak() {
        // Two coincident cubes under different entities: equal t, ordered
        // by node id, identical across repeated queries.
        let mut doc = MapDocument::new();
        let (b1, b2) = doc
            .transact("Two cubes", |doc| {
                let e1 = doc.create_entity()?;
                let e2 = doc.create_entity()?;
                let b1 = doc.add_brush(e1, unit_cube())?;
                let b2 = doc.add_brush(e2, unit_cube())?;
                Ok((b1, b2))
            })
            .unwrap();
        let ray = Ray::new(Vec3::new(0.0, 0.0, -5.0), Vec3::Z);
        let first = doc.pick(&ray, &PickFilter::default());
        let second = doc.pick(&ray, &PickFilter::default());
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].t, first[1].t);
        assert_eq!(first[0].node, b1.min(b2));
        assert_eq!(first[1].node, b1.max(b2));
    }

    #[test]
    fn test_pick_filters_hidden_and_locked() {
        let (mut doc, entity, brush) = doc_with_cube();
        let ray = Ray::new(Vec3::new(0.0, 0.0, -5.0), Vec3::Z);
        assert_eq!(doc.pick(&ray, &PickFilter::default()).len(), 1);

        // Hiding the owning entity hides the brush via inherited flags.
        doc.transact("Hide entity", |doc| {
            doc.set_flags(
                entity,
                NodeFlags {
                    hidden: true,
                    locked: false,
                },
            )
        })
        .unwrap();
        assert!(doc.pick(&ray, &PickFilter::default()).is_empty());
        let all = PickFilter {
            include_hidden: true,
            ..PickFilter::default()
        };
        assert_eq!(doc.pick(&ray, &all).len(), 1);

        // Locked brush is excluded by default too.
        doc.transact("Lock brush", |doc| {
            doc.set_flags(entity, NodeFlags::default())?;
            doc.set_flags(
                brush,
                NodeFlags {
                    hidden: false,
                    locked: true,
                },
            )
        })
        .unwrap();
        assert!(doc.pick(&ray, &PickFilter::default()).is_empty());
    }

    #[test]
    fn test_rollback_restores_state_exactly() {
        // N = 0, 1, and many interleaved mutations.
        let (mut doc, entity, brush) = doc_with_cube();
        doc.transact("Name it", |doc| {
            doc.set_property(entity, K_CLASSNAME, "worldspawn")?;
            doc.set_property(entity, "message", "hello")?;
            Ok(())
        })
        .unwrap();
        let before = snapshot(&doc);

        // N = 0
        doc.begin_transaction("Empty").unwrap();
        doc.rollback_transaction().unwrap();
        assert_eq!(snapshot(&doc), before);

        // N = 1
        doc.begin_transaction("One").unwrap();
        doc.set_property(entity, "message", "changed").unwrap();
        doc.rollback_transaction().unwrap();
        assert_eq!(snapshot(&doc), before);

        // Many: creates, deletes, property edits, reparents, selection.
        doc.begin_transaction("Many").unwrap();
        let e2 = doc.create_entity().unwrap();
        doc.set_property(e2, K_CLASSNAME, "func_wall").unwrap();
        doc.attach_brush(e2, brush).unwrap();
        doc.add_brush(e2, unit_cube()).unwrap();
        doc.remove_property(entity, "message").unwrap();
        doc.select(vec![e2]).unwrap();
        doc.remove_entity(e2).unwrap();
        let e3 = doc.create_entity().unwrap();
        doc.select(vec![e3]).unwrap();
        doc.rollback_transaction().unwrap();
        assert_eq!(snapshot(&doc), before);
    }

    #[test]
    fn test_rollback_publishes_nothing() {
        let (mut doc, entity, _) = doc_with_cube();
        let counter = nodes_changed_counter(&doc);
        doc.begin_transaction("Doomed").unwrap();
        doc.set_property(entity, "message", "x").unwrap();
        doc.select(vec![entity]).unwrap();
        doc.rollback_transaction().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert!(doc.bus().poll().iter().all(|e| {
            crate::core::downcast_event::<SelectionChanged>(e).is_none()
                && crate::core::downcast_event::<SelectionWillChange>(e).is_none()
        }));
    }

    #[test]
    fn test_transact_auto_rollback_on_failure() {
        let (mut doc, entity, brush) = doc_with_cube();
        let before = snapshot(&doc);
        let dead = NodeId::new(999, 0);
        let result = doc.transact("Partial failure", |doc| {
            doc.set_property(entity, "message", "half done")?;
            doc.attach_brush(dead, brush)?;
            Ok(())
        });
        assert_eq!(result, Err(DocError::NodeNotFound(dead)));
        assert_eq!(snapshot(&doc), before);
        assert!(!doc.transaction_open());
    }

    #[test]
    fn test_undo_redo_roundtrip() {
        let (mut doc, entity, brush) = doc_with_cube();
        let before = snapshot(&doc);
        doc.transact("Edit", |doc| {
            doc.set_property(entity, K_CLASSNAME, "func_door")?;
            doc.remove_brush(entity, brush)?;
            Ok(())
        })
        .unwrap();
        let after = snapshot(&doc);
        assert_ne!(before, after);

        assert_eq!(doc.undo_name(), Some("Edit"));
        doc.undo().unwrap();
        assert_eq!(snapshot(&doc), before);
        assert_eq!(doc.redo_name(), Some("Edit"));

        doc.redo().unwrap();
        assert_eq!(snapshot(&doc), after);

        doc.undo().unwrap();
        assert_eq!(snapshot(&doc), before);
        assert_eq!(doc.undo(), Err(DocError::NothingToUndo));
    }

    #[test]
    fn test_undo_publishes_batch_and_event() {
        let (mut doc, entity, _) = doc_with_cube();
        doc.transact("Edit", |doc| {
            doc.set_property(entity, "message", "x").map(|_| ())
        })
        .unwrap();
        let counter = nodes_changed_counter(&doc);
        let undone = Arc::new(AtomicUsize::new(0));
        let u = Arc::clone(&undone);
        doc.bus().subscribe::<TransactionUndone, _>(move |e| {
            assert_eq!(e.name, "Edit");
            u.fetch_add(1, Ordering::SeqCst);
        });
        doc.undo().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(undone.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_undo_blocked_while_transaction_open() {
        let (mut doc, entity, _) = doc_with_cube();
        doc.transact("Edit", |doc| {
            doc.set_property(entity, "message", "x").map(|_| ())
        })
        .unwrap();
        doc.begin_transaction("Open").unwrap();
        assert!(matches!(
            doc.undo(),
            Err(DocError::TransactionAlreadyOpen { .. })
        ));
        doc.rollback_transaction().unwrap();
        doc.undo().unwrap();
    }

    #[test]
    fn test_selection_events_on_commit_only() {
        let (mut doc, entity, brush) = doc_with_cube();
        let will = Arc::new(AtomicUsize::new(0));
        let did = Arc::new(AtomicUsize::new(0));
        let w = Arc::clone(&will);
        doc.bus().subscribe::<SelectionWillChange, _>(move |_| {
            w.fetch_add(1, Ordering::SeqCst);
        });
        let d = Arc::clone(&did);
        doc.bus().subscribe::<SelectionChanged, _>(move |e| {
            d.fetch_add(1, Ordering::SeqCst);
            assert_eq!(e.selected.len(), 2);
        });
        doc.begin_transaction("Select").unwrap();
        doc.select(vec![entity, brush]).unwrap();
        assert_eq!(will.load(Ordering::SeqCst), 0);
        doc.commit_transaction().unwrap();
        assert_eq!(will.load(Ordering::SeqCst), 1);
        assert_eq!(did.load(Ordering::SeqCst), 1);
        assert_eq!(doc.selection(), &[entity, brush]);
    }

    #[test]
    fn test_remove_entity_kills_ids_and_prunes_selection() {
        let (mut doc, entity, brush) = doc_with_cube();
        doc.transact("Select all", |doc| doc.select(vec![entity, brush]))
            .unwrap();
        doc.transact("Delete", |doc| doc.remove_entity(entity))
            .unwrap();
        assert!(!doc.contains(entity));
        assert!(!doc.contains(brush));
        assert!(doc.selection().is_empty());
        assert_eq!(
            doc.properties(entity).err(),
            Some(DocError::NodeNotFound(entity))
        );

        // Undo brings both nodes back under their original ids.
        doc.undo().unwrap();
        assert!(doc.contains(entity));
        assert!(doc.contains(brush));
        assert_eq!(doc.selection(), &[entity, brush]);
    }

    #[test]
    fn test_bounds_lazy_recompute_on_origin_change() {
        let mut doc = MapDocument::new();
        let entity = doc
            .transact("Create light", |doc| {
                let id = doc.create_entity()?;
                doc.set_property(id, "origin", "0 0 0")?;
                Ok(id)
            })
            .unwrap();
        assert_eq!(doc.bounds(entity).unwrap().center(), Vec3::ZERO);
        doc.transact("Move", |doc| {
            doc.set_property(entity, "origin", "32 0 0").map(|_| ())
        })
        .unwrap();
        assert_eq!(doc.bounds(entity).unwrap().center(), Vec3::new(32.0, 0.0, 0.0));
    }

    #[test]
    fn test_each_brush_with_predicate() {
        let (mut doc, entity, _brush) = doc_with_cube();
        doc.transact("Second cube", |doc| {
            doc.add_brush(entity, Brush::cuboid(Aabb::cube(Vec3::new(10.0, 0.0, 0.0), 0.5), "base/wood"))
                .map(|_| ())
        })
        .unwrap();
        assert_eq!(doc.each_brush().count(), 2);
        let wooden: Vec<NodeId> = doc
            .each_brush()
            .filter(|(_, b)| b.faces().iter().any(|f| f.texture == "base/wood"))
            .map(|(id, _)| id)
            .collect();
        assert_eq!(wooden.len(), 1);
        assert_eq!(doc.each_brush_of(entity).unwrap().count(), 2);
    }

    #[test]
    fn test_mark_loaded_clears_history() {
        let (mut doc, entity, _) = doc_with_cube();
        doc.transact("Edit", |doc| {
            doc.set_property(entity, "message", "x").map(|_| ())
        })
        .unwrap();
        assert!(doc.can_undo());
        let loaded = Arc::new(AtomicUsize::new(0));
        let l = Arc::clone(&loaded);
        doc.bus().subscribe::<DocumentLoaded, _>(move |_| {
            l.fetch_add(1, Ordering::SeqCst);
        });
        doc.mark_loaded();
        assert!(!doc.can_undo());
        assert!(!doc.can_redo());
        assert_eq!(loaded.load(Ordering::SeqCst), 1);
    }
}
