//! Transactions: named, atomic, reversible groups of document mutations.
//!
//! Every mutating document operation appends one `Mutation` record to the
//! open transaction. Records carry the before-state needed to reverse the
//! step exactly, so rollback and undo are reverse replays and redo is a
//! forward replay. The changed-node set for the commit notification is
//! derived from the records, not tracked separately.

use super::node::{Node, NodeFlags, NodeId};

/// One reversible mutation step, with enough before-state to undo it.
#[derive(Debug, Clone)]
pub enum Mutation {
    /// A fresh, empty entity was allocated.
    EntityCreated { id: NodeId },

    /// An entity and its owned brushes were removed. Snapshots restore the
    /// exact nodes (brushes before the entity, since the entity's brush
    /// list references them).
    EntityRemoved {
        id: NodeId,
        node: Node,
        brushes: Vec<(NodeId, Node)>,
    },

    /// A new brush node was created and attached to `entity`. The snapshot
    /// is the brush node as created (owner already set) for redo.
    BrushAdded {
        entity: NodeId,
        brush: NodeId,
        node: Node,
    },

    /// An existing brush was reparented to `new_owner`. `old_owner` and the
    /// brush's index in its old list restore the previous ownership.
    BrushAttached {
        brush: NodeId,
        new_owner: NodeId,
        old_owner: Option<NodeId>,
        old_index: Option<usize>,
    },

    /// A brush was detached from `entity` (it stays in the arena, unowned).
    BrushDetached {
        brush: NodeId,
        entity: NodeId,
        index: usize,
    },

    /// A property was set. `prior` is the overwritten value, `None` when the
    /// key was newly created.
    PropertySet {
        entity: NodeId,
        key: String,
        value: String,
        prior: Option<String>,
    },

    /// A property was removed; `prior_index` restores its display position.
    PropertyRemoved {
        entity: NodeId,
        key: String,
        prior_value: String,
        prior_index: usize,
    },

    /// Visibility/lock flags changed on one node.
    FlagsChanged {
        id: NodeId,
        prior: NodeFlags,
        next: NodeFlags,
    },

    /// The selection set was replaced.
    SelectionReplaced {
        prior: Vec<NodeId>,
        next: Vec<NodeId>,
    },
}

impl Mutation {
    /// Node ids this step touched, including both ends of any ownership
    /// change. The tree is two levels deep (document -> entity -> brush),
    /// so touched entities already are the ancestor chain of their brushes.
    pub fn touched(&self) -> Vec<NodeId> {
        match self {
            Mutation::EntityCreated { id } => vec![*id],
            Mutation::EntityRemoved { id, brushes, .. } => {
                let mut ids = vec![*id];
                ids.extend(brushes.iter().map(|(bid, _)| *bid));
                ids
            }
            Mutation::BrushAdded { entity, brush, .. } => vec![*entity, *brush],
            Mutation::BrushAttached {
                brush,
                new_owner,
                old_owner,
                ..
            } => {
                let mut ids = vec![*brush, *new_owner];
                if let Some(old) = old_owner {
                    ids.push(*old);
                }
                ids
            }
            Mutation::BrushDetached { brush, entity, .. } => vec![*brush, *entity],
            Mutation::PropertySet { entity, .. } => vec![*entity],
            Mutation::PropertyRemoved { entity, .. } => vec![*entity],
            Mutation::FlagsChanged { id, .. } => vec![*id],
            Mutation::SelectionReplaced { .. } => Vec::new(),
        }
    }
}

/// A named group of mutations, open until committed or rolled back.
#[derive(Debug, Clone)]
pub struct Transaction {
    name: String,
    log: Vec<Mutation>,
}

impl Transaction {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            log: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn log(&self) -> &[Mutation] {
        &self.log
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    pub(crate) fn record(&mut self, mutation: Mutation) {
        self.log.push(mutation);
    }

    /// Net set of changed nodes: union of all touched ids, deduplicated and
    /// sorted ascending. Selection-only transactions yield an empty set.
    pub fn changed_nodes(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.log.iter().flat_map(Mutation::touched).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Whether any step replaced the selection.
    pub fn selection_changed(&self) -> bool {
        self.log
            .iter()
            .any(|m| matches!(m, Mutation::SelectionReplaced { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_changed_nodes_dedup_sorted() {
        let e = NodeId::new(0, 0);
        let b = NodeId::new(1, 0);
        let mut txn = Transaction::new("test");
        txn.record(Mutation::PropertySet {
            entity: e,
            key: "classname".into(),
            value: "func_door".into(),
            prior: None,
        });
        txn.record(Mutation::BrushDetached {
            brush: b,
            entity: e,
            index: 0,
        });
        txn.record(Mutation::PropertySet {
            entity: e,
            key: "speed".into(),
            value: "200".into(),
            prior: None,
        });
        assert_eq!(txn.changed_nodes(), vec![e, b]);
        assert!(!txn.selection_changed());
    }

    #[test]
    fn test_selection_only_changes_no_nodes() {
        let mut txn = Transaction::new("select");
        txn.record(Mutation::SelectionReplaced {
            prior: vec![],
            next: vec![NodeId::new(3, 0)],
        });
        assert!(txn.changed_nodes().is_empty());
        assert!(txn.selection_changed());
    }
}
