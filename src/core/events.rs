//! Concrete event payloads published on the document bus.
//!
//! Each type is one channel: subscribers pick the channels they care about
//! by type. Emitted by MapDocument; handled by collaborators (property grid,
//! viewport, outliner) to trigger side effects.

use crate::document::node::NodeId;

/// A fresh, empty document was created.
#[derive(Debug, Clone)]
pub struct DocumentCreated;

/// Document content was replaced wholesale (e.g. after a load). Subscribers
/// should drop caches and rebuild from scratch.
#[derive(Debug, Clone)]
pub struct DocumentLoaded;

/// Net set of nodes touched by one committed transaction (touched nodes plus
/// their owner chain, deduplicated, sorted by id). Exactly one per commit.
#[derive(Debug, Clone)]
pub struct NodesChanged {
    pub nodes: Vec<NodeId>,
}

/// Selection is about to be replaced. Fired before the new selection is
/// visible, so observers can capture the outgoing state.
#[derive(Debug, Clone)]
pub struct SelectionWillChange;

/// Selection was replaced; carries the full new selection.
#[derive(Debug, Clone)]
pub struct SelectionChanged {
    pub selected: Vec<NodeId>,
}

/// A committed transaction was reverted via undo.
#[derive(Debug, Clone)]
pub struct TransactionUndone {
    pub name: String,
}

/// An undone transaction was re-applied via redo.
#[derive(Debug, Clone)]
pub struct TransactionRedone {
    pub name: String,
}
