//! mapdoc - editable map document core for a 3D level editor
//!
//! Scene graph of entities and brushes, per-entity property store, ray
//! picking, and a transactional mutation layer with undo/redo and a typed
//! event bus. Rendering, widgets and persistence are collaborators that
//! consume the query/mutation/subscription interfaces re-exported here.

// Infrastructure (event bus, event payloads)
pub mod core;

// Document model
pub mod config;
pub mod document;
pub mod error;
pub mod geom;

// Re-export commonly used types from core
pub use crate::core::event_bus::{BoxedEvent, Event, EventBus, SubscriptionId, downcast_event};
pub use crate::core::events::{
    DocumentCreated, DocumentLoaded, NodesChanged, SelectionChanged, SelectionWillChange,
    TransactionRedone, TransactionUndone,
};

// Re-export the document model
pub use document::{
    Attrs, Brush, Entity, Face, Hit, HitKind, MapDocument, Node, NodeFlags, NodeId, NodeKind,
    PickFilter,
};
pub use error::{DocError, DocResult};
pub use geom::{Aabb, Plane, Ray};
