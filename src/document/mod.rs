//! The document model: nodes, properties, picking, transactions.

pub mod attrs;
pub mod brush;
pub mod entity;
pub mod keys;
pub mod map;
pub mod node;
pub mod pick;
pub mod transaction;

pub use attrs::Attrs;
pub use brush::{Brush, Face};
pub use entity::Entity;
pub use map::MapDocument;
pub use node::{Node, NodeFlags, NodeId, NodeKind};
pub use pick::{Hit, HitKind, PickFilter};
pub use transaction::{Mutation, Transaction};
