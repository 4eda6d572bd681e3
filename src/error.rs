//! Document error taxonomy.
//!
//! Usage errors (mutating without a transaction, double-begin, detaching a
//! brush from the wrong entity) are rejected before any state changes.
//! Query-time absence (missing key, empty pick) is never an error.

use thiserror::Error;

use crate::document::node::NodeId;

pub type DocResult<T> = Result<T, DocError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocError {
    /// A mutating call arrived with no open transaction.
    #[error("no open transaction; mutations must run inside begin_transaction/commit")]
    NoTransaction,

    /// `begin_transaction` while another transaction is open. The open one
    /// is left untouched.
    #[error("transaction already open: {name}")]
    TransactionAlreadyOpen { name: String },

    /// Node id is stale (generation mismatch) or was never allocated.
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("node {0} is not an entity")]
    NotAnEntity(NodeId),

    #[error("node {0} is not a brush")]
    NotABrush(NodeId),

    /// `remove_brush` on an entity that does not own the brush.
    #[error("brush {brush} is not owned by entity {entity}")]
    BrushNotOwned { brush: NodeId, entity: NodeId },

    #[error("nothing to undo")]
    NothingToUndo,

    #[error("nothing to redo")]
    NothingToRedo,
}
