//! Error types for model tree operations.

use thiserror::Error;

use arbor_trie::TrieError;
use arbor_types::ContentHash;

use crate::node::NodeId;

/// Errors produced while reading or editing a model tree.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The underlying trie or object graph failed.
    #[error(transparent)]
    Trie(#[from] TrieError),

    /// An add targeted a node id that already exists.
    #[error("node {0} already exists")]
    DuplicateNode(NodeId),

    /// The operation referenced a node id not present in the tree.
    #[error("node {0} not found")]
    MissingNode(NodeId),

    /// The root node cannot be deleted or moved.
    #[error("node {0} is the root and cannot be {1}")]
    RootImmutable(NodeId, &'static str),

    /// Moving a node under itself or one of its descendants.
    #[error("moving node {id} under {parent} would create a cycle")]
    CycleMove { id: NodeId, parent: NodeId },

    /// An undo operation reached apply without being expanded into the
    /// concrete inverse operations it stands for.
    #[error("undo of version {0} must be expanded before apply")]
    UnexpandedUndo(ContentHash),

    /// A stored node payload failed to decode.
    #[error("node {id} payload is corrupt: {reason}")]
    CorruptNode { id: NodeId, reason: String },
}

/// Result alias for model operations.
pub type ModelResult<T> = Result<T, ModelError>;
