//! Error types for version graph operations.

use thiserror::Error;

use arbor_model::ModelError;
use arbor_store::StoreError;
use arbor_types::ContentHash;

/// Errors produced while building, loading, or walking versions.
#[derive(Debug, Error)]
pub enum DagError {
    /// The object graph or backing store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A tree edit in a version's operation log failed to apply.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// An undo targeted a version that is not an ancestor of the version
    /// carrying the undo, so its base tree cannot be reconstructed.
    #[error("undo target {0} is not reachable")]
    UndoTargetUnreachable(ContentHash),

    /// A model tree snapshot had no trie root. Every snapshot contains at
    /// least the model root node, so this indicates graph corruption.
    #[error("version tree has no root node")]
    EmptyTree,
}

/// Result alias for version graph operations.
pub type DagResult<T> = Result<T, DagError>;
