//! Error types for merging.

use thiserror::Error;

use arbor_dag::DagError;
use arbor_model::{ModelError, Operation};
use arbor_types::ContentHash;

/// Errors produced by [`VersionMerger::merge_change`].
///
/// A merge never returns a partially applied result: any of these aborts
/// the whole call, leaving both input versions untouched.
///
/// [`VersionMerger::merge_change`]: crate::merger::VersionMerger::merge_change
#[derive(Debug, Error)]
pub enum MergeError {
    /// Loading or walking the version graph failed.
    #[error(transparent)]
    Dag(#[from] DagError),

    /// The two versions have disjoint histories.
    #[error("versions {left} and {right} share no common ancestor")]
    NoCommonAncestor { left: ContentHash, right: ContentHash },

    /// A specific operation failed during intent capture or replay.
    #[error("operation `{op}` failed during {phase}: {source}")]
    OperationFailed {
        op: Operation,
        phase: &'static str,
        #[source]
        source: ModelError,
    },
}

/// Result alias for merge operations.
pub type MergeResult<T> = Result<T, MergeError>;
