//! The closed set of tree edit operations.

use std::fmt;

use serde::{Deserialize, Serialize};

use arbor_types::ContentHash;

use crate::node::NodeId;

/// A concrete edit of the model tree.
///
/// The set is closed and matched exhaustively everywhere, so adding an
/// operation kind is a compile-time-checked change across the codebase.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Create an empty node with the given id as a child of `parent`.
    /// `index` is clamped to the parent's child count.
    AddNode {
        id: NodeId,
        parent: NodeId,
        index: usize,
    },
    /// Remove the node and its whole subtree.
    DeleteNode { id: NodeId },
    /// Re-parent the node (or re-order it under the same parent).
    /// `index` is clamped to the target's child count.
    MoveNode {
        id: NodeId,
        parent: NodeId,
        index: usize,
    },
    /// Set or clear (`value: None`) a named property.
    SetProperty {
        id: NodeId,
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },
    /// Set or clear (`target: None`) a named non-containment reference.
    /// Targets are not validated; a reference may dangle.
    SetReference {
        id: NodeId,
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<NodeId>,
    },
    /// Revert the effect of the named version's operations. Stored in
    /// version logs as-is; expanded into concrete inverse operations
    /// before any tree apply.
    Undo { version: ContentHash },
}

impl Operation {
    /// The node id this operation primarily targets, if any.
    pub fn target_node(&self) -> Option<NodeId> {
        match self {
            Operation::AddNode { id, .. }
            | Operation::DeleteNode { id }
            | Operation::MoveNode { id, .. }
            | Operation::SetProperty { id, .. }
            | Operation::SetReference { id, .. } => Some(*id),
            Operation::Undo { .. } => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::AddNode { id, parent, index } => {
                write!(f, "add {id} under {parent}@{index}")
            }
            Operation::DeleteNode { id } => write!(f, "delete {id}"),
            Operation::MoveNode { id, parent, index } => {
                write!(f, "move {id} under {parent}@{index}")
            }
            Operation::SetProperty { id, key, value } => match value {
                Some(v) => write!(f, "set {id}.{key}={v:?}"),
                None => write!(f, "clear {id}.{key}"),
            },
            Operation::SetReference { id, key, target } => match target {
                Some(t) => write!(f, "ref {id}.{key}->{t}"),
                None => write!(f, "unref {id}.{key}"),
            },
            Operation::Undo { version } => write!(f, "undo {}", version.short_hex()),
        }
    }
}
