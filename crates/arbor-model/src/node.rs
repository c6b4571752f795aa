//! Model node payloads and their trie keys.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Identifier of a node in the model tree.
pub type NodeId = u64;

/// The id of the root node. It exists in every model tree and is never
/// deleted or moved.
pub const ROOT_NODE: NodeId = 1;

/// The trie key of a node id: fixed-width hex, so keys of equal length
/// sort in id order and never prefix one another.
pub fn node_key(id: NodeId) -> String {
    format!("{id:016x}")
}

/// One node of the model tree, as stored in the trie.
///
/// Containment is bidirectional: a node names its `parent` and the parent
/// lists the node in `children`, in sibling order. `references` are
/// non-containment links and may dangle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelNode {
    pub id: NodeId,
    /// Absent only on the root node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<NodeId>,
    /// Child ids in sibling order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeId>,
    /// Named string properties. BTreeMap keeps serialization deterministic.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
    /// Named non-containment references to other node ids.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub references: BTreeMap<String, NodeId>,
}

impl ModelNode {
    /// An empty node under `parent`.
    pub fn new(id: NodeId, parent: Option<NodeId>) -> Self {
        Self {
            id,
            parent,
            children: Vec::new(),
            properties: BTreeMap::new(),
            references: BTreeMap::new(),
        }
    }

    /// The root node of a fresh tree.
    pub fn root() -> Self {
        Self::new(ROOT_NODE, None)
    }
}
