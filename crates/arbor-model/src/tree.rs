//! An immutable model tree snapshot backed by the patricia trie.

use std::sync::Arc;

use tracing::trace;

use arbor_store::ObjectGraph;
use arbor_trie::PatriciaTrie;
use arbor_types::ContentHash;

use crate::error::{ModelError, ModelResult};
use crate::node::{node_key, ModelNode, NodeId, ROOT_NODE};
use crate::ops::Operation;

/// One snapshot of the model tree.
///
/// Every edit returns a new snapshot; the input is never touched, and the
/// two share all unmodified trie subtrees through the object graph.
#[derive(Clone, Debug)]
pub struct ModelTree {
    trie: PatriciaTrie,
}

impl ModelTree {
    /// A fresh tree containing only the root node.
    pub fn empty(graph: Arc<ObjectGraph>) -> ModelResult<Self> {
        let trie = PatriciaTrie::empty(graph);
        Self { trie }.with_node(ModelNode::root())
    }

    /// A tree over an existing trie snapshot (e.g. loaded from a version).
    pub fn from_trie(trie: PatriciaTrie) -> Self {
        Self { trie }
    }

    /// The backing trie snapshot.
    pub fn trie(&self) -> &PatriciaTrie {
        &self.trie
    }

    /// The snapshot's content hash. Equal hash implies equal tree content.
    pub fn root_hash(&self) -> Option<ContentHash> {
        self.trie.root_hash()
    }

    /// Persist the snapshot through the object graph.
    pub fn persist(&self) -> ModelResult<()> {
        Ok(self.trie.persist()?)
    }

    /// Look up a node by id.
    pub fn node(&self, id: NodeId) -> ModelResult<Option<ModelNode>> {
        match self.trie.get(&node_key(id))? {
            None => Ok(None),
            Some(text) => serde_json::from_str(&text)
                .map(Some)
                .map_err(|e| ModelError::CorruptNode { id, reason: e.to_string() }),
        }
    }

    /// Returns `true` if the node exists.
    pub fn contains(&self, id: NodeId) -> ModelResult<bool> {
        Ok(self.trie.get(&node_key(id))?.is_some())
    }

    fn require(&self, id: NodeId) -> ModelResult<ModelNode> {
        self.node(id)?.ok_or(ModelError::MissingNode(id))
    }

    /// All nodes, in id order.
    pub fn all_nodes(&self) -> ModelResult<Vec<ModelNode>> {
        let mut out = Vec::new();
        for (key, text) in self.trie.entries()? {
            let id = NodeId::from_str_radix(&key, 16).unwrap_or_default();
            let node = serde_json::from_str(&text)
                .map_err(|e| ModelError::CorruptNode { id, reason: e.to_string() })?;
            out.push(node);
        }
        Ok(out)
    }

    /// The ids of `id` and all its descendants, preorder.
    pub fn subtree_ids(&self, id: NodeId) -> ModelResult<Vec<NodeId>> {
        Ok(self.subtree_nodes(id)?.into_iter().map(|n| n.id).collect())
    }

    /// `id`'s node and all its descendants, preorder (parents before
    /// children, siblings in order).
    pub fn subtree_nodes(&self, id: NodeId) -> ModelResult<Vec<ModelNode>> {
        let mut out = Vec::new();
        let mut stack = vec![self.require(id)?];
        while let Some(node) = stack.pop() {
            let children = node.children.clone();
            out.push(node);
            for &child in children.iter().rev() {
                stack.push(self.require(child)?);
            }
        }
        Ok(out)
    }

    /// Apply one operation, returning the resulting snapshot.
    ///
    /// Rejections leave `self` untouched: duplicate add id, missing nodes
    /// or parents, deleting or moving the root, moving a node under its
    /// own subtree, and unexpanded [`Operation::Undo`]. Child indices are
    /// clamped to the child count rather than rejected.
    pub fn apply(&self, op: &Operation) -> ModelResult<Self> {
        trace!(%op, "apply");
        match op {
            Operation::AddNode { id, parent, index } => self.add_node(*id, *parent, *index),
            Operation::DeleteNode { id } => self.delete_node(*id),
            Operation::MoveNode { id, parent, index } => self.move_node(*id, *parent, *index),
            Operation::SetProperty { id, key, value } => {
                let mut node = self.require(*id)?;
                match value {
                    Some(v) => node.properties.insert(key.clone(), v.clone()),
                    None => node.properties.remove(key),
                };
                self.with_node(node)
            }
            Operation::SetReference { id, key, target } => {
                let mut node = self.require(*id)?;
                match target {
                    Some(t) => node.references.insert(key.clone(), *t),
                    None => node.references.remove(key),
                };
                self.with_node(node)
            }
            Operation::Undo { version } => Err(ModelError::UnexpandedUndo(*version)),
        }
    }

    /// Apply a sequence of operations left to right.
    pub fn apply_all(&self, ops: &[Operation]) -> ModelResult<Self> {
        let mut tree = self.clone();
        for op in ops {
            tree = tree.apply(op)?;
        }
        Ok(tree)
    }

    fn add_node(&self, id: NodeId, parent: NodeId, index: usize) -> ModelResult<Self> {
        if self.contains(id)? {
            return Err(ModelError::DuplicateNode(id));
        }
        let mut parent_node = self.require(parent)?;
        let at = index.min(parent_node.children.len());
        parent_node.children.insert(at, id);
        self.with_node(parent_node)?
            .with_node(ModelNode::new(id, Some(parent)))
    }

    fn delete_node(&self, id: NodeId) -> ModelResult<Self> {
        if id == ROOT_NODE {
            return Err(ModelError::RootImmutable(id, "deleted"));
        }
        let node = self.require(id)?;
        let parent_id = node.parent.ok_or(ModelError::CorruptNode {
            id,
            reason: "non-root node without parent".into(),
        })?;
        let mut parent_node = self.require(parent_id)?;
        parent_node.children.retain(|&c| c != id);
        let mut tree = self.with_node(parent_node)?;
        for gone in self.subtree_ids(id)? {
            tree = Self::from_trie(tree.trie.remove(&node_key(gone))?);
        }
        Ok(tree)
    }

    fn move_node(&self, id: NodeId, parent: NodeId, index: usize) -> ModelResult<Self> {
        if id == ROOT_NODE {
            return Err(ModelError::RootImmutable(id, "moved"));
        }
        let mut node = self.require(id)?;
        let old_parent_id = node.parent.ok_or(ModelError::CorruptNode {
            id,
            reason: "non-root node without parent".into(),
        })?;
        // Walking ancestor links from the target parent must not pass
        // through the moved node.
        let mut cursor = Some(parent);
        while let Some(p) = cursor {
            if p == id {
                return Err(ModelError::CycleMove { id, parent });
            }
            cursor = self.require(p)?.parent;
        }

        let mut old_parent = self.require(old_parent_id)?;
        old_parent.children.retain(|&c| c != id);
        let mut new_parent = if parent == old_parent_id {
            old_parent.clone()
        } else {
            self.require(parent)?
        };
        let at = index.min(new_parent.children.len());
        new_parent.children.insert(at, id);
        node.parent = Some(parent);

        let mut tree = self.clone();
        if parent != old_parent_id {
            tree = tree.with_node(old_parent)?;
        }
        tree.with_node(new_parent)?.with_node(node)
    }

    /// Store a node payload, returning the new snapshot.
    pub(crate) fn with_node(&self, node: ModelNode) -> ModelResult<Self> {
        let key = node_key(node.id);
        let text = serde_json::to_string(&node).map_err(|e| ModelError::CorruptNode {
            id: node.id,
            reason: e.to_string(),
        })?;
        Ok(Self::from_trie(self.trie.put(&key, text)?))
    }
}
