//! Operation intents: edits re-expressed independent of positions that
//! concurrent edits could invalidate.
//!
//! Sibling positions are captured as an *anchor*, the id of the preceding
//! sibling at capture time (`None` means first position). At replay the
//! anchor is looked up in the tree as it currently stands; a vanished
//! anchor degrades to appending at the end, and edits targeting vanished
//! nodes resolve to zero operations, so a concurrent deletion wins.

use std::sync::Arc;

use tracing::trace;

use arbor_dag::{expand_ops, Version};
use arbor_model::{ModelError, ModelTree, NodeId, Operation};
use arbor_store::ObjectGraph;

use crate::error::{MergeError, MergeResult};

/// One position-independent edit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Intent {
    /// Insert the node with `id` under `parent`, after `anchor`.
    AddNode {
        id: NodeId,
        parent: NodeId,
        anchor: Option<NodeId>,
    },
    /// Remove the node and its subtree.
    DeleteNode { id: NodeId },
    /// Re-parent the node under `parent`, after `anchor`.
    MoveNode {
        id: NodeId,
        parent: NodeId,
        anchor: Option<NodeId>,
    },
    SetProperty {
        id: NodeId,
        key: String,
        value: Option<String>,
    },
    SetReference {
        id: NodeId,
        key: String,
        target: Option<NodeId>,
    },
}

impl Intent {
    /// Re-express `op` against the tree state it was applied to.
    pub fn capture(before: &ModelTree, op: &Operation) -> MergeResult<Self> {
        let intent = match op {
            Operation::AddNode { id, parent, index } => Intent::AddNode {
                id: *id,
                parent: *parent,
                anchor: anchor_at(before, *parent, *index, None)?,
            },
            Operation::DeleteNode { id } => Intent::DeleteNode { id: *id },
            Operation::MoveNode { id, parent, index } => Intent::MoveNode {
                id: *id,
                parent: *parent,
                // The moved node may already sit under the target parent;
                // the anchor is taken with it removed.
                anchor: anchor_at(before, *parent, *index, Some(*id))?,
            },
            Operation::SetProperty { id, key, value } => Intent::SetProperty {
                id: *id,
                key: key.clone(),
                value: value.clone(),
            },
            Operation::SetReference { id, key, target } => Intent::SetReference {
                id: *id,
                key: key.clone(),
                target: *target,
            },
            Operation::Undo { version } => {
                return Err(MergeError::OperationFailed {
                    op: op.clone(),
                    phase: "capture",
                    source: ModelError::UnexpandedUndo(*version),
                })
            }
        };
        Ok(intent)
    }

    /// Resolve this intent against the tree as it currently stands,
    /// yielding the concrete operations to apply now. Zero operations
    /// means the intent no longer applies (its target or destination was
    /// concurrently removed, or its effect is already present).
    pub fn resolve(&self, tree: &ModelTree) -> MergeResult<Vec<Operation>> {
        let ops = match self {
            Intent::AddNode { id, parent, anchor } => {
                if tree.contains(*id).map_err(|e| self.failed(e))? {
                    // Already present: both sides reflect the same add.
                    Vec::new()
                } else if !tree.contains(*parent).map_err(|e| self.failed(e))? {
                    Vec::new()
                } else {
                    vec![Operation::AddNode {
                        id: *id,
                        parent: *parent,
                        index: resolve_anchor(tree, *parent, *anchor).map_err(|e| self.failed(e))?,
                    }]
                }
            }
            Intent::DeleteNode { id } => {
                if tree.contains(*id).map_err(|e| self.failed(e))? {
                    vec![Operation::DeleteNode { id: *id }]
                } else {
                    Vec::new()
                }
            }
            Intent::MoveNode { id, parent, anchor } => {
                let target_exists = tree.contains(*parent).map_err(|e| self.failed(e))?;
                if !tree.contains(*id).map_err(|e| self.failed(e))?
                    || !target_exists
                    || creates_cycle(tree, *id, *parent).map_err(|e| self.failed(e))?
                {
                    Vec::new()
                } else {
                    vec![Operation::MoveNode {
                        id: *id,
                        parent: *parent,
                        index: resolve_anchor(tree, *parent, *anchor).map_err(|e| self.failed(e))?,
                    }]
                }
            }
            Intent::SetProperty { id, key, value } => {
                if tree.contains(*id).map_err(|e| self.failed(e))? {
                    vec![Operation::SetProperty {
                        id: *id,
                        key: key.clone(),
                        value: value.clone(),
                    }]
                } else {
                    Vec::new()
                }
            }
            Intent::SetReference { id, key, target } => {
                if tree.contains(*id).map_err(|e| self.failed(e))? {
                    vec![Operation::SetReference {
                        id: *id,
                        key: key.clone(),
                        target: *target,
                    }]
                } else {
                    Vec::new()
                }
            }
        };
        Ok(ops)
    }

    fn failed(&self, source: ModelError) -> MergeError {
        MergeError::OperationFailed {
            op: self.nearest_op(),
            phase: "replay",
            source,
        }
    }

    /// The concrete operation shape this intent corresponds to, used for
    /// error reporting (anchors stand in for indices).
    fn nearest_op(&self) -> Operation {
        match self {
            Intent::AddNode { id, parent, .. } => Operation::AddNode {
                id: *id,
                parent: *parent,
                index: 0,
            },
            Intent::DeleteNode { id } => Operation::DeleteNode { id: *id },
            Intent::MoveNode { id, parent, .. } => Operation::MoveNode {
                id: *id,
                parent: *parent,
                index: 0,
            },
            Intent::SetProperty { id, key, value } => Operation::SetProperty {
                id: *id,
                key: key.clone(),
                value: value.clone(),
            },
            Intent::SetReference { id, key, target } => Operation::SetReference {
                id: *id,
                key: key.clone(),
                target: *target,
            },
        }
    }
}

/// The intents of one version's operations, captured against that
/// version's own base tree. Undo operations are expanded to concrete
/// inverses first, so capture never sees one.
pub fn capture_intents(
    graph: &Arc<ObjectGraph>,
    version: &Arc<Version>,
) -> MergeResult<Vec<Intent>> {
    let Some(base) = version.base() else {
        return Ok(Vec::new());
    };
    let mut tree = graph
        .resolve(base)
        .map_err(|e| MergeError::Dag(arbor_dag::DagError::Store(e)))?
        .tree(graph);
    let concrete = expand_ops(graph, version.ops())?;
    let mut intents = Vec::with_capacity(concrete.len());
    for op in &concrete {
        intents.push(Intent::capture(&tree, op)?);
        tree = tree.apply(op).map_err(|e| MergeError::OperationFailed {
            op: op.clone(),
            phase: "capture",
            source: e,
        })?;
    }
    trace!(intents = intents.len(), "captured");
    Ok(intents)
}

/// The id of the child preceding position `index` under `parent`, with
/// `exclude` (the node being moved) removed from the sibling list first.
fn anchor_at(
    tree: &ModelTree,
    parent: NodeId,
    index: usize,
    exclude: Option<NodeId>,
) -> MergeResult<Option<NodeId>> {
    let node = tree
        .node(parent)
        .map_err(model_err)?
        .ok_or_else(|| model_err(ModelError::MissingNode(parent)))?;
    let siblings: Vec<NodeId> = node
        .children
        .iter()
        .copied()
        .filter(|&c| Some(c) != exclude)
        .collect();
    let at = index.min(siblings.len());
    Ok(if at == 0 { None } else { Some(siblings[at - 1]) })
}

/// The insertion index under `parent` that places a node right after
/// `anchor`. `None` means first position; a vanished anchor appends at
/// the end.
fn resolve_anchor(
    tree: &ModelTree,
    parent: NodeId,
    anchor: Option<NodeId>,
) -> Result<usize, ModelError> {
    let node = tree.node(parent)?.ok_or(ModelError::MissingNode(parent))?;
    Ok(match anchor {
        None => 0,
        Some(a) => match node.children.iter().position(|&c| c == a) {
            Some(i) => i + 1,
            None => node.children.len(),
        },
    })
}

/// Returns `true` if re-parenting `id` under `parent` would place it
/// inside its own subtree in the current tree.
fn creates_cycle(tree: &ModelTree, id: NodeId, parent: NodeId) -> Result<bool, ModelError> {
    let mut cursor = Some(parent);
    while let Some(p) = cursor {
        if p == id {
            return Ok(true);
        }
        cursor = tree.node(p)?.ok_or(ModelError::MissingNode(p))?.parent;
    }
    Ok(false)
}

fn model_err(source: ModelError) -> MergeError {
    MergeError::Dag(arbor_dag::DagError::Model(source))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_dag::Version;
    use arbor_model::ROOT_NODE;
    use arbor_store::InMemoryStore;

    fn test_graph() -> Arc<ObjectGraph> {
        ObjectGraph::new(Arc::new(InMemoryStore::new()))
    }

    fn add(id: u64, parent: u64, index: usize) -> Operation {
        Operation::AddNode { id, parent, index }
    }

    fn tree_with(graph: &Arc<ObjectGraph>, ops: &[Operation]) -> ModelTree {
        ModelTree::empty(graph.clone()).unwrap().apply_all(ops).unwrap()
    }

    // -----------------------------------------------------------------------
    // Capture
    // -----------------------------------------------------------------------

    #[test]
    fn add_at_front_captures_no_anchor() {
        let graph = test_graph();
        let tree = tree_with(&graph, &[add(2, ROOT_NODE, 0)]);
        let intent = Intent::capture(&tree, &add(3, ROOT_NODE, 0)).unwrap();
        assert_eq!(intent, Intent::AddNode { id: 3, parent: ROOT_NODE, anchor: None });
    }

    #[test]
    fn add_after_a_sibling_captures_that_sibling_as_anchor() {
        let graph = test_graph();
        let tree = tree_with(&graph, &[add(2, ROOT_NODE, 0), add(3, ROOT_NODE, 1)]);
        let intent = Intent::capture(&tree, &add(4, ROOT_NODE, 1)).unwrap();
        assert_eq!(intent, Intent::AddNode { id: 4, parent: ROOT_NODE, anchor: Some(2) });
    }

    #[test]
    fn move_anchor_excludes_the_moved_node() {
        let graph = test_graph();
        let tree = tree_with(&graph, &[add(2, ROOT_NODE, 0), add(3, ROOT_NODE, 1)]);
        // Moving 2 to index 1 among [3] (2 removed) puts it after 3.
        let intent = Intent::capture(
            &tree,
            &Operation::MoveNode { id: 2, parent: ROOT_NODE, index: 1 },
        )
        .unwrap();
        assert_eq!(intent, Intent::MoveNode { id: 2, parent: ROOT_NODE, anchor: Some(3) });
    }

    #[test]
    fn capture_of_each_version_uses_its_own_base() {
        let graph = test_graph();
        let root = Version::create_root(&graph).unwrap();
        let v1 = Version::commit(&graph, &root, vec![add(2, ROOT_NODE, 0)]).unwrap();
        let v2 = Version::commit(&graph, &v1, vec![add(3, ROOT_NODE, 1)]).unwrap();
        let intents = capture_intents(&graph, &graph.resolve(&v2).unwrap()).unwrap();
        assert_eq!(intents, vec![Intent::AddNode { id: 3, parent: ROOT_NODE, anchor: Some(2) }]);
    }

    // -----------------------------------------------------------------------
    // Resolution
    // -----------------------------------------------------------------------

    #[test]
    fn vanished_anchor_appends_at_the_end() {
        let graph = test_graph();
        let tree = tree_with(&graph, &[add(5, ROOT_NODE, 0), add(6, ROOT_NODE, 1)]);
        let intent = Intent::AddNode { id: 7, parent: ROOT_NODE, anchor: Some(99) };
        let ops = intent.resolve(&tree).unwrap();
        assert_eq!(ops, vec![add(7, ROOT_NODE, 2)]);
    }

    #[test]
    fn deletion_wins_over_a_property_edit() {
        let graph = test_graph();
        let tree = tree_with(&graph, &[]);
        let intent = Intent::SetProperty { id: 42, key: "k".into(), value: Some("v".into()) };
        assert!(intent.resolve(&tree).unwrap().is_empty());
    }

    #[test]
    fn deletion_wins_over_a_move() {
        let graph = test_graph();
        let tree = tree_with(&graph, &[add(2, ROOT_NODE, 0)]);
        // Target parent vanished.
        let orphaned = Intent::MoveNode { id: 2, parent: 77, anchor: None };
        assert!(orphaned.resolve(&tree).unwrap().is_empty());
        // Moved node vanished.
        let gone = Intent::MoveNode { id: 77, parent: ROOT_NODE, anchor: None };
        assert!(gone.resolve(&tree).unwrap().is_empty());
    }

    #[test]
    fn cycle_forming_move_resolves_to_nothing() {
        let graph = test_graph();
        let tree = tree_with(&graph, &[add(2, ROOT_NODE, 0), add(3, 2, 0)]);
        let intent = Intent::MoveNode { id: 2, parent: 3, anchor: None };
        assert!(intent.resolve(&tree).unwrap().is_empty());
    }

    #[test]
    fn duplicate_add_resolves_to_nothing() {
        let graph = test_graph();
        let tree = tree_with(&graph, &[add(2, ROOT_NODE, 0)]);
        let intent = Intent::AddNode { id: 2, parent: ROOT_NODE, anchor: None };
        assert!(intent.resolve(&tree).unwrap().is_empty());
    }

    #[test]
    fn delete_of_an_absent_node_resolves_to_nothing() {
        let graph = test_graph();
        let tree = tree_with(&graph, &[]);
        let intent = Intent::DeleteNode { id: 9 };
        assert!(intent.resolve(&tree).unwrap().is_empty());
    }
}
