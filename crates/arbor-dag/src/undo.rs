//! Expansion of undo operations into concrete inverse edits.
//!
//! An [`Operation::Undo`] names a version; its meaning is "the concrete
//! operations that revert that version's effect". Expansion replays the
//! target's operations forward from the target's own base tree, inverting
//! each against the tree state it was applied to, then reverses the
//! result. Trees never see a raw undo: every apply path expands first.

use std::sync::Arc;

use tracing::debug;

use arbor_model::{ModelError, ModelTree, NodeId, Operation};
use arbor_store::{ObjectGraph, StoreError};
use arbor_types::ContentHash;

use crate::error::{DagError, DagResult};
use crate::version::Version;

/// Replace every undo in `ops` with the concrete inverse operations of
/// its target version. Non-undo operations pass through unchanged.
pub fn expand_ops(graph: &Arc<ObjectGraph>, ops: &[Operation]) -> DagResult<Vec<Operation>> {
    let mut out = Vec::with_capacity(ops.len());
    for op in ops {
        match op {
            Operation::Undo { version } => out.extend(invert_version(graph, *version)?),
            other => out.push(other.clone()),
        }
    }
    Ok(out)
}

/// The concrete operations that revert the named version's effect,
/// computed against the target's own base tree.
///
/// Undoing a root version is a no-op (it has no operations). Undo chains
/// expand recursively: a target whose log itself contains undos is
/// expanded before inversion.
pub fn invert_version(graph: &Arc<ObjectGraph>, target: ContentHash) -> DagResult<Vec<Operation>> {
    let version_ref = graph.from_hash::<Version>(target)?;
    let version = graph.resolve(&version_ref).map_err(|e| match e {
        StoreError::NotFound(hash) => DagError::UndoTargetUnreachable(hash),
        other => DagError::Store(other),
    })?;
    let Some(base) = version.base() else {
        return Ok(Vec::new());
    };
    let base_tree = graph.resolve(base)?.tree(graph);
    let concrete = expand_ops(graph, version.ops())?;
    debug!(target = %target.short_hex(), ops = concrete.len(), "invert");

    // Walk the log forward, inverting each operation against the tree it
    // actually saw, then play the inverses back in reverse.
    let mut tree = base_tree;
    let mut inverse_runs = Vec::with_capacity(concrete.len());
    for op in &concrete {
        inverse_runs.push(invert_op(&tree, op)?);
        tree = tree.apply(op)?;
    }
    Ok(inverse_runs.into_iter().rev().flatten().collect())
}

/// The operations that revert `op`, given the tree state just before `op`
/// was applied.
fn invert_op(before: &ModelTree, op: &Operation) -> DagResult<Vec<Operation>> {
    let inverse = match op {
        Operation::AddNode { id, .. } => vec![Operation::DeleteNode { id: *id }],
        Operation::DeleteNode { id } => restore_subtree(before, *id)?,
        Operation::MoveNode { id, .. } => {
            let node = require(before, *id)?;
            let parent = node.parent.ok_or(ModelError::MissingNode(*id))?;
            vec![Operation::MoveNode {
                id: *id,
                parent,
                index: sibling_index(before, parent, *id)?,
            }]
        }
        Operation::SetProperty { id, key, .. } => {
            let node = require(before, *id)?;
            vec![Operation::SetProperty {
                id: *id,
                key: key.clone(),
                value: node.properties.get(key).cloned(),
            }]
        }
        Operation::SetReference { id, key, .. } => {
            let node = require(before, *id)?;
            vec![Operation::SetReference {
                id: *id,
                key: key.clone(),
                target: node.references.get(key).copied(),
            }]
        }
        Operation::Undo { version } => {
            return Err(DagError::Model(ModelError::UnexpandedUndo(*version)))
        }
    };
    Ok(inverse)
}

/// Operations that rebuild the subtree rooted at `id` exactly as it stands
/// in `tree`: adds in preorder at the original sibling positions, followed
/// by the properties and references of each node.
fn restore_subtree(tree: &ModelTree, id: NodeId) -> DagResult<Vec<Operation>> {
    let mut ops = Vec::new();
    for node in tree.subtree_nodes(id)? {
        let parent = node.parent.ok_or(ModelError::MissingNode(node.id))?;
        ops.push(Operation::AddNode {
            id: node.id,
            parent,
            index: sibling_index(tree, parent, node.id)?,
        });
        for (key, value) in &node.properties {
            ops.push(Operation::SetProperty {
                id: node.id,
                key: key.clone(),
                value: Some(value.clone()),
            });
        }
        for (key, target) in &node.references {
            ops.push(Operation::SetReference {
                id: node.id,
                key: key.clone(),
                target: Some(*target),
            });
        }
    }
    Ok(ops)
}

fn require(tree: &ModelTree, id: NodeId) -> DagResult<arbor_model::ModelNode> {
    Ok(tree.node(id)?.ok_or(ModelError::MissingNode(id))?)
}

fn sibling_index(tree: &ModelTree, parent: NodeId, id: NodeId) -> DagResult<usize> {
    let parent_node = require(tree, parent)?;
    parent_node
        .children
        .iter()
        .position(|&c| c == id)
        .ok_or_else(|| {
            DagError::Model(ModelError::CorruptNode {
                id,
                reason: format!("not listed under parent {parent}"),
            })
        })
}
