//! The version merger.

use std::cmp::Ordering;
use std::sync::Arc;

use tracing::{debug, trace};

use arbor_dag::{
    collapse_undo_pairs, common_base, is_ancestor, leaf_expansion, DagError, LinearHistory,
    Version, VersionOrder, VersionRef,
};
use arbor_model::Operation;
use arbor_store::ObjectGraph;

use crate::error::{MergeError, MergeResult};
use crate::intent::capture_intents;

/// Merges two versions into one by replaying captured intents on top of
/// their common ancestor's tree.
///
/// The merger runs synchronously and purely in-memory against one graph
/// instance; callers needing remote data should prefetch the relevant
/// ancestry before invoking it. Merging is commutative at the tree level:
/// `merge_change(a, b)` and `merge_change(b, a)` produce trees with equal
/// content hash under the default version order.
pub struct VersionMerger {
    graph: Arc<ObjectGraph>,
    order: VersionOrder,
}

impl VersionMerger {
    pub fn new(graph: Arc<ObjectGraph>) -> Self {
        Self {
            graph,
            order: Arc::new(|a, b| a.cmp(b)),
        }
    }

    /// A merger with an explicit total order over version identities,
    /// used for history tie-breaks and the ping-pong guard.
    pub fn with_order(graph: Arc<ObjectGraph>, order: VersionOrder) -> Self {
        Self { graph, order }
    }

    /// Merge `left` and `right` into a single version.
    ///
    /// Fast paths: equal versions and ancestor relations return the
    /// more-derived input unchanged. Two versions reflecting the same set
    /// of underlying non-merge versions via different merge paths return
    /// the one with the lower identity, so peers cannot re-merge the same
    /// content forever. Everything else builds a merge version whose
    /// operation log is the flattened list of concretely applied
    /// operations.
    ///
    /// Any failure aborts the whole merge; no partially merged version is
    /// ever returned and both inputs remain valid.
    pub fn merge_change(&self, left: &VersionRef, right: &VersionRef) -> MergeResult<VersionRef> {
        if left.hash() == right.hash() {
            return Ok(left.clone());
        }
        if is_ancestor(&self.graph, left, right)? {
            trace!(kept = %right.hash().short_hex(), "fast path: left is ancestor");
            return Ok(right.clone());
        }
        if is_ancestor(&self.graph, right, left)? {
            trace!(kept = %left.hash().short_hex(), "fast path: right is ancestor");
            return Ok(left.clone());
        }

        // Ping-pong guard: same substantive edits through different merge
        // paths. The lower identity wins on both peers, so the exchange
        // terminates.
        if leaf_expansion(&self.graph, left)? == leaf_expansion(&self.graph, right)? {
            let keep = match (self.order)(&left.hash(), &right.hash()) {
                Ordering::Less | Ordering::Equal => left,
                Ordering::Greater => right,
            };
            debug!(kept = %keep.hash().short_hex(), "ping-pong guard");
            return Ok(keep.clone());
        }

        let base = common_base(&self.graph, left, right)?.ok_or(MergeError::NoCommonAncestor {
            left: left.hash(),
            right: right.hash(),
        })?;
        debug!(
            left = %left.hash().short_hex(),
            right = %right.hash().short_hex(),
            base = %base.hash().short_hex(),
            "merging"
        );

        let history = LinearHistory::load_with_order(
            &self.graph,
            base.hash(),
            &[left.clone(), right.clone()],
            self.order.clone(),
        )?;
        let entries = collapse_undo_pairs(history.ordered());

        // Capture each version's intents against its own base, oldest
        // first, then replay them all from the common ancestor's tree.
        let mut tree = self
            .graph
            .resolve(&base)
            .map_err(DagError::from)?
            .tree(&self.graph);
        let mut applied: Vec<Operation> = Vec::new();
        for (_, version) in &entries {
            for intent in capture_intents(&self.graph, version)? {
                for op in intent.resolve(&tree)? {
                    tree = tree.apply(&op).map_err(|e| MergeError::OperationFailed {
                        op: op.clone(),
                        phase: "replay",
                        source: e,
                    })?;
                    applied.push(op);
                }
            }
        }

        let merged = Version::merged(&self.graph, left, right, applied, &tree)?;
        debug!(merged = %merged.hash().short_hex(), "merge complete");
        Ok(merged)
    }
}
