//! Request-scoped linear history over a slice of the version DAG.
//!
//! Built by walking backward from head versions down to (but not past) a
//! known common base, it orders every non-merge version strictly between
//! the base and the heads so that causal dependencies come first. The
//! structure is transient: built per merge call, never persisted.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tracing::trace;

use arbor_model::Operation;
use arbor_store::ObjectGraph;
use arbor_types::ContentHash;

use crate::dag::ancestor_set;
use crate::error::DagResult;
use crate::version::{Version, VersionRef};

/// Injectable total order over version identities, used to break ties
/// between causally independent versions. The default orders by hash
/// ascending, which is symmetric in the two merge inputs and therefore
/// keeps merge results independent of argument order.
pub type VersionOrder = Arc<dyn Fn(&ContentHash, &ContentHash) -> Ordering + Send + Sync>;

fn hash_ascending() -> VersionOrder {
    Arc::new(|a, b| a.cmp(b))
}

/// One entry of a linear history: a non-merge version and its identity.
pub type HistoryEntry = (ContentHash, Arc<Version>);

/// The non-merge versions strictly between a base and a set of heads,
/// with the dependency edges needed to order them causally.
pub struct LinearHistory {
    versions: HashMap<ContentHash, Arc<Version>>,
    /// For each included version, the included versions it causally
    /// depends on (parents, looked through merge versions).
    deps: HashMap<ContentHash, Vec<ContentHash>>,
    order: VersionOrder,
}

impl LinearHistory {
    /// Walk backward from `heads`, stopping at `base` or any ancestor of
    /// it, collecting every non-merge version in between. Merge versions
    /// are traversed through both parents but excluded from the history
    /// itself. Stopping at the whole ancestor set matters when a head is
    /// a merge whose far parent bypasses `base`: that parent's line must
    /// not contribute pre-base versions to the history.
    pub fn load(
        graph: &Arc<ObjectGraph>,
        base: ContentHash,
        heads: &[VersionRef],
    ) -> DagResult<Self> {
        Self::load_with_order(graph, base, heads, hash_ascending())
    }

    /// [`LinearHistory::load`] with an explicit tie-break order.
    pub fn load_with_order(
        graph: &Arc<ObjectGraph>,
        base: ContentHash,
        heads: &[VersionRef],
        order: VersionOrder,
    ) -> DagResult<Self> {
        let base_ref = graph.from_hash::<Version>(base)?;
        let settled = ancestor_set(graph, &base_ref)?;

        let mut versions = HashMap::new();
        let mut deps: HashMap<ContentHash, Vec<ContentHash>> = HashMap::new();
        let mut seen = HashSet::new();
        let mut queue: VecDeque<VersionRef> = heads.iter().cloned().collect();
        while let Some(r) = queue.pop_front() {
            let hash = r.hash();
            if settled.contains(&hash) || !seen.insert(hash) {
                continue;
            }
            let v = graph.resolve(&r)?;
            queue.extend(v.parents().iter().cloned());
            if !v.is_merge() {
                versions.insert(hash, v);
            }
        }

        // Dependency edges skip over merge versions: a version depends on
        // the nearest included versions reachable through its parents.
        for (hash, v) in &versions {
            let mut found = Vec::new();
            let mut walk: VecDeque<VersionRef> = v.parents().iter().cloned().collect();
            let mut walked = HashSet::new();
            while let Some(p) = walk.pop_front() {
                let p_hash = p.hash();
                if settled.contains(&p_hash) || !walked.insert(p_hash) {
                    continue;
                }
                if versions.contains_key(&p_hash) {
                    found.push(p_hash);
                } else {
                    walk.extend(graph.resolve(&p)?.parents().iter().cloned());
                }
            }
            deps.insert(*hash, found);
        }

        trace!(versions = versions.len(), "linear history loaded");
        Ok(Self { versions, deps, order })
    }

    /// Number of versions in the history.
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// A single causal ordering of the history: every version appears
    /// after all versions it depends on, and ties between independent
    /// versions go to the injected total order.
    pub fn ordered(&self) -> Vec<HistoryEntry> {
        let mut indegree: HashMap<ContentHash, usize> = HashMap::new();
        let mut dependents: HashMap<ContentHash, Vec<ContentHash>> = HashMap::new();
        for (hash, parents) in &self.deps {
            indegree.entry(*hash).or_insert(0);
            for p in parents {
                *indegree.entry(*hash).or_insert(0) += 1;
                dependents.entry(*p).or_default().push(*hash);
            }
        }

        let mut ready: Vec<ContentHash> = indegree
            .iter()
            .filter(|(_, &d)| d == 0)
            .map(|(h, _)| *h)
            .collect();
        let mut out = Vec::with_capacity(self.versions.len());
        while !ready.is_empty() {
            // Pick the minimum under the injected order.
            let mut best = 0;
            for i in 1..ready.len() {
                if (self.order)(&ready[i], &ready[best]) == Ordering::Less {
                    best = i;
                }
            }
            let next = ready.swap_remove(best);
            out.push((next, self.versions[&next].clone()));
            for d in dependents.get(&next).into_iter().flatten() {
                let remaining = indegree.get_mut(d).expect("dependent was counted");
                *remaining -= 1;
                if *remaining == 0 {
                    ready.push(*d);
                }
            }
        }
        out
    }
}

/// Drop adjacent `[v, undo-of-v]` pairs from an ordered history: an edit
/// immediately followed by its own undo contributes nothing to a merge.
/// Purely an optimization; correctness does not depend on it.
pub fn collapse_undo_pairs(ordered: Vec<HistoryEntry>) -> Vec<HistoryEntry> {
    let mut out: Vec<HistoryEntry> = Vec::with_capacity(ordered.len());
    for (hash, version) in ordered {
        let undoes_previous = match (version.ops(), out.last()) {
            ([Operation::Undo { version: target }], Some((prev, _))) => target == prev,
            _ => false,
        };
        if undoes_previous {
            out.pop();
        } else {
            out.push((hash, version));
        }
    }
    out
}
