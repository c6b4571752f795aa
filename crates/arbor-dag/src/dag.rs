//! Ancestry queries over the version DAG.

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::Arc;

use arbor_store::ObjectGraph;
use arbor_types::ContentHash;

use crate::error::DagResult;
use crate::version::VersionRef;

/// Returns `true` if `ancestor` is reachable from `version` through
/// parent links, or is `version` itself. Merge versions are traversed
/// through both parents.
pub fn is_ancestor(
    graph: &Arc<ObjectGraph>,
    ancestor: &VersionRef,
    version: &VersionRef,
) -> DagResult<bool> {
    let want = ancestor.hash();
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([version.clone()]);
    while let Some(r) = queue.pop_front() {
        let hash = r.hash();
        if hash == want {
            return Ok(true);
        }
        if !seen.insert(hash) {
            continue;
        }
        queue.extend(graph.resolve(&r)?.parents().iter().cloned());
    }
    Ok(false)
}

/// Every version reachable from `version` through parent links,
/// including `version` itself.
pub fn ancestor_set(
    graph: &Arc<ObjectGraph>,
    version: &VersionRef,
) -> DagResult<HashSet<ContentHash>> {
    let mut out = HashSet::new();
    let mut queue = VecDeque::from([version.clone()]);
    while let Some(r) = queue.pop_front() {
        if !out.insert(r.hash()) {
            continue;
        }
        queue.extend(graph.resolve(&r)?.parents().iter().cloned());
    }
    Ok(out)
}

/// The nearest version reachable from both `a` and `b` (inclusive), or
/// `None` when their histories are disjoint.
pub fn common_base(
    graph: &Arc<ObjectGraph>,
    a: &VersionRef,
    b: &VersionRef,
) -> DagResult<Option<VersionRef>> {
    let from_a = ancestor_set(graph, a)?;

    // Breadth-first from b, so the first hit is the nearest on b's side.
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([b.clone()]);
    while let Some(r) = queue.pop_front() {
        let hash = r.hash();
        if from_a.contains(&hash) {
            return Ok(Some(r));
        }
        if !seen.insert(hash) {
            continue;
        }
        queue.extend(graph.resolve(&r)?.parents().iter().cloned());
    }
    Ok(None)
}

/// The set of non-merge versions whose edits `version` reflects: itself
/// (unless it is a merge) and every non-merge ancestor. Two versions with
/// equal expansions carry the same substantive edits, differing only in
/// how merges combined them.
pub fn leaf_expansion(
    graph: &Arc<ObjectGraph>,
    version: &VersionRef,
) -> DagResult<BTreeSet<ContentHash>> {
    let mut out = BTreeSet::new();
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([version.clone()]);
    while let Some(r) = queue.pop_front() {
        if !seen.insert(r.hash()) {
            continue;
        }
        let v = graph.resolve(&r)?;
        if !v.is_merge() {
            out.insert(r.hash());
        }
        queue.extend(v.parents().iter().cloned());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::Version;
    use arbor_model::{Operation, ROOT_NODE};
    use arbor_store::InMemoryStore;

    fn test_graph() -> Arc<ObjectGraph> {
        ObjectGraph::new(Arc::new(InMemoryStore::new()))
    }

    fn add(id: u64, parent: u64, index: usize) -> Operation {
        Operation::AddNode { id, parent, index }
    }

    #[test]
    fn every_version_is_its_own_ancestor() {
        let graph = test_graph();
        let root = Version::create_root(&graph).unwrap();
        assert!(is_ancestor(&graph, &root, &root).unwrap());
    }

    #[test]
    fn ancestry_follows_the_chain() {
        let graph = test_graph();
        let root = Version::create_root(&graph).unwrap();
        let v1 = Version::commit(&graph, &root, vec![add(2, ROOT_NODE, 0)]).unwrap();
        let v2 = Version::commit(&graph, &v1, vec![add(3, ROOT_NODE, 0)]).unwrap();
        assert!(is_ancestor(&graph, &root, &v2).unwrap());
        assert!(is_ancestor(&graph, &v1, &v2).unwrap());
        assert!(!is_ancestor(&graph, &v2, &v1).unwrap());
    }

    #[test]
    fn common_base_of_two_branches_is_the_fork_point() {
        let graph = test_graph();
        let root = Version::create_root(&graph).unwrap();
        let fork = Version::commit(&graph, &root, vec![add(2, ROOT_NODE, 0)]).unwrap();
        let a = Version::commit(&graph, &fork, vec![add(3, ROOT_NODE, 0)]).unwrap();
        let b = Version::commit(&graph, &fork, vec![add(4, ROOT_NODE, 0)]).unwrap();
        let base = common_base(&graph, &a, &b).unwrap().unwrap();
        assert_eq!(base.hash(), fork.hash());
    }

    #[test]
    fn common_base_of_ancestor_and_descendant_is_the_ancestor() {
        let graph = test_graph();
        let root = Version::create_root(&graph).unwrap();
        let v1 = Version::commit(&graph, &root, vec![add(2, ROOT_NODE, 0)]).unwrap();
        let base = common_base(&graph, &root, &v1).unwrap().unwrap();
        assert_eq!(base.hash(), root.hash());
    }

    #[test]
    fn disjoint_histories_have_no_common_base() {
        let graph = test_graph();
        let root_a = Version::create_root(&graph).unwrap();
        // A second, unrelated root. Its tree must differ, otherwise content
        // addressing makes it the same version as root_a.
        let other_tree = arbor_model::ModelTree::empty(graph.clone())
            .unwrap()
            .apply(&add(9, ROOT_NODE, 0))
            .unwrap();
        let root_b = Version::import_root(&graph, &other_tree).unwrap();
        assert_ne!(root_a.hash(), root_b.hash());
        assert!(common_base(&graph, &root_a, &root_b).unwrap().is_none());
        assert!(!is_ancestor(&graph, &root_a, &root_b).unwrap());
    }

    #[test]
    fn leaf_expansion_collects_non_merge_ancestors() {
        let graph = test_graph();
        let root = Version::create_root(&graph).unwrap();
        let a = Version::commit(&graph, &root, vec![add(2, ROOT_NODE, 0)]).unwrap();
        let b = Version::commit(&graph, &root, vec![add(3, ROOT_NODE, 0)]).unwrap();
        let merged_tree = graph.resolve(&a).unwrap().tree(&graph).apply(&add(3, ROOT_NODE, 1)).unwrap();
        let m = Version::merged(&graph, &a, &b, vec![add(3, ROOT_NODE, 1)], &merged_tree).unwrap();

        let expansion = leaf_expansion(&graph, &m).unwrap();
        let expected: BTreeSet<ContentHash> =
            [root.hash(), a.hash(), b.hash()].into_iter().collect();
        assert_eq!(expansion, expected);
    }
}
