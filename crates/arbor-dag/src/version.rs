//! The [`Version`] record: one immutable snapshot of the model plus the
//! operations that produced it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use arbor_model::{ModelTree, Operation};
use arbor_store::{DynRef, ObjectGraph, ObjectRef, Record, StoreError, StoreResult};
use arbor_trie::{PatriciaNode, PatriciaTrie};
use arbor_types::ContentHash;

use crate::error::{DagError, DagResult};
use crate::undo::expand_ops;

/// Shared handle to a version in the object graph.
pub type VersionRef = Arc<ObjectRef<Version>>;

/// One version of the model tree.
///
/// Parent links classify the version: no parents is a root, one parent a
/// regular version (`ops` transform the parent's tree into this one), two
/// parents a merge (`ops` are the concrete operations the merger actually
/// applied). Versions are immutable; identity is the content hash.
#[derive(Debug)]
pub struct Version {
    parents: Vec<VersionRef>,
    ops: Vec<Operation>,
    tree: Arc<ObjectRef<PatriciaNode>>,
}

/// Serialized form: hashes instead of references.
#[derive(Serialize, Deserialize)]
struct VersionWire {
    parents: Vec<ContentHash>,
    ops: Vec<Operation>,
    tree: ContentHash,
}

impl Version {
    /// Create a root version over a fresh, empty model tree.
    pub fn create_root(graph: &Arc<ObjectGraph>) -> DagResult<VersionRef> {
        let tree = ModelTree::empty(graph.clone())?;
        Self::build(graph, Vec::new(), Vec::new(), &tree)
    }

    /// Create a root version over an existing model tree snapshot, e.g.
    /// when importing a model that predates its version history.
    pub fn import_root(graph: &Arc<ObjectGraph>, tree: &ModelTree) -> DagResult<VersionRef> {
        Self::build(graph, Vec::new(), Vec::new(), tree)
    }

    /// Commit `ops` on top of `base`, producing a regular version.
    ///
    /// The operation log is stored as given (undo operations stay undo
    /// operations); the tree is computed by applying the expanded log to
    /// the base tree.
    pub fn commit(
        graph: &Arc<ObjectGraph>,
        base: &VersionRef,
        ops: Vec<Operation>,
    ) -> DagResult<VersionRef> {
        let base_version = graph.resolve(base)?;
        let expanded = expand_ops(graph, &ops)?;
        let tree = base_version.tree(graph).apply_all(&expanded)?;
        debug!(base = %base.hash().short_hex(), ops = ops.len(), "commit");
        Self::build(graph, vec![base.clone()], ops, &tree)
    }

    /// Construct a merge version over an already-computed merged tree.
    /// `ops` must be the flattened concrete operations the merge applied.
    pub fn merged(
        graph: &Arc<ObjectGraph>,
        left: &VersionRef,
        right: &VersionRef,
        ops: Vec<Operation>,
        tree: &ModelTree,
    ) -> DagResult<VersionRef> {
        Self::build(graph, vec![left.clone(), right.clone()], ops, tree)
    }

    fn build(
        graph: &Arc<ObjectGraph>,
        parents: Vec<VersionRef>,
        ops: Vec<Operation>,
        tree: &ModelTree,
    ) -> DagResult<VersionRef> {
        let root = tree.trie().root().cloned().ok_or(DagError::EmptyTree)?;
        let version = graph.from_created(Version { parents, ops, tree: root });
        // Versions are addressable by hash from the moment they exist:
        // undo expansion and merge ancestry walks look them up by identity.
        graph.write_ref(&version)?;
        Ok(version)
    }

    /// Parent links: empty for a root, one for a regular version, two for
    /// a merge.
    pub fn parents(&self) -> &[VersionRef] {
        &self.parents
    }

    /// The base version a regular version was committed on, or the first
    /// parent of a merge.
    pub fn base(&self) -> Option<&VersionRef> {
        self.parents.first()
    }

    /// The stored operation log.
    pub fn ops(&self) -> &[Operation] {
        &self.ops
    }

    /// Reference to the root patricia node of this version's tree.
    pub fn tree_ref(&self) -> &Arc<ObjectRef<PatriciaNode>> {
        &self.tree
    }

    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    pub fn is_merge(&self) -> bool {
        self.parents.len() == 2
    }

    /// This version's model tree snapshot.
    pub fn tree(&self, graph: &Arc<ObjectGraph>) -> ModelTree {
        ModelTree::from_trie(PatriciaTrie::from_root(graph.clone(), Some(self.tree.clone())))
    }
}

impl Record for Version {
    fn serialize(&self) -> String {
        let wire = VersionWire {
            parents: self.parents.iter().map(|p| p.hash()).collect(),
            ops: self.ops.clone(),
            tree: self.tree.hash(),
        };
        serde_json::to_string(&wire).expect("version wire form is always serializable")
    }

    fn deserialize(text: &str, graph: &ObjectGraph) -> StoreResult<Self> {
        let wire: VersionWire =
            serde_json::from_str(text).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let parents = wire
            .parents
            .into_iter()
            .map(|h| graph.from_hash::<Version>(h))
            .collect::<StoreResult<Vec<_>>>()?;
        let tree = graph.from_hash::<PatriciaNode>(wire.tree)?;
        Ok(Version { parents, ops: wire.ops, tree })
    }

    fn containment_refs(&self) -> Vec<DynRef> {
        vec![self.tree.clone()]
    }

    fn other_refs(&self) -> Vec<DynRef> {
        self.parents.iter().map(|p| p.clone() as DynRef).collect()
    }

    fn diff(&self, old: &Self, graph: &ObjectGraph) -> StoreResult<Vec<DynRef>> {
        // Parents are non-containment and never traversed; only the tree
        // contributes changed records.
        graph.diff_refs(&self.tree, &old.tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_model::ROOT_NODE;
    use arbor_store::InMemoryStore;

    fn test_graph() -> Arc<ObjectGraph> {
        ObjectGraph::new(Arc::new(InMemoryStore::new()))
    }

    fn add(id: u64, parent: u64, index: usize) -> Operation {
        Operation::AddNode { id, parent, index }
    }

    #[test]
    fn root_version_has_no_parents_and_an_empty_log() {
        let graph = test_graph();
        let root = Version::create_root(&graph).unwrap();
        let v = graph.resolve(&root).unwrap();
        assert!(v.is_root());
        assert!(!v.is_merge());
        assert!(v.ops().is_empty());
        assert_eq!(v.tree(&graph).all_nodes().unwrap().len(), 1);
    }

    #[test]
    fn commit_applies_the_log_to_the_base_tree() {
        let graph = test_graph();
        let root = Version::create_root(&graph).unwrap();
        let v1 = Version::commit(&graph, &root, vec![add(2, ROOT_NODE, 0)]).unwrap();
        let version = graph.resolve(&v1).unwrap();
        assert_eq!(version.base().map(|b| b.hash()), Some(root.hash()));
        assert!(version.tree(&graph).contains(2).unwrap());
        // The base version's tree is untouched.
        let base = graph.resolve(&root).unwrap();
        assert!(!base.tree(&graph).contains(2).unwrap());
    }

    #[test]
    fn version_identity_is_content_hash() {
        let graph = test_graph();
        let root = Version::create_root(&graph).unwrap();
        let a = Version::commit(&graph, &root, vec![add(2, ROOT_NODE, 0)]).unwrap();
        let b = Version::commit(&graph, &root, vec![add(2, ROOT_NODE, 0)]).unwrap();
        assert_eq!(a.hash(), b.hash());
        let c = Version::commit(&graph, &root, vec![add(3, ROOT_NODE, 0)]).unwrap();
        assert_ne!(a.hash(), c.hash());
    }

    #[test]
    fn wire_roundtrip_preserves_links() {
        let graph = test_graph();
        let root = Version::create_root(&graph).unwrap();
        let v1 = Version::commit(&graph, &root, vec![add(2, ROOT_NODE, 0)]).unwrap();
        let version = graph.resolve(&v1).unwrap();
        let text = version.serialize();
        let back = Version::deserialize(&text, &graph).unwrap();
        assert_eq!(back.parents().len(), 1);
        assert_eq!(back.parents()[0].hash(), root.hash());
        assert_eq!(back.tree_ref().hash(), version.tree_ref().hash());
        assert_eq!(back.ops(), version.ops());
    }

    #[test]
    fn persisted_version_reloads_from_a_fresh_graph() {
        let store = Arc::new(InMemoryStore::new());
        let graph = ObjectGraph::new(store.clone());
        let root = Version::create_root(&graph).unwrap();
        let v1 = Version::commit(&graph, &root, vec![add(2, ROOT_NODE, 0)]).unwrap();

        let graph2 = ObjectGraph::new(store);
        let reloaded = graph2.from_hash::<Version>(v1.hash()).unwrap();
        let version = graph2.resolve(&reloaded).unwrap();
        assert!(version.tree(&graph2).contains(2).unwrap());
        // Parent links are persisted too (non-containment still written).
        let base = graph2.resolve(&version.parents()[0]).unwrap();
        assert!(base.is_root());
    }

    #[test]
    fn equal_trees_diff_to_nothing() {
        let graph = test_graph();
        let root = Version::create_root(&graph).unwrap();
        let a = Version::commit(&graph, &root, vec![add(2, ROOT_NODE, 0)]).unwrap();
        let b = Version::commit(&graph, &root, vec![add(2, ROOT_NODE, 0)]).unwrap();
        let va = graph.resolve(&a).unwrap();
        let vb = graph.resolve(&b).unwrap();
        assert!(va.diff(&vb, &graph).unwrap().is_empty());
    }
}
