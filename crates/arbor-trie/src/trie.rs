//! The persistent patricia trie.
//!
//! Wholly immutable: every mutating operation returns a new
//! [`PatriciaTrie`] whose root shares all untouched subtrees with the
//! original. Only the nodes along the path to a change are rebuilt.

use std::sync::Arc;

use tracing::trace;

use arbor_store::{ObjectGraph, ObjectRef};
use arbor_types::ContentHash;

use crate::error::TrieResult;
use crate::node::PatriciaNode;

/// An ordered, persistent string-keyed map stored in the object graph.
///
/// Keys are treated as sequences of Unicode scalar values; sibling order
/// and iteration order follow scalar order.
#[derive(Clone, Debug)]
pub struct PatriciaTrie {
    graph: Arc<ObjectGraph>,
    root: Option<Arc<ObjectRef<PatriciaNode>>>,
}

impl PatriciaTrie {
    /// The empty map.
    pub fn empty(graph: Arc<ObjectGraph>) -> Self {
        Self { graph, root: None }
    }

    /// A map rooted at an existing node reference (e.g. loaded by hash).
    pub fn from_root(graph: Arc<ObjectGraph>, root: Option<Arc<ObjectRef<PatriciaNode>>>) -> Self {
        Self { graph, root }
    }

    /// The owning object graph.
    pub fn graph(&self) -> &Arc<ObjectGraph> {
        &self.graph
    }

    /// The root reference, if the map is non-empty.
    pub fn root(&self) -> Option<&Arc<ObjectRef<PatriciaNode>>> {
        self.root.as_ref()
    }

    /// The root's content hash, if the map is non-empty.
    pub fn root_hash(&self) -> Option<ContentHash> {
        self.root.as_ref().map(|r| r.hash())
    }

    /// Persist the whole trie through the object graph.
    pub fn persist(&self) -> TrieResult<()> {
        if let Some(root) = &self.root {
            self.graph.write_ref(root)?;
        }
        Ok(())
    }

    /// Look up `key`.
    pub fn get(&self, key: &str) -> TrieResult<Option<String>> {
        let Some(root) = &self.root else {
            return Ok(None);
        };
        let mut node = self.graph.resolve(root)?;
        let mut rest = key;
        loop {
            if rest == node.own_prefix {
                return Ok(node.value.clone());
            }
            let Some(after) = rest.strip_prefix(node.own_prefix.as_str()) else {
                return Ok(None);
            };
            // after is non-empty here: the exact-match case returned above.
            let c = after.chars().next().expect("non-empty remainder");
            match node.child_index(c) {
                Ok(i) => {
                    node = self.graph.resolve(&node.children[i])?;
                    rest = after;
                }
                Err(_) => return Ok(None),
            }
        }
    }

    /// Insert or replace the value at `key`, returning the new trie.
    pub fn put(&self, key: &str, value: impl Into<String>) -> TrieResult<Self> {
        self.put_opt(key, Some(value.into()))
    }

    /// Remove `key` (tombstone put), returning the new trie. Removing an
    /// absent key returns an equivalent trie.
    pub fn remove(&self, key: &str) -> TrieResult<Self> {
        self.put_opt(key, None)
    }

    fn put_opt(&self, key: &str, value: Option<String>) -> TrieResult<Self> {
        trace!(key, present = value.is_some(), "trie update");
        let root = match &self.root {
            None => value.map(|v| self.graph.from_created(PatriciaNode::leaf(key, v))),
            Some(root) => {
                let node = self.graph.resolve(root)?;
                put_node(&self.graph, &node, key, value)?
                    .map(|n| self.graph.from_created(n))
            }
        };
        Ok(Self {
            graph: self.graph.clone(),
            root,
        })
    }

    /// The subtree containing exactly the keys starting with `prefix`,
    /// re-rooted so the consumed path is absorbed into the new root's own
    /// prefix. O(depth), not O(size).
    pub fn slice(&self, prefix: &str) -> TrieResult<Self> {
        if prefix.is_empty() {
            return Ok(self.clone());
        }
        let empty = Self::empty(self.graph.clone());
        let Some(root) = &self.root else {
            return Ok(empty);
        };
        let mut consumed = String::new();
        let mut node = self.graph.resolve(root)?;
        let mut want = prefix;
        loop {
            if node.own_prefix.starts_with(want) {
                let mut re_rooted = (*node).clone();
                re_rooted.own_prefix = format!("{consumed}{}", node.own_prefix);
                return Ok(Self {
                    graph: self.graph.clone(),
                    root: Some(self.graph.from_created(re_rooted)),
                });
            }
            let Some(after) = want.strip_prefix(node.own_prefix.as_str()) else {
                return Ok(empty);
            };
            let c = after.chars().next().expect("non-empty remainder");
            match node.child_index(c) {
                Ok(i) => {
                    consumed.push_str(&node.own_prefix);
                    node = self.graph.resolve(&node.children[i])?;
                    want = after;
                }
                Err(_) => return Ok(empty),
            }
        }
    }

    /// All key/value pairs in key order (explicit work stack, no
    /// unbounded recursion).
    pub fn entries(&self) -> TrieResult<Vec<(String, String)>> {
        let mut out = Vec::new();
        let Some(root) = &self.root else {
            return Ok(out);
        };
        let mut stack = vec![(String::new(), self.graph.resolve(root)?)];
        while let Some((path, node)) = stack.pop() {
            let full = format!("{path}{}", node.own_prefix);
            if let Some(v) = &node.value {
                out.push((full.clone(), v.clone()));
            }
            // Reversed push so siblings pop in ascending first-char order.
            for child in node.children.iter().rev() {
                stack.push((full.clone(), self.graph.resolve(child)?));
            }
        }
        Ok(out)
    }

    /// Number of keys. Walks the whole trie.
    pub fn len(&self) -> TrieResult<usize> {
        Ok(self.entries()?.len())
    }

    /// Returns `true` if the map holds no keys.
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }
}

/// Apply a put/tombstone to `node`, returning the replacement node, or
/// `None` if the node vanishes. Never mutates existing nodes; rebuilds
/// exactly the path to the change.
fn put_node(
    graph: &ObjectGraph,
    node: &PatriciaNode,
    key: &str,
    value: Option<String>,
) -> TrieResult<Option<PatriciaNode>> {
    // Exact match: replace the value, then re-normalize.
    if key == node.own_prefix {
        let mut next = node.clone();
        next.value = value;
        return normalize(graph, next);
    }

    // This node's prefix is a strict prefix of the key: descend or insert
    // a brand-new leaf at the computed insertion point.
    if let Some(after) = key.strip_prefix(node.own_prefix.as_str()) {
        let c = after.chars().next().expect("non-empty remainder");
        let mut next = node.clone();
        match node.child_index(c) {
            Ok(i) => {
                let child = graph.resolve(&node.children[i])?;
                match put_node(graph, &child, after, value)? {
                    Some(new_child) => {
                        next.children[i] = graph.from_created(new_child);
                    }
                    None => {
                        next.first_chars.remove(i);
                        next.children.remove(i);
                    }
                }
            }
            Err(i) => {
                let Some(v) = value else {
                    // Removing a key that was never present.
                    return Ok(Some(next));
                };
                next.first_chars.insert(i, c);
                next.children
                    .insert(i, graph.from_created(PatriciaNode::leaf(after, v)));
            }
        }
        return normalize(graph, next);
    }

    // Diverging prefixes: a removal cannot match; an insert splits this
    // node at the longest common prefix and retries against the split.
    let Some(v) = value else {
        return Ok(Some(node.clone()));
    };
    let lcp = longest_common_prefix(key, &node.own_prefix);
    let moved_prefix = &node.own_prefix[lcp.len()..];
    let moved_first = moved_prefix.chars().next().expect("split leaves a remainder");
    let mut moved = node.clone();
    moved.own_prefix = moved_prefix.to_owned();
    let intermediate = PatriciaNode {
        own_prefix: lcp.to_owned(),
        first_chars: vec![moved_first],
        children: vec![graph.from_created(moved)],
        value: None,
    };
    put_node(graph, &intermediate, key, Some(v))
}

/// Restore the node invariants after an edit: drop a childless valueless
/// node, splice a single-child valueless node into its child.
fn normalize(graph: &ObjectGraph, node: PatriciaNode) -> TrieResult<Option<PatriciaNode>> {
    if node.value.is_some() || node.children.len() >= 2 {
        return Ok(Some(node));
    }
    match node.children.len() {
        0 => Ok(None),
        _ => {
            let child = graph.resolve(&node.children[0])?;
            let mut merged = (*child).clone();
            merged.own_prefix = format!("{}{}", node.own_prefix, child.own_prefix);
            Ok(Some(merged))
        }
    }
}

fn longest_common_prefix<'a>(a: &'a str, b: &str) -> &'a str {
    let mut end = 0;
    for (ca, cb) in a.chars().zip(b.chars()) {
        if ca != cb {
            break;
        }
        end += ca.len_utf8();
    }
    &a[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_store::{AnyRef, InMemoryStore};

    fn test_trie() -> PatriciaTrie {
        PatriciaTrie::empty(ObjectGraph::new(Arc::new(InMemoryStore::new())))
    }

    // -----------------------------------------------------------------------
    // Map laws
    // -----------------------------------------------------------------------

    #[test]
    fn put_then_get() {
        let t = test_trie().put("key", "value").unwrap();
        assert_eq!(t.get("key").unwrap().as_deref(), Some("value"));
    }

    #[test]
    fn put_remove_get_is_absent() {
        let t = test_trie().put("key", "value").unwrap().remove("key").unwrap();
        assert_eq!(t.get("key").unwrap(), None);
        assert!(t.is_empty());
    }

    #[test]
    fn get_of_never_inserted_key_is_absent() {
        let t = test_trie().put("present", "1").unwrap();
        assert_eq!(t.get("absent").unwrap(), None);
        assert_eq!(t.get("presen").unwrap(), None);
        assert_eq!(t.get("presentt").unwrap(), None);
    }

    #[test]
    fn put_replaces_existing_value() {
        let t = test_trie().put("k", "old").unwrap().put("k", "new").unwrap();
        assert_eq!(t.get("k").unwrap().as_deref(), Some("new"));
    }

    #[test]
    fn remove_of_absent_key_is_equivalent() {
        let t = test_trie().put("a", "1").unwrap();
        let t2 = t.remove("zzz").unwrap();
        assert_eq!(t2.get("a").unwrap().as_deref(), Some("1"));
        assert_eq!(t.root_hash(), t2.root_hash());
    }

    // -----------------------------------------------------------------------
    // Radix structure
    // -----------------------------------------------------------------------

    #[test]
    fn shared_prefix_splits_root() {
        // Scenario: "cat" then "car" must split on the shared prefix "ca".
        let t = test_trie().put("cat", "1").unwrap().put("car", "2").unwrap();
        assert_eq!(t.get("cat").unwrap().as_deref(), Some("1"));
        assert_eq!(t.get("car").unwrap().as_deref(), Some("2"));
        assert_eq!(t.get("ca").unwrap(), None);

        let root = t.graph().resolve(t.root().unwrap()).unwrap();
        assert_eq!(root.own_prefix, "ca");
        assert_eq!(root.value, None);
        assert_eq!(root.first_chars, vec!['r', 't']);
    }

    #[test]
    fn prefix_key_stores_value_on_intermediate_node() {
        let t = test_trie()
            .put("cat", "1")
            .unwrap()
            .put("car", "2")
            .unwrap()
            .put("ca", "3")
            .unwrap();
        assert_eq!(t.get("ca").unwrap().as_deref(), Some("3"));
        assert_eq!(t.get("cat").unwrap().as_deref(), Some("1"));
        assert_eq!(t.get("car").unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn removal_collapses_single_child_chain() {
        let t = test_trie()
            .put("cat", "1")
            .unwrap()
            .put("car", "2")
            .unwrap()
            .remove("car")
            .unwrap();
        // The split node must splice back into a single "cat" leaf.
        let root = t.graph().resolve(t.root().unwrap()).unwrap();
        assert_eq!(root.own_prefix, "cat");
        assert_eq!(root.value.as_deref(), Some("1"));
        assert!(root.children.is_empty());
    }

    #[test]
    fn empty_key_is_a_valid_key() {
        let t = test_trie().put("", "root-value").unwrap().put("a", "1").unwrap();
        assert_eq!(t.get("").unwrap().as_deref(), Some("root-value"));
        assert_eq!(t.get("a").unwrap().as_deref(), Some("1"));
    }

    #[test]
    fn entries_are_sorted() {
        let mut t = test_trie();
        for (k, v) in [("banana", "3"), ("apple", "1"), ("cherry", "4"), ("apricot", "2")] {
            t = t.put(k, v).unwrap();
        }
        let entries = t.entries().unwrap();
        let keys: Vec<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["apple", "apricot", "banana", "cherry"]);
    }

    // -----------------------------------------------------------------------
    // Structural sharing
    // -----------------------------------------------------------------------

    #[test]
    fn untouched_siblings_are_shared_by_reference() {
        let t1 = test_trie()
            .put("aa", "1")
            .unwrap()
            .put("ab", "2")
            .unwrap()
            .put("ba", "3")
            .unwrap();
        let t2 = t1.put("bb", "4").unwrap();

        let r1 = t1.graph().resolve(t1.root().unwrap()).unwrap();
        let r2 = t2.graph().resolve(t2.root().unwrap()).unwrap();
        // The 'a' branch was untouched: same Arc, not a rebuilt copy.
        let a1 = &r1.children[r1.child_index('a').unwrap()];
        let a2 = &r2.children[r2.child_index('a').unwrap()];
        assert!(Arc::ptr_eq(a1, a2));
        // The 'b' branch differs.
        let b1 = &r1.children[r1.child_index('b').unwrap()];
        let b2 = &r2.children[r2.child_index('b').unwrap()];
        assert_ne!(b1.hash(), b2.hash());
    }

    #[test]
    fn old_trie_is_unaffected_by_updates() {
        let t1 = test_trie().put("k", "old").unwrap();
        let t2 = t1.put("k", "new").unwrap();
        assert_eq!(t1.get("k").unwrap().as_deref(), Some("old"));
        assert_eq!(t2.get("k").unwrap().as_deref(), Some("new"));
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    #[test]
    fn persist_and_reload_by_hash() {
        let store = Arc::new(InMemoryStore::new());
        let graph = ObjectGraph::new(store.clone());
        let t = PatriciaTrie::empty(graph.clone())
            .put("alpha", "1")
            .unwrap()
            .put("beta", "2")
            .unwrap();
        t.persist().unwrap();
        let root_hash = t.root_hash().unwrap();

        // Reload through a fresh graph over the same store.
        let graph2 = ObjectGraph::new(store);
        let root = graph2.from_hash::<PatriciaNode>(root_hash).unwrap();
        let reloaded = PatriciaTrie::from_root(graph2, Some(root));
        assert_eq!(reloaded.get("alpha").unwrap().as_deref(), Some("1"));
        assert_eq!(reloaded.get("beta").unwrap().as_deref(), Some("2"));
        assert_eq!(reloaded.entries().unwrap().len(), 2);
    }

    #[test]
    fn equal_content_tries_have_equal_root_hash() {
        // Insertion order must not matter for the final structure.
        let t1 = test_trie().put("cat", "1").unwrap().put("car", "2").unwrap();
        let t2 = test_trie().put("car", "2").unwrap().put("cat", "1").unwrap();
        assert_eq!(t1.root_hash(), t2.root_hash());
    }

    #[test]
    fn diff_reports_only_the_changed_branch() {
        let graph = ObjectGraph::new(Arc::new(InMemoryStore::new()));
        let old = PatriciaTrie::empty(graph.clone())
            .put("cat", "1")
            .unwrap()
            .put("car", "2")
            .unwrap()
            .put("dog", "3")
            .unwrap();
        let new = old.put("car", "9").unwrap();

        let changed = graph
            .diff_refs(new.root().unwrap(), old.root().unwrap())
            .unwrap();
        // Root, the shared "ca" branch, and the "car" leaf differ; the
        // untouched "dog" and "cat" nodes must not appear.
        assert_eq!(changed.len(), 3);
        let new_root = graph.resolve(new.root().unwrap()).unwrap();
        let dog = &new_root.children[new_root.child_index('d').unwrap()];
        assert!(changed.iter().all(|r| r.hash() != dog.hash()));
    }

    // -----------------------------------------------------------------------
    // Slice
    // -----------------------------------------------------------------------

    #[test]
    fn slice_keeps_exactly_matching_keys() {
        let mut t = test_trie();
        for (k, v) in [("car", "1"), ("cat", "2"), ("cattle", "3"), ("dog", "4")] {
            t = t.put(k, v).unwrap();
        }
        let s = t.slice("cat").unwrap();
        assert_eq!(s.get("cat").unwrap().as_deref(), Some("2"));
        assert_eq!(s.get("cattle").unwrap().as_deref(), Some("3"));
        assert_eq!(s.get("car").unwrap(), None);
        assert_eq!(s.get("dog").unwrap(), None);

        let keys: Vec<String> = s.entries().unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["cat", "cattle"]);
    }

    #[test]
    fn slice_of_unmatched_prefix_is_empty() {
        let t = test_trie().put("cat", "1").unwrap();
        assert!(t.slice("dog").unwrap().is_empty());
        assert!(t.slice("cats").unwrap().is_empty());
    }

    #[test]
    fn slice_with_empty_prefix_is_the_whole_trie() {
        let t = test_trie().put("a", "1").unwrap();
        let s = t.slice("").unwrap();
        assert_eq!(s.root_hash(), t.root_hash());
    }

    #[test]
    fn slice_mid_prefix_absorbs_path() {
        let t = test_trie().put("cat", "1").unwrap().put("car", "2").unwrap();
        // "c" stops inside the root's own prefix "ca".
        let s = t.slice("c").unwrap();
        assert_eq!(s.get("cat").unwrap().as_deref(), Some("1"));
        assert_eq!(s.get("car").unwrap().as_deref(), Some("2"));
    }

    // -----------------------------------------------------------------------
    // Property tests: map laws against a reference BTreeMap
    // -----------------------------------------------------------------------

    mod props {
        use super::*;
        use proptest::prelude::*;
        use std::collections::BTreeMap;

        #[derive(Clone, Debug)]
        enum Op {
            Put(String, String),
            Remove(String),
        }

        fn key_strategy() -> impl Strategy<Value = String> {
            "[a-c]{0,6}"
        }

        fn op_strategy() -> impl Strategy<Value = Op> {
            prop_oneof![
                3 => (key_strategy(), "[a-z]{0,4}").prop_map(|(k, v)| Op::Put(k, v)),
                1 => key_strategy().prop_map(Op::Remove),
            ]
        }

        proptest! {
            #[test]
            fn behaves_like_btreemap(ops in prop::collection::vec(op_strategy(), 0..40)) {
                let mut reference = BTreeMap::new();
                let mut trie = test_trie();
                for op in ops {
                    match op {
                        Op::Put(k, v) => {
                            reference.insert(k.clone(), v.clone());
                            trie = trie.put(&k, v).unwrap();
                        }
                        Op::Remove(k) => {
                            reference.remove(&k);
                            trie = trie.remove(&k).unwrap();
                        }
                    }
                }
                let expected: Vec<(String, String)> =
                    reference.into_iter().collect();
                prop_assert_eq!(trie.entries().unwrap(), expected);
            }

            #[test]
            fn roundtrips_through_the_store(keys in prop::collection::btree_set(key_strategy(), 0..20)) {
                let store = Arc::new(InMemoryStore::new());
                let graph = ObjectGraph::new(store.clone());
                let mut trie = PatriciaTrie::empty(graph);
                for (i, k) in keys.iter().enumerate() {
                    trie = trie.put(k, i.to_string()).unwrap();
                }
                trie.persist().unwrap();
                let before = trie.entries().unwrap();

                let graph2 = ObjectGraph::new(store);
                let root = trie
                    .root_hash()
                    .map(|h| graph2.from_hash::<PatriciaNode>(h).unwrap());
                let reloaded = PatriciaTrie::from_root(graph2, root);
                prop_assert_eq!(reloaded.entries().unwrap(), before);
            }
        }
    }
}
