//! The patricia node record.

use std::sync::Arc;

use arbor_store::{AnyRef, DynRef, ObjectGraph, ObjectRef, Record, StoreResult};
use arbor_types::ContentHash;

use crate::error::{TrieError, TrieResult};
use crate::escape::{escape, unescape, WireConfig, VALUE_ABSENT};

/// One node of the patricia trie.
///
/// Invariants (checked on decode, maintained by construction elsewhere):
///
/// - `first_chars` is sorted and holds exactly one character per child;
///   `first_chars[i]` is the first character of `children[i]`'s prefix
/// - a node with no value and zero children is invalid and is removed by
///   its parent
/// - a node with no value and exactly one child is collapsed into that
///   child, prefixes concatenated
#[derive(Clone, Debug)]
pub struct PatriciaNode {
    /// Key segment exclusive to this node (includes its own first char).
    pub own_prefix: String,
    /// One character per child, sorted, in lock-step with `children`.
    pub first_chars: Vec<char>,
    /// Child subtrees, hash-linked through the object graph.
    pub children: Vec<Arc<ObjectRef<PatriciaNode>>>,
    /// Value stored at the key this node completes, if any.
    pub value: Option<String>,
}

impl PatriciaNode {
    /// A leaf holding `value` at the remaining key segment `prefix`.
    pub fn leaf(prefix: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            own_prefix: prefix.into(),
            first_chars: Vec::new(),
            children: Vec::new(),
            value: Some(value.into()),
        }
    }

    /// Binary search for the child whose subtree starts with `c`.
    pub fn child_index(&self, c: char) -> Result<usize, usize> {
        self.first_chars.binary_search(&c)
    }

    /// Encode to the four-field wire form under `cfg`.
    pub fn encode(&self, cfg: WireConfig) -> String {
        let first: String = self.first_chars.iter().collect();
        let hashes: Vec<String> = self.children.iter().map(|c| c.hash().to_hex()).collect();
        let value = match &self.value {
            Some(v) => escape(v),
            None => VALUE_ABSENT.to_string(),
        };
        let p = cfg.primary;
        format!(
            "{}{p}{}{p}{}{p}{}",
            escape(&self.own_prefix),
            escape(&first),
            hashes.join(&cfg.secondary.to_string()),
            value,
        )
    }

    /// Exact inverse of [`PatriciaNode::encode`]. Child references are
    /// rebuilt through `graph` so deduplication applies.
    pub fn decode(text: &str, cfg: WireConfig, graph: &ObjectGraph) -> TrieResult<Self> {
        let fields: Vec<&str> = text.split(cfg.primary).collect();
        if fields.len() != 4 {
            return Err(TrieError::MalformedNode(format!(
                "expected 4 fields, got {}",
                fields.len()
            )));
        }
        let own_prefix = unescape(fields[0])?;
        let first_chars: Vec<char> = unescape(fields[1])?.chars().collect();
        // An empty child field is an empty child list, not one empty hash.
        let children = if fields[2].is_empty() {
            Vec::new()
        } else {
            fields[2]
                .split(cfg.secondary)
                .map(|h| {
                    let hash =
                        ContentHash::from_hex(h).map_err(|e| TrieError::MalformedNode(e.to_string()))?;
                    graph
                        .from_hash::<PatriciaNode>(hash)
                        .map_err(TrieError::from)
                })
                .collect::<TrieResult<Vec<_>>>()?
        };
        let value = if fields[3] == VALUE_ABSENT.to_string() {
            None
        } else {
            Some(unescape(fields[3])?)
        };
        let node = Self {
            own_prefix,
            first_chars,
            children,
            value,
        };
        node.validate()?;
        Ok(node)
    }

    /// Check the structural invariants.
    pub fn validate(&self) -> TrieResult<()> {
        if self.first_chars.len() != self.children.len() {
            return Err(TrieError::InvariantViolated(format!(
                "{} first chars for {} children",
                self.first_chars.len(),
                self.children.len()
            )));
        }
        if self.first_chars.windows(2).any(|w| w[0] >= w[1]) {
            return Err(TrieError::InvariantViolated(
                "first chars not sorted or not unique".into(),
            ));
        }
        if self.value.is_none() && self.children.len() < 2 {
            return Err(TrieError::InvariantViolated(
                "valueless node with fewer than two children".into(),
            ));
        }
        Ok(())
    }
}

impl Record for PatriciaNode {
    fn serialize(&self) -> String {
        self.encode(WireConfig::default())
    }

    fn deserialize(text: &str, graph: &ObjectGraph) -> StoreResult<Self> {
        Ok(Self::decode(text, WireConfig::default(), graph)?)
    }

    fn containment_refs(&self) -> Vec<DynRef> {
        self.children.iter().map(|c| c.clone() as DynRef).collect()
    }

    fn diff(&self, old: &Self, graph: &ObjectGraph) -> StoreResult<Vec<DynRef>> {
        // Children pair by first char. A changed pair recurses; a new child
        // with no counterpart contributes its whole subtree.
        let mut out = Vec::new();
        for (i, c) in self.first_chars.iter().enumerate() {
            let child = &self.children[i];
            match old.first_chars.binary_search(c) {
                Ok(j) if old.children[j].hash() == child.hash() => {}
                Ok(j) => {
                    out.push(child.clone() as DynRef);
                    let old_child: DynRef = old.children[j].clone();
                    out.extend(child.diff_below(&old_child, graph)?);
                }
                Err(_) => {
                    let subtree: DynRef = child.clone();
                    out.extend(graph.containment_subtree(&subtree)?);
                }
            }
        }
        Ok(out)
    }
}
