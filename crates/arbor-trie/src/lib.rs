//! Persistent patricia (radix) trie over the Arbor object graph.
//!
//! An ordered string-keyed map realized as a hash-linked tree: every node
//! is an immutable [`PatriciaNode`] record in the object graph, and every
//! update yields a new root that shares all untouched subtrees with prior
//! versions.
//!
//! # Wire format
//!
//! A node serializes to four fields joined by a separator character:
//! escaped own prefix, escaped first-chars, secondary-separator-joined
//! child hashes, and the escaped value (or the absence marker). The
//! [`escape`] module guarantees that no separator candidate ever appears
//! un-escaped in payload content.

pub mod error;
pub mod escape;
pub mod node;
pub mod trie;

pub use error::{TrieError, TrieResult};
pub use escape::WireConfig;
pub use node::PatriciaNode;
pub use trie::PatriciaTrie;
