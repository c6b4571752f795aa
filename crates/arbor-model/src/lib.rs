//! The collaborative model tree and its edit operations.
//!
//! A model is a tree of identified nodes stored *in* the patricia trie:
//! keys are 16-hex-digit node ids, values are JSON node payloads, so every
//! snapshot of the model is a trie root reachable through the object graph.
//! Node id 1 is the root and always exists.
//!
//! Edits are expressed as [`Operation`] values and applied immutably via
//! [`ModelTree::apply`], which returns the resulting snapshot or rejects
//! the operation without touching the input.

pub mod error;
pub mod node;
pub mod ops;
pub mod tree;

pub use error::{ModelError, ModelResult};
pub use node::{node_key, ModelNode, NodeId, ROOT_NODE};
pub use ops::Operation;
pub use tree::ModelTree;
