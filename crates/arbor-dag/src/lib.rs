//! The version DAG: immutable, content-addressed versions of the model
//! tree linked by parent references.
//!
//! A version is *root* (no parents), *regular* (one base plus the
//! operation log transforming the base tree into this one), or *merge*
//! (two parents plus the concrete operations actually applied while
//! merging). Version identity is the content hash of its payload.
//!
//! The crate also provides the request-scoped [`LinearHistory`] used by
//! the merger, and the expansion of [`Operation::Undo`] into concrete
//! inverse operations.
//!
//! [`Operation::Undo`]: arbor_model::Operation::Undo

pub mod dag;
pub mod error;
pub mod history;
pub mod undo;
pub mod version;

pub use dag::{ancestor_set, common_base, is_ancestor, leaf_expansion};
pub use error::{DagError, DagResult};
pub use history::{collapse_undo_pairs, HistoryEntry, LinearHistory, VersionOrder};
pub use undo::{expand_ops, invert_version};
pub use version::{Version, VersionRef};
