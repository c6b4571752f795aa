//! The [`Record`] trait and its type-erased companion [`AnyRef`].
//!
//! A record is an immutable, serializable content unit. Records never
//! compare by structure: equality is defined by content hash. The split
//! between containment references (ownership, traversal, diff recursion)
//! and other references (links that are persisted but not owned) is what
//! lets replication transmit only changed subtrees.

use std::any::Any;
use std::sync::Arc;

use crate::error::StoreResult;
use crate::graph::ObjectGraph;

/// A type-erased, shareable object reference.
pub type DynRef = Arc<dyn AnyRef>;

/// An immutable, serializable content unit stored in the object graph.
pub trait Record: Send + Sync + Sized + 'static {
    /// Serialize this record to its canonical string form. The content
    /// hash is computed over exactly this string.
    fn serialize(&self) -> String;

    /// Decode a record from its serialized form. Child references are
    /// reconstructed through `graph` so deduplication applies.
    fn deserialize(text: &str, graph: &ObjectGraph) -> StoreResult<Self>;

    /// References that define ownership and traversal. Writing a record
    /// recursively writes these; diff recursion and subtree collection
    /// follow them.
    fn containment_refs(&self) -> Vec<DynRef>;

    /// References that are persisted alongside the record but not owned by
    /// it (e.g. a version's parent links).
    fn other_refs(&self) -> Vec<DynRef> {
        Vec::new()
    }

    /// Minimal structural diff against a prior record of the same kind:
    /// the records reachable from `self` that differ from their counterpart
    /// at the same logical position in `old`. The receiver itself is *not*
    /// included; [`ObjectGraph::diff`] adds the top-level reference.
    fn diff(&self, old: &Self, graph: &ObjectGraph) -> StoreResult<Vec<DynRef>>;
}

/// Object-safe view of an [`ObjectRef`] so heterogeneous reference lists
/// (child tables, write queues) can be traversed without knowing the
/// record type.
///
/// [`ObjectRef`]: crate::graph::ObjectRef
pub trait AnyRef: Send + Sync + 'static {
    /// The content hash, computing and caching it first if the reference
    /// is still Created.
    fn hash(&self) -> arbor_types::ContentHash;

    /// Persist this single record if it is Created. Returns the references
    /// it holds (containment then other) when a write actually happened,
    /// `None` for the Loaded/Unloaded no-op case. On backend failure the
    /// reference state is untouched.
    fn write_self(&self, graph: &ObjectGraph) -> StoreResult<Option<Vec<DynRef>>>;

    /// Resolve this reference and return its containment children.
    fn containment_children(&self, graph: &ObjectGraph) -> StoreResult<Vec<DynRef>>;

    /// Structural diff below this reference against `old`, which must wrap
    /// the same record type. The receiver itself is not included.
    fn diff_below(&self, old: &DynRef, graph: &ObjectGraph) -> StoreResult<Vec<DynRef>>;

    /// Downcast support.
    fn as_any(&self) -> &dyn Any;

    /// Downcast support for shared handles.
    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}
