//! Content-addressed object graph for the Arbor storage and merge core.
//!
//! Every piece of durable data in Arbor -- patricia nodes, version payloads
//! -- is an immutable record identified by the BLAKE3 hash of its serialized
//! form. This crate provides:
//!
//! - [`KeyValueStore`] -- the schema-oblivious backing-store contract
//!   (`hash -> serialized-string`), with [`InMemoryStore`] as the bundled
//!   backend for tests and embedding
//! - [`Record`] -- the trait a serializable content unit implements:
//!   encoding, reference enumeration (containment vs other), structural diff
//! - [`ObjectRef`] -- a handle to a record in one of three states
//!   (*Created*, *Loaded*, *Unloaded*); transitions are owned exclusively by
//!   [`ObjectGraph`] methods
//! - [`ObjectGraph`] -- deduplication cache, persistence, fetch-on-demand
//!   resolution, and hash-rooted minimal diff
//!
//! # Design Rules
//!
//! 1. Records are immutable once created; a new reference always means a
//!    new hash.
//! 2. Equal serialization implies equal hash, and the converse is treated
//!    as true (collisions are out of scope).
//! 3. One logical hash maps to at most one live reference per graph.
//! 4. Failures are propagated immediately; the graph never retries.

pub mod error;
pub mod graph;
pub mod memory;
pub mod record;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use graph::{ObjectGraph, ObjectRef};
pub use record::{AnyRef, DynRef, Record};
pub use memory::InMemoryStore;
pub use traits::KeyValueStore;
