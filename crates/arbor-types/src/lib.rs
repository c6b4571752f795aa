//! Foundation types for the Arbor storage and merge core.
//!
//! Every other Arbor crate depends on this one. It provides:
//!
//! - [`ContentHash`]: the content-addressed identifier (BLAKE3 hash of a
//!   record's serialized form) that every stored object is keyed by
//! - [`TypeError`]: errors from parsing and validating those identifiers

pub mod error;
pub mod hash;

pub use error::TypeError;
pub use hash::ContentHash;
