use arbor_types::{ContentHash, TypeError};

/// Errors from object graph and backing store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested hash is absent from the backing store. Recoverable:
    /// the caller may fetch the object from elsewhere and retry.
    #[error("object not found: {0}")]
    NotFound(ContentHash),

    /// A reference was used in a way its lifecycle forbids, e.g. unloading
    /// a Created (unpersisted) reference. Programming error, never ignored.
    #[error("lifecycle violation: {0}")]
    LifecycleViolation(&'static str),

    /// A cached reference for this hash exists with a different record type.
    #[error("record type mismatch for {0}")]
    TypeMismatch(ContentHash),

    /// Fetched data does not decode, or does not match its hash.
    #[error("corrupt object {hash}: {reason}")]
    Corrupt { hash: ContentHash, reason: String },

    /// Record encoding or decoding failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// An invalid content hash embedded in serialized data.
    #[error("invalid hash: {0}")]
    InvalidHash(#[from] TypeError),

    /// Failure reported by the backing store.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
