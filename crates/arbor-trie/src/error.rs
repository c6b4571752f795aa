use arbor_store::StoreError;

/// Errors from trie operations.
#[derive(Debug, thiserror::Error)]
pub enum TrieError {
    /// Failure in the underlying object graph or backing store.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A serialized node does not have the expected shape.
    #[error("malformed node: {0}")]
    MalformedNode(String),

    /// An escape sequence in a serialized field cannot be decoded.
    #[error("invalid escape sequence in {0:?}")]
    InvalidEscape(String),

    /// A decoded node violates a structural invariant.
    #[error("node invariant violated: {0}")]
    InvariantViolated(String),

    /// A wire configuration names an unusable separator.
    #[error("invalid wire config: {0}")]
    InvalidConfig(String),
}

/// Result alias for trie operations.
pub type TrieResult<T> = Result<T, TrieError>;

// Lets trie decoding errors surface through the `Record` plumbing, which
// speaks `StoreError`.
impl From<TrieError> for StoreError {
    fn from(e: TrieError) -> Self {
        match e {
            TrieError::Store(inner) => inner,
            other => StoreError::Serialization(other.to_string()),
        }
    }
}
