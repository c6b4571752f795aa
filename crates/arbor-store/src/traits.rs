use arbor_types::ContentHash;

use crate::error::StoreResult;

/// Schema-oblivious backing store for the object graph.
///
/// The store only ever sees `hash -> serialized-string` pairs; it never
/// interprets contents. All implementations must satisfy:
///
/// - Entries are immutable once written: content-addressing guarantees that
///   the same hash always maps to the same string.
/// - `put` of an already-present hash is a no-op (idempotent).
/// - I/O failures are propagated, never silently ignored; the graph layers
///   above never retry internally.
pub trait KeyValueStore: Send + Sync {
    /// Read the serialized form stored under `hash`.
    ///
    /// Returns `Ok(None)` if the entry does not exist.
    fn get(&self, hash: &ContentHash) -> StoreResult<Option<String>>;

    /// Write a serialized record under its content hash.
    fn put(&self, hash: &ContentHash, data: &str) -> StoreResult<()>;

    /// Read multiple entries in a batch.
    ///
    /// Default implementation calls `get()` per hash. Backends may override
    /// to cut round-trips.
    fn get_batch(&self, hashes: &[ContentHash]) -> StoreResult<Vec<Option<String>>> {
        hashes.iter().map(|h| self.get(h)).collect()
    }

    /// Write multiple entries in a batch.
    ///
    /// Default implementation calls `put()` per pair. Backends may override
    /// for a single sync point.
    fn put_batch(&self, entries: &[(ContentHash, String)]) -> StoreResult<()> {
        for (hash, data) in entries {
            self.put(hash, data)?;
        }
        Ok(())
    }
}
