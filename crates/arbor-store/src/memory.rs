use std::collections::HashMap;
use std::sync::RwLock;

use arbor_types::ContentHash;

use crate::error::StoreResult;
use crate::traits::KeyValueStore;

/// In-memory, `HashMap`-based backing store.
///
/// Intended for tests and embedding. Entries are held behind a `RwLock` for
/// safe concurrent access and cloned on read.
pub struct InMemoryStore {
    entries: RwLock<HashMap<ContentHash, String>>,
}

impl InMemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Number of entries currently stored.
    pub fn len(&self) -> usize {
        self.entries.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().expect("lock poisoned").is_empty()
    }

    /// Returns `true` if `hash` is present.
    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.entries.read().expect("lock poisoned").contains_key(hash)
    }

    /// Remove all entries.
    pub fn clear(&self) {
        self.entries.write().expect("lock poisoned").clear();
    }

    /// A sorted list of all stored hashes.
    pub fn all_hashes(&self) -> Vec<ContentHash> {
        let map = self.entries.read().expect("lock poisoned");
        let mut hashes: Vec<ContentHash> = map.keys().copied().collect();
        hashes.sort();
        hashes
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, hash: &ContentHash) -> StoreResult<Option<String>> {
        let map = self.entries.read().expect("lock poisoned");
        Ok(map.get(hash).cloned())
    }

    fn put(&self, hash: &ContentHash, data: &str) -> StoreResult<()> {
        let mut map = self.entries.write().expect("lock poisoned");
        // Idempotent: same hash always maps to the same content.
        map.entry(*hash).or_insert_with(|| data.to_owned());
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("entry_count", &self.len())
            .finish()
    }
}
