//! The object graph: deduplication, persistence, resolution, diff.
//!
//! # Reference lifecycle
//!
//! An [`ObjectRef`] is in one of three states:
//!
//! - *Created* -- held only in memory; the hash is computed lazily from the
//!   serialization and cached once computed
//! - *Loaded* -- hash and data both resident
//! - *Unloaded* -- hash known, data not yet fetched
//!
//! Created becomes Loaded exactly once, on first successful persistence.
//! Unloaded becomes Loaded on successful fetch. Loaded never reverts; a
//! fresh reference (see [`ObjectGraph::unload`]) is required for that.
//! No code outside this module constructs or transitions states.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, Weak};

use tracing::{debug, trace};

use arbor_types::ContentHash;

use crate::error::{StoreError, StoreResult};
use crate::record::{AnyRef, DynRef, Record};
use crate::traits::KeyValueStore;

enum RefState<T> {
    Created { data: Arc<T> },
    Loaded { data: Arc<T> },
    Unloaded,
}

/// A handle to a record in the object graph.
///
/// References are never re-pointed: a new reference always represents a new
/// hash. All state transitions go through [`ObjectGraph`] methods.
pub struct ObjectRef<T: Record> {
    state: Mutex<RefState<T>>,
    /// Set eagerly for Loaded/Unloaded refs, lazily for Created ones.
    cached_hash: OnceLock<ContentHash>,
}

impl<T: Record> ObjectRef<T> {
    fn created(data: Arc<T>) -> Self {
        Self {
            state: Mutex::new(RefState::Created { data }),
            cached_hash: OnceLock::new(),
        }
    }

    fn unloaded(hash: ContentHash) -> Self {
        let cached_hash = OnceLock::new();
        let _ = cached_hash.set(hash);
        Self {
            state: Mutex::new(RefState::Unloaded),
            cached_hash,
        }
    }

    /// The content hash, computed and cached on first access for Created
    /// references. A hash is never recomputed once assigned.
    pub fn hash(&self) -> ContentHash {
        if let Some(h) = self.cached_hash.get() {
            return *h;
        }
        let state = self.state.lock().expect("lock poisoned");
        let hash = match &*state {
            RefState::Created { data } => ContentHash::compute(&data.serialize()),
            // Loaded/Unloaded always carry the cached hash.
            RefState::Loaded { .. } | RefState::Unloaded => {
                unreachable!("persisted ref without cached hash")
            }
        };
        *self.cached_hash.get_or_init(|| hash)
    }

    /// Returns `true` if the reference has not been persisted yet.
    pub fn is_created(&self) -> bool {
        matches!(
            &*self.state.lock().expect("lock poisoned"),
            RefState::Created { .. }
        )
    }

    /// Returns `true` if the record data is resident in memory.
    pub fn is_resident(&self) -> bool {
        !matches!(
            &*self.state.lock().expect("lock poisoned"),
            RefState::Unloaded
        )
    }
}

impl<T: Record> PartialEq for ObjectRef<T> {
    fn eq(&self, other: &Self) -> bool {
        self.hash() == other.hash()
    }
}

impl<T: Record> Eq for ObjectRef<T> {}

impl<T: Record> fmt::Debug for ObjectRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.state.lock().expect("lock poisoned") {
            RefState::Created { .. } => "Created",
            RefState::Loaded { .. } => "Loaded",
            RefState::Unloaded => "Unloaded",
        };
        let hash = self
            .cached_hash
            .get()
            .map(|h| h.short_hex())
            .unwrap_or_else(|| "?".into());
        write!(f, "ObjectRef({state}, {hash})")
    }
}

impl<T: Record> AnyRef for ObjectRef<T> {
    fn hash(&self) -> ContentHash {
        ObjectRef::hash(self)
    }

    fn write_self(&self, graph: &ObjectGraph) -> StoreResult<Option<Vec<DynRef>>> {
        let mut state = self.state.lock().expect("lock poisoned");
        let data = match &*state {
            RefState::Created { data } => data.clone(),
            // Writing an already-persisted or not-yet-fetched reference is
            // a no-op, including the recursion below it.
            RefState::Loaded { .. } | RefState::Unloaded => return Ok(None),
        };
        let text = data.serialize();
        let hash = *self.cached_hash.get_or_init(|| ContentHash::compute(&text));
        // On backend failure the state stays Created and the error
        // propagates: no partial commit of a single record.
        graph.store().put(&hash, &text)?;
        *state = RefState::Loaded { data: data.clone() };
        trace!(hash = %hash.short_hex(), "persisted record");

        let mut refs = data.containment_refs();
        refs.extend(data.other_refs());
        Ok(Some(refs))
    }

    fn containment_children(&self, graph: &ObjectGraph) -> StoreResult<Vec<DynRef>> {
        Ok(graph.resolve(self)?.containment_refs())
    }

    fn diff_below(&self, old: &DynRef, graph: &ObjectGraph) -> StoreResult<Vec<DynRef>> {
        let old = old
            .as_any()
            .downcast_ref::<ObjectRef<T>>()
            .ok_or_else(|| StoreError::TypeMismatch(AnyRef::hash(old.as_ref())))?;
        let new_data = graph.resolve(self)?;
        let old_data = graph.resolve(old)?;
        new_data.diff(&old_data, graph)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// The content-addressed object graph.
///
/// Owns the backing store and the per-graph deduplication cache. The cache
/// holds weak entries, so references that nothing else retains are
/// reclaimed without manual bookkeeping. The cache mutex is the only shared
/// mutable state in the crate; registration is an atomic check-and-insert
/// per graph instance, not a process-wide lock.
pub struct ObjectGraph {
    store: Arc<dyn KeyValueStore>,
    cache: Mutex<HashMap<ContentHash, Weak<dyn AnyRef>>>,
}

impl ObjectGraph {
    /// Create a graph over the given backing store.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Arc<Self> {
        Arc::new(Self {
            store,
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// The backing store.
    pub fn store(&self) -> &dyn KeyValueStore {
        self.store.as_ref()
    }

    /// Number of live references currently tracked by the dedup cache.
    pub fn live_refs(&self) -> usize {
        self.cache
            .lock()
            .expect("lock poisoned")
            .values()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    /// Drop cache entries whose references are no longer alive.
    pub fn compact(&self) {
        self.cache
            .lock()
            .expect("lock poisoned")
            .retain(|_, w| w.strong_count() > 0);
    }

    /// Construct (or return the existing live) reference for `hash`.
    ///
    /// At most one live reference exists per hash per graph: lookup and
    /// insert happen under one lock. A live cache entry of a different
    /// record type is a caller bug surfaced as [`StoreError::TypeMismatch`].
    pub fn from_hash<T: Record>(&self, hash: ContentHash) -> StoreResult<Arc<ObjectRef<T>>> {
        let mut cache = self.cache.lock().expect("lock poisoned");
        if let Some(weak) = cache.get(&hash) {
            match weak.upgrade() {
                Some(live) => {
                    return live
                        .as_any_arc()
                        .downcast::<ObjectRef<T>>()
                        .map_err(|_| StoreError::TypeMismatch(hash));
                }
                None => {
                    cache.remove(&hash);
                }
            }
        }
        let r = Arc::new(ObjectRef::<T>::unloaded(hash));
        let erased: Arc<dyn AnyRef> = r.clone();
        cache.insert(hash, Arc::downgrade(&erased));
        trace!(hash = %hash.short_hex(), "new unloaded reference");
        Ok(r)
    }

    /// Wrap freshly built in-memory data in a Created reference. The hash
    /// is computed on first access and cached.
    pub fn from_created<T: Record>(&self, data: T) -> Arc<ObjectRef<T>> {
        Arc::new(ObjectRef::created(Arc::new(data)))
    }

    /// Persist a Created reference and, recursively, every record it
    /// references (containment and other), so the whole reachable subtree
    /// becomes durable. Already-persisted references are a no-op.
    pub fn write(&self, root: &DynRef) -> StoreResult<()> {
        // Explicit work stack: containment chains can be as deep as the
        // tree itself.
        let mut stack = vec![root.clone()];
        let mut written = 0usize;
        while let Some(r) = stack.pop() {
            if let Some(children) = r.write_self(self)? {
                self.register(r.hash(), &r);
                stack.extend(children);
                written += 1;
            }
        }
        debug!(records = written, root = %root.hash().short_hex(), "wrote subtree");
        Ok(())
    }

    /// Typed convenience for [`ObjectGraph::write`].
    pub fn write_ref<T: Record>(&self, r: &Arc<ObjectRef<T>>) -> StoreResult<()> {
        let erased: DynRef = r.clone();
        self.write(&erased)
    }

    fn register(&self, hash: ContentHash, r: &DynRef) {
        let mut cache = self.cache.lock().expect("lock poisoned");
        match cache.get(&hash).and_then(Weak::upgrade) {
            // An equal-hash reference is already live; content addressing
            // makes it interchangeable with the one just written.
            Some(_) => {}
            None => {
                cache.insert(hash, Arc::downgrade(r));
            }
        }
    }

    /// The record's data, fetching from the backing store if Unloaded.
    ///
    /// The per-reference state lock is held across the fetch, so concurrent
    /// resolutions of the same reference coalesce into one underlying read:
    /// late arrivals block briefly and then observe Loaded.
    pub fn resolve<T: Record>(&self, r: &ObjectRef<T>) -> StoreResult<Arc<T>> {
        let mut state = r.state.lock().expect("lock poisoned");
        if let RefState::Created { data } | RefState::Loaded { data } = &*state {
            return Ok(data.clone());
        }
        let hash = *r.cached_hash.get().expect("unloaded ref without hash");
        let text = self.store.get(&hash)?.ok_or(StoreError::NotFound(hash))?;
        let computed = ContentHash::compute(&text);
        if computed != hash {
            return Err(StoreError::Corrupt {
                hash,
                reason: format!("stored data hashes to {}", computed.short_hex()),
            });
        }
        let data = Arc::new(T::deserialize(&text, self)?);
        *state = RefState::Loaded { data: data.clone() };
        trace!(hash = %hash.short_hex(), "resolved record");
        Ok(data)
    }

    /// The record's data if already resident, without fetching. Lets
    /// callers opt out of blocking on the backing store.
    pub fn try_resolve_cached<T: Record>(&self, r: &ObjectRef<T>) -> Option<Arc<T>> {
        match &*r.state.lock().expect("lock poisoned") {
            RefState::Created { data } | RefState::Loaded { data } => Some(data.clone()),
            RefState::Unloaded => None,
        }
    }

    /// Fetch-and-load a batch of references ahead of use (one batched
    /// round-trip to the backing store). Missing hashes are reported as
    /// [`StoreError::NotFound`].
    pub fn prefetch<T: Record>(&self, refs: &[Arc<ObjectRef<T>>]) -> StoreResult<()> {
        let pending: Vec<&Arc<ObjectRef<T>>> = refs.iter().filter(|r| !r.is_resident()).collect();
        if pending.is_empty() {
            return Ok(());
        }
        let hashes: Vec<ContentHash> = pending.iter().map(|r| r.hash()).collect();
        let texts = self.store.get_batch(&hashes)?;
        for (r, text) in pending.into_iter().zip(texts) {
            let hash = r.hash();
            let text = text.ok_or(StoreError::NotFound(hash))?;
            let data = Arc::new(T::deserialize(&text, self)?);
            let mut state = r.state.lock().expect("lock poisoned");
            if matches!(&*state, RefState::Unloaded) {
                *state = RefState::Loaded { data };
            }
        }
        Ok(())
    }

    /// Evict `r`'s hash from the dedup cache and hand back a fresh Unloaded
    /// reference for it. The original reference is unaffected: Loaded never
    /// reverts to Unloaded.
    ///
    /// Unloading a Created reference is illegal -- the only copy of that
    /// data would be lost -- and fails loudly.
    pub fn unload<T: Record>(&self, r: &Arc<ObjectRef<T>>) -> StoreResult<Arc<ObjectRef<T>>> {
        if r.is_created() {
            return Err(StoreError::LifecycleViolation(
                "cannot unload an unpersisted (Created) reference",
            ));
        }
        let hash = r.hash();
        let fresh = Arc::new(ObjectRef::<T>::unloaded(hash));
        let erased: Arc<dyn AnyRef> = fresh.clone();
        let mut cache = self.cache.lock().expect("lock poisoned");
        cache.insert(hash, Arc::downgrade(&erased));
        Ok(fresh)
    }

    /// The minimal set of records that differ between two hash-rooted
    /// trees: empty when the hashes are equal (without inspecting either
    /// subtree), otherwise the new top-level record plus everything its
    /// recursive structural diff reports, deduplicated by hash.
    pub fn diff(&self, new: &DynRef, old: &DynRef) -> StoreResult<Vec<DynRef>> {
        if new.hash() == old.hash() {
            return Ok(Vec::new());
        }
        let mut out = vec![new.clone()];
        out.extend(new.diff_below(old, self)?);
        let mut seen = HashSet::new();
        out.retain(|r| seen.insert(r.hash()));
        Ok(out)
    }

    /// Typed convenience for [`ObjectGraph::diff`].
    pub fn diff_refs<T: Record>(
        &self,
        new: &Arc<ObjectRef<T>>,
        old: &Arc<ObjectRef<T>>,
    ) -> StoreResult<Vec<DynRef>> {
        let new: DynRef = new.clone();
        let old: DynRef = old.clone();
        self.diff(&new, &old)
    }

    /// Collect a reference and its entire containment subtree (a work-stack
    /// walk, deduplicated by hash). Used by record diffs when a whole new
    /// subtree has no counterpart on the old side.
    pub fn containment_subtree(&self, root: &DynRef) -> StoreResult<Vec<DynRef>> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![root.clone()];
        while let Some(r) = stack.pop() {
            if !seen.insert(r.hash()) {
                continue;
            }
            stack.extend(r.containment_children(self)?);
            out.push(r);
        }
        Ok(out)
    }
}

impl fmt::Debug for ObjectGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectGraph")
            .field("live_refs", &self.live_refs())
            .finish()
    }
}
