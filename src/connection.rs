//! `Connection`: a client-side session holding an object cache over one namespace (spec §3).
//!
//! The cache implemented here is intentionally minimal — it exists to give the coordinator's
//! invalidation and cache-inspection contract something real to drive, not to be a tuned LRU.
//! Eviction *policy* inside the cache is explicitly out of scope (spec §1).

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::SystemTime;

use parking_lot::Mutex;

use crate::common::{NamespaceTag, Oid, Tid};
use crate::coordinator::Coordinator;
use crate::transaction::TransactionManager;

/// Lifecycle state of one cached object, mirroring the ghost/real-object distinction ZODB-style
/// object caches use: a ghost has an identity and class but no materialized state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectState {
    /// Identity known, state not loaded (or evicted).
    Ghost,
    /// State loaded and unmodified relative to the last-seen transaction.
    UpToDate,
    /// State loaded and modified by the application, not yet committed.
    Changed,
}

/// A snapshot record of one cached object, as returned by `ObjectCache::items` and surfaced in
/// `Coordinator::cache_extreme_detail`.
#[derive(Debug, Clone)]
pub struct CacheItem {
    pub oid: Oid,
    /// The object's application-level name (ZODB's `ob.__dict__['id']`/`__name__`), distinct
    /// from `klass`, the class it is an instance of.
    pub id: String,
    pub klass: String,
    pub state: ObjectState,
    /// Last transaction id this object's state was refreshed at, if known.
    pub last_tid: Option<Tid>,
}

struct CacheEntry {
    item: CacheItem,
    touched_at: u64,
}

/// A connection's client-side object cache.
pub struct ObjectCache {
    entries: Mutex<HashMap<Oid, CacheEntry>>,
    /// Monotonic touch counter, used to approximate recency without wall-clock timestamps.
    clock: AtomicUsize,
    /// Soft target for `non_ghost_count` after a `minimize()` sweep. Mutable at runtime via
    /// `Coordinator::set_default_cache_size`/`set_namespace_cache_size`.
    cache_size: AtomicUsize,
    last_gc_time: Mutex<Option<SystemTime>>,
}

impl ObjectCache {
    pub fn new(cache_size: usize) -> Self {
        ObjectCache {
            entries: Mutex::new(HashMap::new()),
            clock: AtomicUsize::new(0),
            cache_size: AtomicUsize::new(cache_size),
            last_gc_time: Mutex::new(None),
        }
    }

    /// Total number of cached entries, ghosts included.
    pub fn size(&self) -> usize {
        self.entries.lock().len()
    }

    /// Number of cached entries that are not ghosts (i.e. have materialized state).
    pub fn non_ghost_count(&self) -> usize {
        self.entries
            .lock()
            .values()
            .filter(|e| e.item.state != ObjectState::Ghost)
            .count()
    }

    pub fn cache_size(&self) -> usize {
        self.cache_size.load(Ordering::Relaxed)
    }

    pub fn set_cache_size(&self, size: usize) {
        self.cache_size.store(size, Ordering::Relaxed);
    }

    pub fn last_gc_time(&self) -> Option<SystemTime> {
        *self.last_gc_time.lock()
    }

    /// Records or replaces a loaded object's state, e.g. after an application fetch. `id` is the
    /// object's application-level name, not its class.
    pub fn record(
        &self,
        oid: Oid,
        id: impl Into<String>,
        klass: impl Into<String>,
        state: ObjectState,
        tid: Option<Tid>,
    ) {
        let touched_at = self.clock.fetch_add(1, Ordering::Relaxed) as u64;
        self.entries.lock().insert(
            oid,
            CacheEntry {
                item: CacheItem {
                    oid,
                    id: id.into(),
                    klass: klass.into(),
                    state,
                    last_tid: tid,
                },
                touched_at,
            },
        );
    }

    /// Snapshot of all cached items, in arbitrary order.
    pub fn items(&self) -> Vec<CacheItem> {
        self.entries.lock().values().map(|e| e.item.clone()).collect()
    }

    /// Converts every non-ghost entry to a ghost, releasing its materialized state. The
    /// strongest cache-control primitive: after this call `non_ghost_count() == 0`.
    pub fn full_sweep(&self) {
        for entry in self.entries.lock().values_mut() {
            entry.item.state = ObjectState::Ghost;
        }
    }

    /// Converts the least-recently-touched non-ghost entries to ghosts until `non_ghost_count`
    /// is at or below `cache_size`. Entries in `ObjectState::Changed` (uncommitted local
    /// modifications) are never ghosted — only `minimize` of committed state is safe.
    pub fn minimize(&self) {
        let target = self.cache_size();
        let mut entries = self.entries.lock();
        let mut live: Vec<(Oid, u64)> = entries
            .values()
            .filter(|e| e.item.state == ObjectState::UpToDate)
            .map(|e| (e.item.oid, e.touched_at))
            .collect();
        if live.len() <= target {
            return;
        }
        live.sort_by_key(|(_, touched_at)| *touched_at);
        let excess = live.len() - target;
        for (oid, _) in live.into_iter().take(excess) {
            if let Some(e) = entries.get_mut(&oid) {
                e.item.state = ObjectState::Ghost;
            }
        }
    }

    /// Applies an invalidation: every named oid that is cached and not locally `Changed` is
    /// ghosted so the next access reloads it at `tid`. Unknown oids are ignored.
    pub fn invalidate(&self, _tid: Tid, oids: &[Oid]) {
        let mut entries = self.entries.lock();
        for oid in oids {
            if let Some(e) = entries.get_mut(oid) {
                if e.item.state != ObjectState::Changed {
                    e.item.state = ObjectState::Ghost;
                }
            }
        }
    }

    /// Opportunistic garbage collection, invoked by the coordinator on every `open()` (spec
    /// §4.3.2 step 5). Equivalent to `minimize` plus a recorded timestamp.
    pub fn cache_gc(&self) {
        self.minimize();
        *self.last_gc_time.lock() = Some(SystemTime::now());
    }
}

/// A client-side session over one namespace, holding an `ObjectCache` and (while checked out) a
/// back-reference to the coordinator that owns it.
pub struct Connection {
    namespace: NamespaceTag,
    cache: ObjectCache,
    /// `Some` while checked out to application code, `None` while idle or detached (spec §3
    /// Lifecycle). Weak so the connection never keeps its coordinator alive.
    owner: Mutex<Option<Weak<Coordinator>>>,
    mvcc: Mutex<bool>,
    synch: Mutex<bool>,
    txn_mgr: Mutex<Option<Arc<dyn TransactionManager>>>,
}

impl Connection {
    pub fn new(namespace: NamespaceTag, cache_size: usize) -> Arc<Self> {
        Arc::new(Connection {
            namespace,
            cache: ObjectCache::new(cache_size),
            owner: Mutex::new(None),
            mvcc: Mutex::new(false),
            synch: Mutex::new(true),
            txn_mgr: Mutex::new(None),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn cache(&self) -> &ObjectCache {
        &self.cache
    }

    /// True while this connection is checked out to application code.
    pub fn is_owned(&self) -> bool {
        self.owner.lock().is_some()
    }

    /// Binds this connection to `coordinator` and records the mvcc/transaction-manager/synch
    /// flags passed to `open()` (spec §4.3.2 step 4).
    pub fn attach(
        &self,
        coordinator: &Arc<Coordinator>,
        mvcc: bool,
        txn_mgr: Option<Arc<dyn TransactionManager>>,
        synch: bool,
    ) {
        *self.owner.lock() = Some(Arc::downgrade(coordinator));
        *self.mvcc.lock() = mvcc;
        *self.txn_mgr.lock() = txn_mgr;
        *self.synch.lock() = synch;
    }

    /// Clears the owner back-reference. Called by the coordinator under `L` on detachment
    /// (close, or discard when the namespace pool has been removed).
    pub fn detach(&self) {
        *self.owner.lock() = None;
    }

    /// True if this connection's owner weak-upgrades to `coordinator` specifically. Used by
    /// `Coordinator::close_connection` to assert it isn't closing someone else's connection.
    pub fn owned_by(&self, coordinator: &Arc<Coordinator>) -> bool {
        match &*self.owner.lock() {
            Some(weak) => weak.upgrade().is_some_and(|owner| Arc::ptr_eq(&owner, coordinator)),
            None => false,
        }
    }

    pub fn mvcc(&self) -> bool {
        *self.mvcc.lock()
    }

    pub fn txn_mgr(&self) -> Option<Arc<dyn TransactionManager>> {
        self.txn_mgr.lock().clone()
    }

    /// Forwards an invalidation to this connection's cache.
    pub fn invalidate(&self, tid: Tid, oids: &[Oid]) {
        self.cache.invalidate(tid, oids);
    }

    /// Opportunistic cache GC, as invoked by `Coordinator::open` for every live connection.
    pub fn cache_gc(&self) {
        self.cache.cache_gc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_connection_has_empty_cache() {
        let c = Connection::new(String::new(), 10);
        assert_eq!(c.cache().size(), 0);
        assert!(!c.is_owned());
    }

    #[test]
    fn invalidate_ghosts_matching_entries_only() {
        let c = Connection::new(String::new(), 10);
        c.cache.record(Oid(1), "doc1", "Folder", ObjectState::UpToDate, Some(5));
        c.cache.record(Oid(2), "doc2", "Folder", ObjectState::UpToDate, Some(5));
        c.invalidate(6, &[Oid(1)]);
        let items: HashMap<_, _> = c.cache.items().into_iter().map(|i| (i.oid, i.state)).collect();
        assert_eq!(items[&Oid(1)], ObjectState::Ghost);
        assert_eq!(items[&Oid(2)], ObjectState::UpToDate);
    }

    #[test]
    fn invalidate_does_not_clobber_local_changes() {
        let c = Connection::new(String::new(), 10);
        c.cache.record(Oid(1), "doc1", "Folder", ObjectState::Changed, None);
        c.invalidate(1, &[Oid(1)]);
        assert_eq!(c.cache.items()[0].state, ObjectState::Changed);
    }

    #[test]
    fn minimize_ghosts_oldest_first_down_to_cache_size() {
        let c = Connection::new(String::new(), 1);
        c.cache.record(Oid(1), "k1", "K", ObjectState::UpToDate, None);
        c.cache.record(Oid(2), "k2", "K", ObjectState::UpToDate, None);
        c.cache.minimize();
        assert_eq!(c.cache.non_ghost_count(), 1);
        let items: HashMap<_, _> = c.cache.items().into_iter().map(|i| (i.oid, i.state)).collect();
        assert_eq!(items[&Oid(1)], ObjectState::Ghost);
        assert_eq!(items[&Oid(2)], ObjectState::UpToDate);
    }

    #[test]
    fn full_sweep_ghosts_everything() {
        let c = Connection::new(String::new(), 10);
        c.cache.record(Oid(1), "k1", "K", ObjectState::UpToDate, None);
        c.cache.record(Oid(2), "k2", "K", ObjectState::Changed, None);
        c.cache.full_sweep();
        assert_eq!(c.cache.non_ghost_count(), 0);
    }

    #[test]
    fn attach_then_detach_clears_owner() {
        // Coordinator construction needs a storage + txn manager; exercised fully in
        // coordinator::tests. Here we only check the owner Option plumbing via a dummy Weak.
        let c = Connection::new(String::new(), 10);
        assert!(!c.is_owned());
        *c.owner.lock() = Some(Weak::new());
        assert!(c.is_owned());
        c.detach();
        assert!(!c.is_owned());
    }
}
