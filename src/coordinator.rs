//! `Coordinator`: the pool registry, invalidation bus, and 2PC driving surface at the center of
//! this crate (spec §4.3).
//!
//! Grounded on `pool/connection_pool.rs`'s overall shape (one struct owning a registry behind a
//! single lock) and `transaction/manager.rs`'s bootstrap-sequencing style.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::activity_monitor::{ActivityMonitor, ConnectionInfo};
use crate::common::{NamespaceTag, Oid, Tid, ROOT_OID};
use crate::connection::{Connection, ObjectState};
use crate::error::{CoordinatorError, Result};
use crate::miv_cache::ModifiedInVersionCache;
use crate::pool::ConnectionPool;
use crate::storage::{Payload, Storage};
use crate::transaction::{
    AbortVersionResourceManager, CommitVersionResourceManager, ResourceManager, Transaction,
    TransactionManager, TransactionalUndoResourceManager,
};

/// Tunables consumed by `Coordinator::new` (spec §4.9). No file or environment loader is
/// provided here — only the programmatic surface.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub default_pool_size: usize,
    pub namespace_pool_size: usize,
    pub default_cache_size: usize,
    pub namespace_cache_size: usize,
    /// Deprecated; has no effect. Accepted only so old call sites that still pass it compile,
    /// mirroring the `cache_deactivate_after` constructor kwarg (spec §7 "deprecated-parameter").
    pub cache_deactivate_after: Option<u64>,
    /// Deprecated; has no effect. See `cache_deactivate_after`.
    pub namespace_cache_deactivate_after: Option<u64>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        CoordinatorConfig {
            default_pool_size: 7,
            namespace_pool_size: 7,
            default_cache_size: 400,
            namespace_cache_size: 400,
            cache_deactivate_after: None,
            namespace_cache_deactivate_after: None,
        }
    }
}

impl CoordinatorConfig {
    pub fn builder() -> CoordinatorConfigBuilder {
        CoordinatorConfigBuilder::default()
    }
}

#[derive(Default)]
pub struct CoordinatorConfigBuilder {
    config: CoordinatorConfig,
}

impl CoordinatorConfigBuilder {
    pub fn default_pool_size(mut self, n: usize) -> Self {
        self.config.default_pool_size = n;
        self
    }

    pub fn namespace_pool_size(mut self, n: usize) -> Self {
        self.config.namespace_pool_size = n;
        self
    }

    pub fn default_cache_size(mut self, n: usize) -> Self {
        self.config.default_cache_size = n;
        self
    }

    pub fn namespace_cache_size(mut self, n: usize) -> Self {
        self.config.namespace_cache_size = n;
        self
    }

    /// Deprecated; has no effect. The value is accepted only so the builder call compiles;
    /// `Coordinator::new` logs a deprecation notice and cache GC never reads it back (spec §7).
    pub fn cache_deactivate_after(mut self, seconds: u64) -> Self {
        self.config.cache_deactivate_after = Some(seconds);
        self
    }

    /// Deprecated; has no effect. See `cache_deactivate_after`.
    pub fn namespace_cache_deactivate_after(mut self, seconds: u64) -> Self {
        self.config.namespace_cache_deactivate_after = Some(seconds);
        self
    }

    pub fn build(self) -> CoordinatorConfig {
        self.config
    }
}

/// One row of `Coordinator::cache_extreme_detail`'s per-object report.
#[derive(Debug, Clone)]
pub struct ExtremeDetailRecord {
    /// Position of this object's owning connection in the combined report, counted across every
    /// pool (not reset per namespace) so it identifies a single connection in the aggregate.
    pub conn_no: usize,
    pub oid: Oid,
    /// The object's application-level name, distinct from `klass`.
    pub id: String,
    pub klass: String,
    pub state: ObjectState,
    /// A cache-local retention count: 1 for any non-ghost entry. Python's true external refcount
    /// (minus the cache's own hold and the iteration frame) has no analogue once the cache no
    /// longer owns a GC-traced object graph, so this is deliberately simplified rather than
    /// faked (see DESIGN.md).
    pub rc: usize,
}

#[derive(Serialize, Deserialize)]
struct RootPayload {
    class: &'static str,
    state: serde_json::Value,
}

/// Parses a payload written by this crate's root-bootstrap or test fixtures and extracts the
/// oids it references, for `pack`'s reachability trace. Payloads from other sources that are
/// not valid JSON, or that have no `refs` array, are treated as leaves (no outgoing references).
fn default_reference_extractor(payload: &Payload) -> Vec<Oid> {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(payload) else {
        return Vec::new();
    };
    value
        .get("refs")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_u64())
                .map(Oid::new)
                .collect()
        })
        .unwrap_or_default()
}

struct CoordinatorState {
    pools: HashMap<NamespaceTag, ConnectionPool>,
    miv_cache: ModifiedInVersionCache,
    default_pool_size: usize,
    namespace_pool_size: usize,
    default_cache_size: usize,
    namespace_cache_size: usize,
}

/// The Database Coordinator: multiplexes application sessions onto connection pools, fans out
/// invalidations, and drives 2PC resource managers against `storage` (spec §1).
pub struct Coordinator {
    storage: Arc<dyn Storage>,
    activity_monitor: Option<Arc<dyn ActivityMonitor>>,
    /// The single mutex `L` serializing all coordinator mutation (spec §5).
    state: Mutex<CoordinatorState>,
}

impl Coordinator {
    /// Registers with `storage`, then bootstraps the root object if missing (spec §4.3.1).
    pub fn new(
        storage: Arc<dyn Storage>,
        config: CoordinatorConfig,
        activity_monitor: Option<Arc<dyn ActivityMonitor>>,
    ) -> Result<Arc<Self>> {
        storage.register_coordinator("dbcoord", "")?;

        if config.cache_deactivate_after.is_some() || config.namespace_cache_deactivate_after.is_some()
        {
            tracing::warn!("cache_deactivate_after has no effect");
        }

        if storage.load(ROOT_OID, "")?.is_none() {
            Self::bootstrap_root(storage.as_ref())?;
        }

        Ok(Arc::new(Coordinator {
            storage,
            activity_monitor,
            state: Mutex::new(CoordinatorState {
                pools: HashMap::new(),
                miv_cache: ModifiedInVersionCache::new(),
                default_pool_size: config.default_pool_size,
                namespace_pool_size: config.namespace_pool_size,
                default_cache_size: config.default_cache_size,
                namespace_cache_size: config.namespace_cache_size,
            }),
        }))
    }

    fn bootstrap_root(storage: &dyn Storage) -> Result<()> {
        let payload = serde_json::to_vec(&RootPayload {
            class: "persistent.mapping.PersistentMapping",
            state: serde_json::json!({}),
        })
        .map_err(|e| CoordinatorError::Internal(e.to_string()))?;

        let txn = storage.begin_transaction_id();
        let result = (|| -> Result<()> {
            storage.tpc_begin(txn)?;
            storage.store(ROOT_OID, None, payload, "", txn)?;
            storage.tpc_vote(txn)?;
            storage.tpc_finish(txn)?;
            Ok(())
        })();

        if result.is_err() {
            let _ = storage.tpc_abort(txn);
        }
        result
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    fn pool_size_for(state: &CoordinatorState, namespace: &str) -> usize {
        if namespace.is_empty() {
            state.default_pool_size
        } else {
            state.namespace_pool_size
        }
    }

    fn cache_size_for(state: &CoordinatorState, namespace: &str) -> usize {
        if namespace.is_empty() {
            state.default_cache_size
        } else {
            state.namespace_cache_size
        }
    }

    /// Opens a connection for `namespace`, reusing an idle one if available or constructing and
    /// admitting a new one otherwise (spec §4.3.2).
    pub fn open(
        self: &Arc<Self>,
        namespace: NamespaceTag,
        mvcc: bool,
        txn_mgr: Option<Arc<dyn TransactionManager>>,
        synch: bool,
    ) -> Result<Arc<Connection>> {
        let mut state = self.state.lock();

        let pool_size = Self::pool_size_for(&state, &namespace);
        let cache_size = Self::cache_size_for(&state, &namespace);
        let pool = state
            .pools
            .entry(namespace.clone())
            .or_insert_with(|| ConnectionPool::new(pool_size));

        if pool.num_available() == 0 {
            let conn = Connection::new(namespace.clone(), cache_size);
            pool.push(conn);
        }

        let result = pool
            .pop()
            .expect("a connection was just admitted if none were available");

        result.attach(self, mvcc, txn_mgr, synch);

        #[cfg(debug_assertions)]
        {
            for (other_namespace, other_pool) in state.pools.iter_mut() {
                if other_namespace == &namespace {
                    continue;
                }
                debug_assert!(
                    !other_pool
                        .all_as_list()
                        .iter()
                        .any(|c| Arc::ptr_eq(c, &result)),
                    "connection reachable from two namespace pools simultaneously"
                );
            }
        }

        // Opportunistic GC (spec §4.3.2 step 5): every live connection in every pool, not just
        // the one just handed out.
        for pool in state.pools.values_mut() {
            for conn in pool.all_as_list() {
                conn.cache_gc();
            }
        }

        Ok(result)
    }

    /// Called back by a `Connection`'s user-level close (spec §4.3.3).
    pub fn close_connection(self: &Arc<Self>, c: Arc<Connection>) {
        let mut state = self.state.lock();

        debug_assert!(c.owned_by(self), "close_connection: connection not owned by this coordinator");
        c.detach();

        if let Some(monitor) = &self.activity_monitor {
            monitor.closed(&ConnectionInfo {
                namespace: c.namespace().to_string(),
                non_ghost_count: c.cache().non_ghost_count(),
            });
        }

        match state.pools.get_mut(c.namespace()) {
            Some(pool) => pool.repush(c),
            // The namespace pool was removed while this connection was checked out (spec §7
            // "missing-namespace-pool": silently tolerated). Dropping `c` here releases the
            // coordinator's only strong reference to it.
            None => {}
        }
    }

    /// Broadcasts an invalidation to every live connection matching `namespace`, excluding
    /// `origin` (spec §4.3.4). `origin.is_some()` overrides `namespace` with the origin
    /// connection's own namespace.
    pub fn invalidate(
        &self,
        tid: Tid,
        oids: &[Oid],
        origin: Option<&Arc<Connection>>,
        namespace: NamespaceTag,
    ) {
        let namespace = match origin {
            Some(conn) => conn.namespace().to_string(),
            None => namespace,
        };

        let mut state = self.state.lock();
        for oid in oids {
            state.miv_cache.evict(*oid);
        }

        for pool in state.pools.values_mut() {
            for cc in pool.all_as_list() {
                if let Some(origin_conn) = origin {
                    if Arc::ptr_eq(&cc, origin_conn) {
                        continue;
                    }
                }
                if namespace.is_empty() || cc.namespace() == namespace {
                    cc.invalidate(tid, oids);
                }
            }
        }
    }

    /// Looks up which namespace last modified `oid`, consulting the fixed-bucket cache first
    /// (spec §4.3.5).
    pub fn modified_in_namespace(&self, oid: Oid) -> Result<NamespaceTag> {
        let mut state = self.state.lock();
        if let Some(tag) = state.miv_cache.get(oid) {
            return Ok(tag.clone());
        }
        let tag = self.storage.modified_in_namespace(oid)?;
        state.miv_cache.put(oid, tag.clone());
        Ok(tag)
    }

    pub fn set_default_pool_size(&self, n: usize) {
        let mut state = self.state.lock();
        state.default_pool_size = n;
        for (namespace, pool) in state.pools.iter_mut() {
            if namespace.is_empty() {
                pool.set_target_size(n);
            }
        }
    }

    pub fn get_default_pool_size(&self) -> usize {
        self.state.lock().default_pool_size
    }

    pub fn set_namespace_pool_size(&self, n: usize) {
        let mut state = self.state.lock();
        state.namespace_pool_size = n;
        for (namespace, pool) in state.pools.iter_mut() {
            if !namespace.is_empty() {
                pool.set_target_size(n);
            }
        }
    }

    pub fn get_namespace_pool_size(&self) -> usize {
        self.state.lock().namespace_pool_size
    }

    pub fn set_default_cache_size(&self, v: usize) {
        let mut state = self.state.lock();
        state.default_cache_size = v;
        if let Some(pool) = state.pools.get_mut("") {
            for conn in pool.all_as_list() {
                conn.cache().set_cache_size(v);
            }
        }
    }

    pub fn set_namespace_cache_size(&self, v: usize) {
        let mut state = self.state.lock();
        state.namespace_cache_size = v;
        for (namespace, pool) in state.pools.iter_mut() {
            if !namespace.is_empty() {
                for conn in pool.all_as_list() {
                    conn.cache().set_cache_size(v);
                }
            }
        }
    }

    /// Drops a namespace pool from the registry. Connections currently checked out of it are
    /// discarded (not repushed) on their next close (spec §4.3.6).
    pub fn remove_namespace_pool(&self, tag: &str) {
        self.state.lock().pools.remove(tag);
    }

    // -- Deprecated, no-op accessors (spec §7 "deprecated-parameter") --
    //
    // `cache_deactivate_after` predates this coordinator's GC model and has had no effect since;
    // these four exist only so callers ported from that era keep compiling, matching the
    // original's four equally inert getter/setter pairs.

    /// Deprecated; has no effect. Always logs a notice and returns `None`.
    pub fn get_cache_deactivate_after(&self) -> Option<u64> {
        tracing::warn!("cache_deactivate_after has no effect");
        None
    }

    /// Deprecated; has no effect. `v` is accepted and ignored.
    pub fn set_cache_deactivate_after(&self, _v: u64) {
        tracing::warn!("cache_deactivate_after has no effect");
    }

    /// Deprecated; has no effect. Always logs a notice and returns `None`.
    pub fn get_namespace_cache_deactivate_after(&self) -> Option<u64> {
        tracing::warn!("cache_deactivate_after has no effect");
        None
    }

    /// Deprecated; has no effect. `v` is accepted and ignored.
    pub fn set_namespace_cache_deactivate_after(&self, _v: u64) {
        tracing::warn!("cache_deactivate_after has no effect");
    }

    /// Packs storage down to `now - days*86400`. Runs with no coordinator lock held; storage is
    /// responsible for its own concurrency (spec §4.3.7).
    pub fn pack(&self, now: SystemTime, days: u64) -> Result<()> {
        let target_time = now - Duration::from_secs(days * 86_400);
        self.storage.pack(target_time, &default_reference_extractor).map_err(|e| {
            tracing::error!(error = %e, days, "pack failed");
            e
        })
    }

    /// Sum of `non_ghost_count` across every live connection (spec §4.3.8).
    pub fn cache_size(&self) -> usize {
        let mut state = self.state.lock();
        state
            .pools
            .values_mut()
            .flat_map(|pool| pool.all_as_list())
            .map(|conn| conn.cache().non_ghost_count())
            .sum()
    }

    /// Live object counts keyed by class-qualified name, aggregated across every connection.
    pub fn cache_detail(&self) -> HashMap<String, usize> {
        let mut state = self.state.lock();
        let mut detail = HashMap::new();
        for pool in state.pools.values_mut() {
            for conn in pool.all_as_list() {
                for item in conn.cache().items() {
                    if item.state != ObjectState::Ghost {
                        *detail.entry(item.klass.clone()).or_insert(0) += 1;
                    }
                }
            }
        }
        detail
    }

    /// Per-object records across every connection (spec §4.3.8). `conn_no` is a single counter
    /// run across every pool, not reset per namespace, so it identifies one connection in the
    /// combined report.
    pub fn cache_extreme_detail(&self) -> Vec<ExtremeDetailRecord> {
        let mut state = self.state.lock();
        let mut records = Vec::new();
        let mut conn_no = 0usize;
        for pool in state.pools.values_mut() {
            for conn in pool.all_as_list() {
                for item in conn.cache().items() {
                    records.push(ExtremeDetailRecord {
                        conn_no,
                        oid: item.oid,
                        id: item.id,
                        klass: item.klass,
                        state: item.state,
                        rc: if item.state == ObjectState::Ghost { 0 } else { 1 },
                    });
                }
                conn_no += 1;
            }
        }
        records
    }

    pub fn cache_full_sweep(&self) {
        let mut state = self.state.lock();
        for pool in state.pools.values_mut() {
            for conn in pool.all_as_list() {
                conn.cache().full_sweep();
            }
        }
    }

    pub fn cache_minimize(&self) {
        let mut state = self.state.lock();
        for pool in state.pools.values_mut() {
            for conn in pool.all_as_list() {
                conn.cache().minimize();
            }
        }
    }

    // -- Storage pass-throughs (spec §6: surfaced verbatim) --

    pub fn supports_undo(&self) -> bool {
        self.storage.supports_undo()
    }

    pub fn supports_namespaces(&self) -> bool {
        self.storage.supports_namespaces()
    }

    pub fn namespace_empty(&self, namespace: &str) -> Result<bool> {
        self.storage.namespace_empty(namespace)
    }

    pub fn namespaces(&self) -> Result<Vec<NamespaceTag>> {
        self.storage.namespaces()
    }

    pub fn history(&self, oid: Oid, limit: usize) -> Result<Vec<Tid>> {
        self.storage.history(oid, limit)
    }

    pub fn undo_log(&self, first: usize, last: usize) -> Result<Vec<String>> {
        self.storage.undo_log(first, last)
    }

    pub fn undo_info(&self, first: usize, last: usize) -> Result<Vec<String>> {
        self.storage.undo_info(first, last)
    }

    pub fn last_transaction(&self) -> Result<Tid> {
        self.storage.last_transaction()
    }

    pub fn get_name(&self) -> String {
        self.storage.get_name()
    }

    pub fn get_size(&self) -> Result<u64> {
        self.storage.get_size()
    }

    // -- Database-level 2PC operations (spec §4.4) --

    /// Registers a `CommitVersion` resource manager on `txn_mgr`'s current transaction, drives
    /// its 2PC, and fans out the resulting invalidation(s).
    pub fn commit_namespace(
        &self,
        source: NamespaceTag,
        dest: NamespaceTag,
        txn_mgr: &dyn TransactionManager,
    ) -> Result<()> {
        let resource = CommitVersionResourceManager::new(self.storage.clone(), source, dest);
        self.drive_resource(Arc::new(resource), txn_mgr)
    }

    pub fn abort_namespace(
        &self,
        namespace: NamespaceTag,
        txn_mgr: &dyn TransactionManager,
    ) -> Result<()> {
        let resource = AbortVersionResourceManager::new(self.storage.clone(), namespace);
        self.drive_resource(Arc::new(resource), txn_mgr)
    }

    pub fn transactional_undo(&self, undo_id: Tid, txn_mgr: &dyn TransactionManager) -> Result<()> {
        let resource = TransactionalUndoResourceManager::new(self.storage.clone(), undo_id);
        self.drive_resource(Arc::new(resource), txn_mgr)
    }

    fn drive_resource(
        &self,
        resource: Arc<dyn ResourceManager>,
        txn_mgr: &dyn TransactionManager,
    ) -> Result<()> {
        let txn = txn_mgr.current();
        txn.register(resource);
        let invalidations = txn.commit()?;
        for invalidation in invalidations {
            self.invalidate(invalidation.tid, &invalidation.oids, None, invalidation.namespace);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;
    use crate::transaction::LocalTransactionManager;

    fn coordinator(pool_size: usize) -> Arc<Coordinator> {
        let storage = Arc::new(InMemoryStorage::new("mem"));
        Coordinator::new(
            storage,
            CoordinatorConfig::builder()
                .default_pool_size(pool_size)
                .namespace_pool_size(pool_size)
                .build(),
            None,
        )
        .unwrap()
    }

    #[test]
    fn bootstrap_creates_root_object() {
        let coord = coordinator(5);
        let root = coord.storage().load(ROOT_OID, "").unwrap();
        assert!(root.is_some());
    }

    #[test]
    fn warm_cache_reuse() {
        let coord = coordinator(2);
        let c1 = coord.open(String::new(), false, None, true).unwrap();
        coord.close_connection(c1.clone());
        let c2 = coord.open(String::new(), false, None, true).unwrap();
        assert!(Arc::ptr_eq(&c1, &c2));
    }

    #[test]
    fn lifo_reuse_order() {
        let coord = coordinator(5);
        let c1 = coord.open(String::new(), false, None, true).unwrap();
        let c2 = coord.open(String::new(), false, None, true).unwrap();
        coord.close_connection(c1.clone());
        coord.close_connection(c2.clone());
        let c3 = coord.open(String::new(), false, None, true).unwrap();
        assert!(Arc::ptr_eq(&c2, &c3));
    }

    #[test]
    fn overflow_eviction() {
        let coord = coordinator(1);
        let c1 = coord.open(String::new(), false, None, true).unwrap();
        let c2 = coord.open(String::new(), false, None, true).unwrap();
        coord.close_connection(c1.clone());
        coord.close_connection(c2.clone());

        let mut state = coord.state.lock();
        let pool = state.pools.get_mut("").unwrap();
        let all = pool.all_as_list();
        assert_eq!(all.len(), 1);
        assert!(Arc::ptr_eq(&all[0], &c2));
    }

    #[test]
    fn cross_namespace_invalidation() {
        let coord = coordinator(5);
        let c_main = coord.open(String::new(), false, None, true).unwrap();
        let c_v = coord.open("v".to_string(), false, None, true).unwrap();

        c_main.cache().record(Oid(1), "k1", "K", ObjectState::UpToDate, None);
        c_v.cache().record(Oid(1), "k1", "K", ObjectState::UpToDate, None);

        // Mainline-origin invalidation reaches every other connection, but never the origin.
        coord.invalidate(10, &[Oid(1)], Some(&c_main), String::new());
        assert_eq!(c_main.cache().items()[0].state, ObjectState::UpToDate);
        assert_eq!(c_v.cache().items()[0].state, ObjectState::Ghost);

        c_main.cache().record(Oid(1), "k1", "K", ObjectState::UpToDate, None);
        c_v.cache().record(Oid(2), "k2", "K", ObjectState::UpToDate, None);

        // A namespaced-origin invalidation is confined to that namespace.
        coord.invalidate(11, &[Oid(2)], Some(&c_v), "v".to_string());
        assert_eq!(c_main.cache().items()[0].state, ObjectState::UpToDate);
    }

    #[test]
    fn dropped_namespace_discards_connection_on_close() {
        let coord = coordinator(5);
        let c = coord.open("v".to_string(), false, None, true).unwrap();
        coord.remove_namespace_pool("v");
        coord.close_connection(c.clone());
        assert!(!c.is_owned());
        // No pool exists to hold it; the only remaining strong reference is `c` itself.
        assert!(coord.state.lock().pools.get("v").is_none());
    }

    #[test]
    fn commit_namespace_moves_and_invalidates() {
        let coord = coordinator(5);
        let tm = LocalTransactionManager::new();
        // Exercising `Coordinator::commit_namespace` end-to-end requires data staged in the
        // source namespace first.
        let storage = coord.storage().clone();
        let txn_id = storage.begin_transaction_id();
        storage.tpc_begin(txn_id).unwrap();
        storage
            .store(Oid(99), None, b"{}".to_vec(), "scratch", txn_id)
            .unwrap();
        storage.tpc_finish(txn_id).unwrap();

        coord
            .commit_namespace("scratch".to_string(), String::new(), &tm)
            .unwrap();
        assert!(storage.load(Oid(99), "").unwrap().is_some());
    }

    #[test]
    fn cache_extreme_detail_conn_no_is_unique_across_pools() {
        let coord = coordinator(5);
        let c_main = coord.open(String::new(), false, None, true).unwrap();
        let c_v = coord.open("v".to_string(), false, None, true).unwrap();
        c_main.cache().record(Oid(1), "doc1", "Folder", ObjectState::UpToDate, None);
        c_v.cache().record(Oid(2), "doc2", "Folder", ObjectState::UpToDate, None);

        let records = coord.cache_extreme_detail();
        assert_eq!(records.len(), 2);
        let conn_nos: std::collections::HashSet<usize> = records.iter().map(|r| r.conn_no).collect();
        assert_eq!(
            conn_nos.len(),
            2,
            "two connections in different namespace pools must not share a conn_no"
        );
        let ids: std::collections::HashSet<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert!(ids.contains("doc1"));
        assert!(ids.contains("doc2"));
    }

    #[test]
    fn deprecated_cache_deactivate_after_is_accepted_and_ignored() {
        let storage = Arc::new(InMemoryStorage::new("mem"));
        let config = CoordinatorConfig::builder()
            .cache_deactivate_after(60)
            .namespace_cache_deactivate_after(60)
            .build();
        // Construction must succeed despite the deprecated parameters being set.
        let coord = Coordinator::new(storage, config, None).unwrap();

        coord.set_cache_deactivate_after(30);
        coord.set_namespace_cache_deactivate_after(30);
        assert_eq!(coord.get_cache_deactivate_after(), None);
        assert_eq!(coord.get_namespace_cache_deactivate_after(), None);
    }

    #[test]
    fn namespaces_pass_through_reaches_storage() {
        let coord = coordinator(5);
        let storage = coord.storage().clone();
        let txn = storage.begin_transaction_id();
        storage.tpc_begin(txn).unwrap();
        storage.store(Oid(5), None, b"{}".to_vec(), "draft", txn).unwrap();
        storage.tpc_finish(txn).unwrap();

        assert_eq!(coord.namespaces().unwrap(), vec!["draft".to_string()]);
    }

    #[test]
    fn pool_size_round_trip() {
        let coord = coordinator(3);
        coord.set_default_pool_size(9);
        assert_eq!(coord.get_default_pool_size(), 9);
    }
}
