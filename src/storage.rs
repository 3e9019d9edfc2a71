//! The `Storage` contract the coordinator drives (spec §6), plus `InMemoryStorage`, a reference
//! implementation sufficient for tests and single-process use.
//!
//! Grounded on `storage/mod.rs`'s `StorageEngine` (a narrow, `Result`-returning API wrapping
//! internal locking) and `storage/disk.rs`'s synchronous method style.

use std::collections::HashMap;
use std::time::SystemTime;

use parking_lot::RwLock;

use crate::common::{NamespaceTag, Oid, Tid, TxnId};
use crate::error::{CoordinatorError, Result};

/// An opaque, storage-defined payload. The coordinator never interprets these bytes; it only
/// stores and retrieves them (pickling/serialization format is out of scope, spec §1).
pub type Payload = Vec<u8>;

/// A function that, given an object's payload, returns the oids it references. Used by `pack`
/// to trace reachability from the root. Boxed rather than generic so `Storage::pack` can remain
/// object-safe.
pub type ReferenceExtractor<'a> = &'a dyn Fn(&Payload) -> Vec<Oid>;

/// The backend contract consumed by the coordinator (spec §6).
///
/// Synchronous and `Send + Sync`: the coordinator calls these either while holding no
/// coordinator-level lock (construction, `pack`, 2PC callbacks) so a blocking implementation is
/// safe to plug in directly.
pub trait Storage: Send + Sync {
    /// Loads the current payload and serial for `oid` in `namespace`. Returns `Ok(None)` if the
    /// object does not exist yet — used at bootstrap to detect a missing root (spec §4.3.1).
    fn load(&self, oid: Oid, namespace: &str) -> Result<Option<(Payload, Tid)>>;

    /// Stores a new revision of `oid`. `prev_serial` is the serial the caller last observed
    /// (`None` for a brand-new object); implementations may use it for conflict detection.
    fn store(
        &self,
        oid: Oid,
        prev_serial: Option<Tid>,
        payload: Payload,
        namespace: &str,
        txn: TxnId,
    ) -> Result<()>;

    /// Mints a fresh in-flight transaction id for a caller driving 2PC directly against this
    /// storage (root bootstrap, `LocalTransactionManager`). Distinct from any id scheme storage
    /// uses internally for committed `Tid`s.
    fn begin_transaction_id(&self) -> TxnId;

    fn tpc_begin(&self, txn: TxnId) -> Result<()>;

    /// Historical-compatibility default: storages that have no separate vote phase simply
    /// agree (spec §4.3.1 step 3).
    fn tpc_vote(&self, _txn: TxnId) -> Result<()> {
        Ok(())
    }

    fn tpc_finish(&self, txn: TxnId) -> Result<Tid>;

    fn tpc_abort(&self, txn: TxnId) -> Result<()>;

    /// Reclaims storage for revisions no longer reachable as of `target_time`, tracing
    /// liveness from the root via `extract_refs`.
    fn pack(&self, target_time: SystemTime, extract_refs: ReferenceExtractor<'_>) -> Result<()>;

    /// Commits a namespace's edit buffer into `dest` (the empty string for the mainline).
    /// Returns the resulting transaction id and the oids that changed.
    fn commit_namespace(
        &self,
        source: &str,
        dest: &str,
        txn: TxnId,
    ) -> Result<(Tid, Vec<Oid>)>;

    /// Discards a namespace's edit buffer without committing it.
    fn abort_namespace(&self, namespace: &str, txn: TxnId) -> Result<(Tid, Vec<Oid>)>;

    /// Undoes a previously committed transaction, identified by `undo_id`.
    fn undo(&self, undo_id: Tid, txn: TxnId) -> Result<(Tid, Vec<Oid>)>;

    /// Which namespace last modified `oid`, for `Coordinator::modified_in_namespace`'s cache
    /// miss path.
    fn modified_in_namespace(&self, oid: Oid) -> Result<NamespaceTag>;

    fn namespace_empty(&self, namespace: &str) -> Result<bool>;

    /// Revision history for `oid`, most recent first.
    fn history(&self, oid: Oid, limit: usize) -> Result<Vec<Tid>>;

    fn undo_log(&self, first: usize, last: usize) -> Result<Vec<String>>;

    fn undo_info(&self, _first: usize, _last: usize) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn supports_undo(&self) -> bool;

    fn supports_namespaces(&self) -> bool;

    /// Every namespace tag storage currently has an open edit buffer for (the mainline itself
    /// is not included — it has no buffer to list). Surfaced verbatim by the coordinator (spec
    /// §6).
    fn namespaces(&self) -> Result<Vec<NamespaceTag>>;

    fn last_transaction(&self) -> Result<Tid>;

    fn get_name(&self) -> String;

    fn get_size(&self) -> Result<u64>;

    fn sort_key(&self) -> String;

    /// Called once at coordinator construction (spec §4.3.1 step 2).
    fn register_coordinator(&self, coordinator_name: &str, first_namespace: &str) -> Result<()>;
}

#[derive(Default)]
struct NamespaceBuffer {
    modified: HashMap<Oid, Payload>,
}

struct StorageState {
    objects: HashMap<Oid, (Payload, Tid)>,
    modified_in: HashMap<Oid, NamespaceTag>,
    namespaces: HashMap<NamespaceTag, NamespaceBuffer>,
    history: HashMap<Oid, Vec<Tid>>,
    next_tid: Tid,
    next_txn: TxnId,
    active_txns: HashMap<TxnId, bool>, // true once tpc_begin has run
}

/// A deterministic, single-process `Storage` implementation backed by `HashMap`s behind a
/// `parking_lot::RwLock`, in the guarded-map idiom of `storage/buffer.rs`. Suitable for tests
/// and for embedding the coordinator without a real persistence layer.
pub struct InMemoryStorage {
    state: RwLock<StorageState>,
    name: String,
}

impl InMemoryStorage {
    pub fn new(name: impl Into<String>) -> Self {
        InMemoryStorage {
            state: RwLock::new(StorageState {
                objects: HashMap::new(),
                modified_in: HashMap::new(),
                namespaces: HashMap::new(),
                history: HashMap::new(),
                next_tid: 1,
                next_txn: 1,
                active_txns: HashMap::new(),
            }),
            name: name.into(),
        }
    }

    /// Allocates a fresh `TxnId` for a caller driving 2PC manually (used by tests and by
    /// `LocalTransactionManager`).
    pub fn new_txn_id(&self) -> TxnId {
        let mut state = self.state.write();
        let id = state.next_txn;
        state.next_txn += 1;
        id
    }
}

impl Storage for InMemoryStorage {
    fn begin_transaction_id(&self) -> TxnId {
        self.new_txn_id()
    }

    fn load(&self, oid: Oid, namespace: &str) -> Result<Option<(Payload, Tid)>> {
        let state = self.state.read();
        if !namespace.is_empty() {
            if let Some(buf) = state.namespaces.get(namespace) {
                if let Some(payload) = buf.modified.get(&oid) {
                    let tid = state.objects.get(&oid).map(|(_, t)| *t).unwrap_or(0);
                    return Ok(Some((payload.clone(), tid)));
                }
            }
        }
        Ok(state.objects.get(&oid).cloned())
    }

    fn store(
        &self,
        oid: Oid,
        _prev_serial: Option<Tid>,
        payload: Payload,
        namespace: &str,
        txn: TxnId,
    ) -> Result<()> {
        let mut state = self.state.write();
        if !state.active_txns.get(&txn).copied().unwrap_or(false) {
            return Err(CoordinatorError::storage(
                "store",
                format!("transaction {txn} has not called tpc_begin"),
            ));
        }
        if namespace.is_empty() {
            let tid = state.next_tid;
            state.objects.insert(oid, (payload, tid));
            state.history.entry(oid).or_default().push(tid);
            state.modified_in.insert(oid, String::new());
        } else {
            state
                .namespaces
                .entry(namespace.to_string())
                .or_default()
                .modified
                .insert(oid, payload);
            state.modified_in.insert(oid, namespace.to_string());
        }
        Ok(())
    }

    fn tpc_begin(&self, txn: TxnId) -> Result<()> {
        self.state.write().active_txns.insert(txn, true);
        Ok(())
    }

    fn tpc_finish(&self, txn: TxnId) -> Result<Tid> {
        let mut state = self.state.write();
        state.active_txns.remove(&txn);
        let tid = state.next_tid;
        state.next_tid += 1;
        Ok(tid)
    }

    fn tpc_abort(&self, txn: TxnId) -> Result<()> {
        self.state.write().active_txns.remove(&txn);
        Ok(())
    }

    fn pack(&self, _target_time: SystemTime, extract_refs: ReferenceExtractor<'_>) -> Result<()> {
        let mut state = self.state.write();
        let root_payload = match state.objects.get(&crate::common::ROOT_OID) {
            Some((payload, _)) => payload.clone(),
            None => return Ok(()),
        };
        let mut reachable = std::collections::HashSet::new();
        let mut frontier = vec![crate::common::ROOT_OID];
        reachable.insert(crate::common::ROOT_OID);
        let mut payloads = HashMap::new();
        payloads.insert(crate::common::ROOT_OID, root_payload);
        while let Some(oid) = frontier.pop() {
            let payload = match payloads.get(&oid) {
                Some(p) => p.clone(),
                None => match state.objects.get(&oid) {
                    Some((p, _)) => p.clone(),
                    None => continue,
                },
            };
            for referenced in extract_refs(&payload) {
                if reachable.insert(referenced) {
                    frontier.push(referenced);
                }
            }
        }
        state.objects.retain(|oid, _| reachable.contains(oid));
        Ok(())
    }

    fn commit_namespace(&self, source: &str, dest: &str, txn: TxnId) -> Result<(Tid, Vec<Oid>)> {
        let mut state = self.state.write();
        if !state.active_txns.get(&txn).copied().unwrap_or(false) {
            return Err(CoordinatorError::storage(
                "commit_namespace",
                format!("transaction {txn} has not called tpc_begin"),
            ));
        }
        let buffer = state.namespaces.remove(source).unwrap_or_default();
        let tid = state.next_tid;
        state.next_tid += 1;
        let mut oids = Vec::with_capacity(buffer.modified.len());
        for (oid, payload) in buffer.modified {
            if dest.is_empty() {
                state.objects.insert(oid, (payload, tid));
                state.history.entry(oid).or_default().push(tid);
                state.modified_in.insert(oid, String::new());
            } else {
                state
                    .namespaces
                    .entry(dest.to_string())
                    .or_default()
                    .modified
                    .insert(oid, payload);
                state.modified_in.insert(oid, dest.to_string());
            }
            oids.push(oid);
        }
        Ok((tid, oids))
    }

    fn abort_namespace(&self, namespace: &str, txn: TxnId) -> Result<(Tid, Vec<Oid>)> {
        let mut state = self.state.write();
        if !state.active_txns.get(&txn).copied().unwrap_or(false) {
            return Err(CoordinatorError::storage(
                "abort_namespace",
                format!("transaction {txn} has not called tpc_begin"),
            ));
        }
        let buffer = state.namespaces.remove(namespace).unwrap_or_default();
        let oids: Vec<Oid> = buffer.modified.into_keys().collect();
        let tid = state.next_tid;
        Ok((tid, oids))
    }

    fn undo(&self, undo_id: Tid, txn: TxnId) -> Result<(Tid, Vec<Oid>)> {
        let mut state = self.state.write();
        if !state.active_txns.get(&txn).copied().unwrap_or(false) {
            return Err(CoordinatorError::storage(
                "undo",
                format!("transaction {txn} has not called tpc_begin"),
            ));
        }
        let affected: Vec<Oid> = state
            .history
            .iter()
            .filter(|(_, tids)| tids.contains(&undo_id))
            .map(|(oid, _)| *oid)
            .collect();
        let tid = state.next_tid;
        state.next_tid += 1;
        for oid in &affected {
            state.history.entry(*oid).or_default().push(tid);
            state.modified_in.insert(*oid, String::new());
        }
        Ok((tid, affected))
    }

    fn modified_in_namespace(&self, oid: Oid) -> Result<NamespaceTag> {
        Ok(self
            .state
            .read()
            .modified_in
            .get(&oid)
            .cloned()
            .unwrap_or_default())
    }

    fn namespace_empty(&self, namespace: &str) -> Result<bool> {
        Ok(self
            .state
            .read()
            .namespaces
            .get(namespace)
            .map(|b| b.modified.is_empty())
            .unwrap_or(true))
    }

    fn history(&self, oid: Oid, limit: usize) -> Result<Vec<Tid>> {
        let state = self.state.read();
        let mut h = state.history.get(&oid).cloned().unwrap_or_default();
        h.reverse();
        h.truncate(limit);
        Ok(h)
    }

    fn undo_log(&self, first: usize, last: usize) -> Result<Vec<String>> {
        let state = self.state.read();
        Ok((first..last.min(state.next_tid as usize))
            .map(|tid| format!("tid={tid}"))
            .collect())
    }

    fn supports_undo(&self) -> bool {
        true
    }

    fn supports_namespaces(&self) -> bool {
        true
    }

    fn namespaces(&self) -> Result<Vec<NamespaceTag>> {
        Ok(self.state.read().namespaces.keys().cloned().collect())
    }

    fn last_transaction(&self) -> Result<Tid> {
        Ok(self.state.read().next_tid.saturating_sub(1))
    }

    fn get_name(&self) -> String {
        self.name.clone()
    }

    fn get_size(&self) -> Result<u64> {
        Ok(self.state.read().objects.len() as u64)
    }

    fn sort_key(&self) -> String {
        self.name.clone()
    }

    fn register_coordinator(&self, _coordinator_name: &str, _first_namespace: &str) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit_payload(storage: &InMemoryStorage, oid: Oid, payload: &[u8]) -> Tid {
        let txn = storage.new_txn_id();
        storage.tpc_begin(txn).unwrap();
        storage.store(oid, None, payload.to_vec(), "", txn).unwrap();
        storage.tpc_vote(txn).unwrap();
        storage.tpc_finish(txn).unwrap()
    }

    #[test]
    fn load_missing_oid_returns_none() {
        let storage = InMemoryStorage::new("mem");
        assert!(storage.load(Oid(0), "").unwrap().is_none());
    }

    #[test]
    fn store_then_load_round_trips() {
        let storage = InMemoryStorage::new("mem");
        commit_payload(&storage, crate::common::ROOT_OID, b"root");
        let (payload, _) = storage.load(crate::common::ROOT_OID, "").unwrap().unwrap();
        assert_eq!(payload, b"root");
    }

    #[test]
    fn commit_namespace_moves_buffer_to_mainline() {
        let storage = InMemoryStorage::new("mem");
        let txn = storage.new_txn_id();
        storage.tpc_begin(txn).unwrap();
        storage.store(Oid(1), None, b"v1".to_vec(), "scratch", txn).unwrap();
        storage.tpc_finish(txn).unwrap();

        let txn2 = storage.new_txn_id();
        storage.tpc_begin(txn2).unwrap();
        let (_tid, oids) = storage.commit_namespace("scratch", "", txn2).unwrap();
        assert_eq!(oids, vec![Oid(1)]);
        assert_eq!(storage.load(Oid(1), "").unwrap().unwrap().0, b"v1");
        assert_eq!(storage.modified_in_namespace(Oid(1)).unwrap(), "");
    }

    #[test]
    fn pack_removes_unreachable_objects() {
        let storage = InMemoryStorage::new("mem");
        commit_payload(&storage, crate::common::ROOT_OID, b"");
        commit_payload(&storage, Oid(42), b"orphan");
        storage.pack(SystemTime::now(), &|_| Vec::new()).unwrap();
        assert!(storage.load(Oid(42), "").unwrap().is_none());
        assert!(storage.load(crate::common::ROOT_OID, "").unwrap().is_some());
    }

    #[test]
    fn namespaces_lists_open_edit_buffers() {
        let storage = InMemoryStorage::new("mem");
        let txn = storage.new_txn_id();
        storage.tpc_begin(txn).unwrap();
        storage.store(Oid(1), None, b"v1".to_vec(), "scratch", txn).unwrap();
        storage.tpc_finish(txn).unwrap();

        assert_eq!(storage.namespaces().unwrap(), vec!["scratch".to_string()]);
    }
}
