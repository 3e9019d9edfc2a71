//! Per-namespace `ConnectionPool`: a LIFO stack of idle connections plus a weak set of every
//! live connection ever admitted (spec §3, §4.2).
//!
//! All methods here assume the caller already holds the coordinator's lock; the pool does no
//! locking of its own. Grounded on `pool/connection_pool.rs`'s sizing-policy and
//! warn/critical-alert logging call sites (connection_pool.rs:557,666,676,720), generalized from
//! elastic min/max sizing to the spec's push/pop stack discipline.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::connection::Connection;
use crate::weak_collection::WeakCollection;

/// A per-namespace pool of reusable `Connection`s.
pub struct ConnectionPool {
    target_size: usize,
    all: WeakCollection<Connection>,
    available: VecDeque<Arc<Connection>>,
}

impl ConnectionPool {
    pub fn new(target_size: usize) -> Self {
        ConnectionPool {
            target_size,
            all: WeakCollection::new(),
            available: VecDeque::new(),
        }
    }

    pub fn target_size(&self) -> usize {
        self.target_size
    }

    fn contains_available(&self, c: &Arc<Connection>) -> bool {
        self.available.iter().any(|existing| Arc::ptr_eq(existing, c))
    }

    /// Admits a brand-new connection: trims, then inserts into both `all` and `available`.
    /// Precondition: `c` is in neither collection yet.
    pub fn push(&mut self, c: Arc<Connection>) {
        debug_assert!(!self.all.contains(&c), "push: connection already tracked in `all`");
        debug_assert!(
            !self.contains_available(&c),
            "push: connection already idle in this pool"
        );
        self.trim();
        self.all.add(&c);
        self.available.push_back(c);
        self.log_sizing();
    }

    /// Returns a previously-popped connection to the idle stack. Precondition: `c` is already
    /// in `all` (still tracked from its original `push`) but not currently in `available`.
    pub fn repush(&mut self, c: Arc<Connection>) {
        debug_assert!(self.all.contains(&c), "repush: connection not tracked in `all`");
        debug_assert!(
            !self.contains_available(&c),
            "repush: connection already idle in this pool"
        );
        self.trim();
        self.available.push_back(c);
    }

    /// Removes and returns the most-recently-pushed idle connection (LIFO — a freshly-closed
    /// connection with a warm cache is reused first). The connection remains in `all`; the pool
    /// now holds only a weak reference to it.
    pub fn pop(&mut self) -> Option<Arc<Connection>> {
        self.available.pop_back()
    }

    pub fn num_available(&self) -> usize {
        self.available.len()
    }

    /// A live snapshot of every connection ever admitted to this pool that is still reachable.
    pub fn all_as_list(&mut self) -> Vec<Arc<Connection>> {
        self.all.as_list()
    }

    /// Sets the soft ceiling. The `n + 1` / trim / `n` two-step lets a trim triggered here bring
    /// the live count *below* the final target when repopulation (a subsequent `push`) is about
    /// to happen anyway (spec §4.2).
    pub fn set_target_size(&mut self, n: usize) {
        self.target_size = n.saturating_add(1);
        self.trim();
        self.target_size = n;
    }

    /// Evicts idle connections from the *front* of `available` (oldest first, preserving the
    /// warmest caches) while the live count is at or above `target_size`.
    fn trim(&mut self) {
        while !self.available.is_empty() && self.all.len() >= self.target_size {
            if let Some(oldest) = self.available.pop_front() {
                self.all.remove(&oldest);
            } else {
                break;
            }
        }
    }

    fn log_sizing(&mut self) {
        let live = self.all.len();
        if live > self.target_size.saturating_mul(2) {
            tracing::error!(
                live,
                target = self.target_size,
                "connection pool critically oversized"
            );
        } else if live > self.target_size {
            tracing::warn!(live, target = self.target_size, "connection pool oversized");
        }
    }
}
