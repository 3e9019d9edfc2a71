//! Fixed-bucket "modified-in-namespace" cache (spec §4.3.5, §9).
//!
//! A direct-mapped cache with `MIV_CACHE_BUCKETS` slots and no dynamic allocation: each bucket
//! holds at most one `(Oid, NamespaceTag)` pair. A lookup for a different oid that hashes to the
//! same bucket is a cache miss that evicts the stale occupant, by design — coherence across hash
//! collisions is not attempted.

use crate::common::{miv_bucket, NamespaceTag, Oid, MIV_CACHE_BUCKETS};

#[derive(Clone)]
struct Slot {
    oid: Oid,
    namespace: NamespaceTag,
}

pub struct ModifiedInVersionCache {
    buckets: Vec<Option<Slot>>,
}

impl ModifiedInVersionCache {
    pub fn new() -> Self {
        ModifiedInVersionCache {
            buckets: vec![None; MIV_CACHE_BUCKETS].into_iter().collect(),
        }
    }

    /// Returns the cached namespace for `oid` if the bucket is occupied by exactly that oid.
    pub fn get(&self, oid: Oid) -> Option<&NamespaceTag> {
        match &self.buckets[miv_bucket(oid)] {
            Some(slot) if slot.oid == oid => Some(&slot.namespace),
            _ => None,
        }
    }

    /// Stores (or overwrites) the namespace for `oid`, evicting whatever previously occupied
    /// its bucket.
    pub fn put(&mut self, oid: Oid, namespace: NamespaceTag) {
        self.buckets[miv_bucket(oid)] = Some(Slot { oid, namespace });
    }

    /// Removes `oid`'s entry if its bucket is currently occupied by exactly that oid. A no-op
    /// if the bucket holds a different oid or is empty (pre-eviction ahead of invalidation,
    /// spec §4.3.4 step 1).
    pub fn evict(&mut self, oid: Oid) {
        let bucket = &mut self.buckets[miv_bucket(oid)];
        if matches!(bucket, Some(slot) if slot.oid == oid) {
            *bucket = None;
        }
    }
}

impl Default for ModifiedInVersionCache {
    fn default() -> Self {
        Self::new()
    }
}

// `Option<Slot>` isn't `Copy`, so `vec![None; N]` needs `Clone`; implement it directly to avoid
// deriving `Clone` on `Slot` just for this internal array fill.
impl Clone for Slot {
    fn clone(&self) -> Self {
        Slot {
            oid: self.oid,
            namespace: self.namespace.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_on_empty_cache() {
        let c = ModifiedInVersionCache::new();
        assert!(c.get(Oid(1)).is_none());
    }

    #[test]
    fn put_then_get_round_trips() {
        let mut c = ModifiedInVersionCache::new();
        c.put(Oid(1), "v".to_string());
        assert_eq!(c.get(Oid(1)).unwrap(), "v");
    }

    #[test]
    fn collision_discards_stale_entry() {
        let mut c = ModifiedInVersionCache::new();
        // Find a second oid that maps to the same bucket as oid 1.
        let target_bucket = miv_bucket(Oid(1));
        let other = (2u64..100_000)
            .map(Oid)
            .find(|o| miv_bucket(*o) == target_bucket)
            .expect("collision should exist within a small search space");

        c.put(Oid(1), "a".to_string());
        assert_eq!(c.get(Oid(1)).unwrap(), "a");
        // Looking up the colliding oid is a miss (different identity occupies the bucket).
        assert!(c.get(other).is_none());

        // Storing the colliding oid replaces the original entry.
        c.put(other, "b".to_string());
        assert!(c.get(Oid(1)).is_none());
        assert_eq!(c.get(other).unwrap(), "b");
    }

    #[test]
    fn evict_only_removes_matching_oid() {
        let mut c = ModifiedInVersionCache::new();
        c.put(Oid(1), "a".to_string());
        c.evict(Oid(1));
        assert!(c.get(Oid(1)).is_none());
    }
}
