//! Shared identifiers used across the coordinator, pool, storage, and transaction modules.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An object identifier. Represented as the storage's native 64-bit oid space; the reserved
/// root id is the all-zero value (spec's "eight zero bytes").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Oid(pub u64);

impl Oid {
    pub const fn new(value: u64) -> Self {
        Oid(value)
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

/// The reserved object id of the database root, per spec §6.
pub const ROOT_OID: Oid = Oid(0);

/// A transaction id assigned by storage at commit time.
pub type Tid = u64;

/// An in-flight 2PC transaction's identifier, assigned by the transaction manager at `begin()`
/// and passed through to every storage call driven within that transaction. Distinct from
/// `Tid`, which storage assigns only once a commit actually lands.
pub type TxnId = u64;

/// A namespace tag. The empty string denotes the default/mainline namespace; any other value
/// names a scoped edit buffer.
pub type NamespaceTag = String;

/// Returns true if `tag` denotes the default/mainline namespace.
pub fn is_default_namespace(tag: &str) -> bool {
    tag.is_empty()
}

/// Number of buckets in the modified-in-namespace cache (spec §3, fixed at 131).
pub const MIV_CACHE_BUCKETS: usize = 131;

/// Hashes an oid into a `MIV_CACHE_BUCKETS`-sized bucket index. Uses a simple multiplicative
/// hash rather than `std::hash` so the bucket assignment is stable across processes and easy to
/// reason about in tests.
pub fn miv_bucket(oid: Oid) -> usize {
    (oid.0 as usize).wrapping_mul(2654435761) % MIV_CACHE_BUCKETS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_oid_is_zero() {
        assert_eq!(ROOT_OID, Oid(0));
    }

    #[test]
    fn default_namespace_is_empty_string() {
        assert!(is_default_namespace(""));
        assert!(!is_default_namespace("v"));
    }

    #[test]
    fn bucket_index_is_in_range() {
        for raw in [0u64, 1, 130, 131, 9_999_999, u64::MAX] {
            assert!(miv_bucket(Oid(raw)) < MIV_CACHE_BUCKETS);
        }
    }
}
