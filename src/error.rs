//! Structured error taxonomy for the coordinator.
//!
//! Every failure mode the coordinator can surface (see spec-level error handling design) is a
//! named variant here rather than a bare string, so callers can match on the kind instead of
//! scraping a message.

use thiserror::Error;

use crate::common::{NamespaceTag, Oid};

/// Errors raised by the coordinator, its pools, or the storage/transaction collaborators it
/// drives.
#[derive(Error, Debug)]
pub enum CoordinatorError {
    /// The storage backend reported that the root object does not exist yet.
    ///
    /// Caught internally during construction to trigger root bootstrap; never observed by
    /// application code.
    #[error("storage has no root object")]
    MissingRoot,

    /// A caller passed one of the deprecated `cache_deactivate_after`-family parameters.
    ///
    /// Named here for the taxonomy in spec §7, but never returned to a caller: the deprecated
    /// setters accept and ignore the value, logging a `tracing::warn!` deprecation notice
    /// instead of raising (same treatment as `MissingRoot`, above).
    #[error("deprecated parameter: {0}")]
    DeprecatedParameter(String),

    /// A caller asked for a sub-transaction, which this coordinator does not support.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// An internal bookkeeping invariant did not hold. Reaching this indicates a bug in the
    /// pool/coordinator itself, not a caller error.
    #[error("pool invariant violated: {0}")]
    PoolInvariant(String),

    /// The namespace pool a connection belonged to no longer exists.
    #[error("namespace pool not found: {0:?}")]
    NamespacePoolMissing(NamespaceTag),

    /// `storage.pack` failed; the underlying error is preserved.
    #[error("pack failed: {0}")]
    PackFailed(String),

    /// A 2PC phase callback failed against the storage backend.
    #[error("storage error during {phase}: {message}")]
    Storage { phase: &'static str, message: String },

    /// An object id the caller referenced is unknown to storage.
    #[error("object {0:?} not found")]
    ObjectNotFound(Oid),

    /// Anything else, preserved verbatim.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoordinatorError {
    pub fn storage(phase: &'static str, message: impl Into<String>) -> Self {
        CoordinatorError::Storage {
            phase,
            message: message.into(),
        }
    }
}

/// Crate-wide result alias, matching the coordinator's convention of one error enum for the
/// whole surface.
pub type Result<T> = std::result::Result<T, CoordinatorError>;
