//! Object-database coordinator: connection pooling, invalidation fan-out, and 2PC resource
//! managers in front of a pluggable storage backend.

pub mod activity_monitor;
pub mod common;
pub mod connection;
pub mod coordinator;
pub mod error;
pub mod miv_cache;
pub mod pool;
pub mod storage;
pub mod transaction;
pub mod weak_collection;

pub use coordinator::{Coordinator, CoordinatorConfig, CoordinatorConfigBuilder, ExtremeDetailRecord};
pub use error::{CoordinatorError, Result};
