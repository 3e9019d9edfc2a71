//! An injectable observer notified of connection lifecycle events (spec §3, §9).
//!
//! Grounded on `monitoring/alerting.rs`'s pattern of an injected handler trait registered once
//! at construction time rather than a mutable method slot rebound at runtime.

use crate::common::NamespaceTag;

/// Information about a connection passed to `ActivityMonitor::closed`.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub namespace: NamespaceTag,
    pub non_ghost_count: usize,
}

/// Observer hook installed on a `Coordinator` at construction. Not mutated afterwards.
pub trait ActivityMonitor: Send + Sync {
    /// Called when a connection is closed by application code, before it is repushed onto (or
    /// discarded from) its pool.
    fn closed(&self, info: &ConnectionInfo);
}

/// An `ActivityMonitor` that records every notification it receives, for tests.
#[derive(Default)]
pub struct RecordingActivityMonitor {
    closures: parking_lot::Mutex<Vec<ConnectionInfo>>,
}

impl RecordingActivityMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn closures(&self) -> Vec<ConnectionInfo> {
        self.closures.lock().clone()
    }
}

impl ActivityMonitor for RecordingActivityMonitor {
    fn closed(&self, info: &ConnectionInfo) {
        self.closures.lock().push(info.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_monitor_captures_closures() {
        let monitor = RecordingActivityMonitor::new();
        monitor.closed(&ConnectionInfo {
            namespace: String::new(),
            non_ghost_count: 3,
        });
        assert_eq!(monitor.closures().len(), 1);
        assert_eq!(monitor.closures()[0].non_ghost_count, 3);
    }
}
