use gaugemon_common::types::MetricRecord;
use std::sync::{Arc, PoisonError, RwLock};

/// The records produced by one poll cycle.
pub type Snapshot = Arc<Vec<MetricRecord>>;

/// Latest poll result, shared between the poll and report loops.
///
/// A poll swaps in a whole new snapshot; readers get an `Arc` to whichever
/// snapshot was current, so a reader never sees a half-replaced set and a
/// batch handed to a worker cannot change underneath it.
#[derive(Debug, Clone, Default)]
pub struct SnapshotStore {
    current: Arc<RwLock<Snapshot>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discards the previous snapshot.
    pub fn replace(&self, records: Vec<MetricRecord>) {
        let next = Arc::new(records);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = next;
    }

    pub fn current(&self) -> Snapshot {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
