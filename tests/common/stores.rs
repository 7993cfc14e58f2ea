// In-memory collaborators for integration tests

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use consensus_rollout::propagate::ConfigStore;
use consensus_rollout::status::StatusStore;
use consensus_rollout::{ComponentRef, ConsensusStatus, Result, RolloutError};
use parking_lot::Mutex;

/// Status record with a version bumped on every write.
#[derive(Default)]
pub struct MemoryStatusStore {
    record: Mutex<(Option<ConsensusStatus>, u64)>,
    writes: AtomicUsize,
}

impl MemoryStatusStore {
    /// Current status and its version.
    pub fn read(&self) -> (Option<ConsensusStatus>, String) {
        let record = self.record.lock();
        (record.0.clone(), record.1.to_string())
    }

    /// Simulate a write by another reconciler.
    pub fn concurrent_write(&self, status: ConsensusStatus) {
        let mut record = self.record.lock();
        record.0 = Some(status);
        record.1 += 1;
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn write_status(
        &self,
        component: &ComponentRef,
        base_version: Option<&str>,
        status: &ConsensusStatus,
    ) -> Result<()> {
        let mut record = self.record.lock();
        if let Some(base) = base_version {
            if base != record.1.to_string() {
                return Err(RolloutError::Conflict(component.to_string()));
            }
        }
        record.0 = Some(status.clone());
        record.1 += 1;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Config records keyed by component, with injectable failures.
pub struct MemoryConfigStore {
    records: Mutex<Vec<BTreeMap<String, String>>>,
    fail: AtomicBool,
    calls: AtomicUsize,
    updates: AtomicUsize,
}

impl MemoryConfigStore {
    pub fn with_records(count: usize) -> Self {
        Self {
            records: Mutex::new(vec![BTreeMap::new(); count]),
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
        }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<BTreeMap<String, String>> {
        self.records.lock().clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Records modified across all calls.
    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

impl Default for MemoryConfigStore {
    fn default() -> Self {
        Self::with_records(1)
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn apply_entries(
        &self,
        _component: &ComponentRef,
        entries: &BTreeMap<String, String>,
    ) -> Result<usize> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(RolloutError::Store("configmap patch rejected".into()));
        }

        let mut records = self.records.lock();
        let mut updated = 0;
        for record in records.iter_mut() {
            if entries.iter().all(|(k, v)| record.get(k) == Some(v)) {
                continue;
            }
            record.extend(entries.iter().map(|(k, v)| (k.clone(), v.clone())));
            updated += 1;
        }
        self.updates.fetch_add(updated, Ordering::SeqCst);
        Ok(updated)
    }
}
