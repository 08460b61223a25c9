//! Backing Store
//!
//! The authoritative map of unit id to probe array, available once the
//! process has finished bootstrapping. The registry talks to it only through
//! [`ProbeStore`], and builds it only through [`StoreFactory`].

use crate::probe::{ClassId, ExecutionRecord, ExecutionSnapshot, ProbeArray};
use crate::result::{ProbeError, ProbeResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Create-or-fetch access to execution records
pub trait ProbeStore: Send + Sync {
    /// Return the probe array for `id`, registering a zero-filled one on first request
    ///
    /// Idempotent per id.
    fn get_or_create(&self, id: ClassId, name: &str, probe_count: usize)
        -> ProbeResult<ProbeArray>;

    /// Take over a record that was built before the store existed
    ///
    /// The record's own array instance becomes the authoritative one unless
    /// the store already knows the id, in which case the hits are merged.
    fn adopt(&self, record: ExecutionRecord);
}

/// Fallible construction of the backing store
pub trait StoreFactory: Send + Sync {
    /// Build the store; may read configuration and start other subsystems
    fn construct(&self) -> ProbeResult<Arc<dyn ProbeStore>>;
}

impl<F> StoreFactory for F
where
    F: Fn() -> ProbeResult<Arc<dyn ProbeStore>> + Send + Sync,
{
    fn construct(&self) -> ProbeResult<Arc<dyn ProbeStore>> {
        self()
    }
}

/// In-memory execution data for one agent session
#[derive(Debug)]
pub struct RuntimeData {
    session_id: String,
    records: Mutex<HashMap<ClassId, ExecutionRecord>>,
}

impl RuntimeData {
    /// Create an empty store for the given session
    #[must_use]
    pub fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Session this data belongs to
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Number of registered units
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no unit has been registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Snapshot every record, ordered by id, optionally clearing hits afterwards
    ///
    /// Clearing happens in place so handles held by instrumented code keep working.
    #[must_use]
    pub fn collect(&self, reset: bool) -> Vec<ExecutionSnapshot> {
        let records = self.lock();
        let mut snapshots: Vec<_> = records.values().map(ExecutionRecord::snapshot).collect();
        if reset {
            for record in records.values() {
                record.probes().reset();
            }
        }
        snapshots.sort_by_key(|s| s.id);
        snapshots
    }

    /// Clear all hits in place
    pub fn reset(&self) {
        for record in self.lock().values() {
            record.probes().reset();
        }
    }

    // Poisoning only means another caller panicked mid-update; the map is still usable.
    fn lock(&self) -> MutexGuard<'_, HashMap<ClassId, ExecutionRecord>> {
        self.records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl ProbeStore for RuntimeData {
    fn get_or_create(
        &self,
        id: ClassId,
        name: &str,
        probe_count: usize,
    ) -> ProbeResult<ProbeArray> {
        let mut records = self.lock();
        if let Some(record) = records.get(&id) {
            if record.name() != name || record.probes().len() != probe_count {
                return Err(ProbeError::IncompatibleProbes {
                    id: id.as_i64(),
                    name: name.to_string(),
                    expected: record.probes().len(),
                    actual: probe_count,
                });
            }
            return Ok(record.probes().clone());
        }
        let record = ExecutionRecord::new(id, name, probe_count);
        let probes = record.probes().clone();
        records.insert(id, record);
        Ok(probes)
    }

    fn adopt(&self, record: ExecutionRecord) {
        let mut records = self.lock();
        match records.get(&record.id()) {
            Some(existing) if existing.probes().ptr_eq(record.probes()) => {}
            Some(existing) => {
                tracing::warn!(
                    id = %record.id(),
                    name = record.name(),
                    "unit already registered in backing store; merging cached hits"
                );
                existing.probes().merge_from(record.probes());
            }
            None => {
                records.insert(record.id(), record);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_create_is_idempotent() {
        let data = RuntimeData::new("s1");
        let a = data.get_or_create(ClassId::new(1), "A", 4).unwrap();
        let b = data.get_or_create(ClassId::new(1), "A", 4).unwrap();
        assert!(a.ptr_eq(&b));
        assert_eq!(data.len(), 1);
    }

    #[test]
    fn test_get_or_create_rejects_size_mismatch() {
        let data = RuntimeData::new("s1");
        data.get_or_create(ClassId::new(1), "A", 4).unwrap();
        let err = data.get_or_create(ClassId::new(1), "A", 5).unwrap_err();
        assert!(matches!(
            err,
            ProbeError::IncompatibleProbes {
                expected: 4,
                actual: 5,
                ..
            }
        ));
    }

    #[test]
    fn test_get_or_create_rejects_name_mismatch() {
        let data = RuntimeData::new("s1");
        data.get_or_create(ClassId::new(1), "A", 4).unwrap();
        assert!(data.get_or_create(ClassId::new(1), "B", 4).is_err());
    }

    #[test]
    fn test_adopt_keeps_array_instance() {
        let data = RuntimeData::new("s1");
        let record = ExecutionRecord::new(ClassId::new(3), "C", 2);
        let held = record.probes().clone();
        data.adopt(record);
        let fetched = data.get_or_create(ClassId::new(3), "C", 2).unwrap();
        assert!(fetched.ptr_eq(&held));
    }

    #[test]
    fn test_adopt_existing_merges_hits() {
        let data = RuntimeData::new("s1");
        let existing = data.get_or_create(ClassId::new(3), "C", 3).unwrap();
        existing.hit(0);
        let cached = ExecutionRecord::new(ClassId::new(3), "C", 3);
        cached.probes().hit(2);
        data.adopt(cached);
        assert_eq!(existing.to_vec(), vec![true, false, true]);
        assert_eq!(data.len(), 1);
    }

    #[test]
    fn test_collect_sorted_and_reset() {
        let data = RuntimeData::new("s1");
        let b = data.get_or_create(ClassId::new(20), "B", 1).unwrap();
        let a = data.get_or_create(ClassId::new(-5), "A", 2).unwrap();
        a.hit(1);
        b.hit(0);

        let snaps = data.collect(true);
        assert_eq!(snaps.len(), 2);
        assert_eq!(snaps[0].id, ClassId::new(-5));
        assert_eq!(snaps[0].probes, vec![false, true]);
        assert_eq!(snaps[1].probes, vec![true]);

        assert_eq!(a.hit_count(), 0);
        assert_eq!(b.hit_count(), 0);
        assert!(data.collect(false).iter().all(|s| !s.has_hits()));
    }

    #[test]
    fn test_closure_factory() {
        let factory = || -> ProbeResult<Arc<dyn ProbeStore>> { Ok(Arc::new(RuntimeData::new("f"))) };
        let store = StoreFactory::construct(&factory).unwrap();
        assert!(store.get_or_create(ClassId::new(1), "X", 0).unwrap().is_empty());
    }
}
