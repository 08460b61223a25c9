//! Bounded Bootstrap Cache
//!
//! Holds the records of units seen before the backing store exists.
//! Insertion order is kept so migration replays units in the order they
//! were first requested.

use crate::probe::{ClassId, ExecutionRecord, ProbeArray};
use crate::result::{ProbeError, ProbeResult};

/// Fixed-capacity, insertion-ordered cache of execution records
#[derive(Debug)]
pub struct BootstrapCache {
    records: Vec<ExecutionRecord>,
    capacity: usize,
}

impl BootstrapCache {
    /// Create an empty cache
    ///
    /// No memory is reserved up front; the vector grows with use and never
    /// past `capacity`.
    #[must_use]
    pub const fn new(capacity: usize) -> Self {
        Self {
            records: Vec::new(),
            capacity,
        }
    }

    /// Maximum number of distinct units
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of cached units
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the cache is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Return the cached array for `id`, appending a zero-filled record if absent
    pub fn get_or_insert(
        &mut self,
        id: ClassId,
        name: &str,
        probe_count: usize,
    ) -> ProbeResult<ProbeArray> {
        if let Some(record) = self.records.iter().find(|r| r.id() == id) {
            return Ok(record.probes().clone());
        }
        if self.records.len() >= self.capacity {
            return Err(ProbeError::CapacityExceeded {
                capacity: self.capacity,
                id: id.as_i64(),
                name: name.to_string(),
            });
        }
        let record = ExecutionRecord::new(id, name, probe_count);
        let probes = record.probes().clone();
        self.records.push(record);
        Ok(probes)
    }

    /// Records from position `from` onwards, cloned (arrays stay shared)
    #[must_use]
    pub fn records_from(&self, from: usize) -> Vec<ExecutionRecord> {
        self.records.get(from..).map(<[_]>::to_vec).unwrap_or_default()
    }

    /// Drop every record and release the memory
    pub fn clear(&mut self) {
        self.records = Vec::new();
    }
}
