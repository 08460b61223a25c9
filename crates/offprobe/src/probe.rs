//! Probe Arrays and Execution Records
//!
//! A probe array is the per-unit set of "was this location executed" flags.
//! Instrumented code holds a handle to it and flips flags in place; every
//! holder of the same handle observes the same storage.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Identifier of an instrumented unit
///
/// Assigned by the instrumentation toolchain and stable for the lifetime of
/// the unit. Any 64-bit value is valid, negative ones included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClassId(i64);

impl ClassId {
    /// Create a new class ID
    #[inline]
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner value
    #[inline]
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self.0
    }
}

impl From<i64> for ClassId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Shared, fixed-length array of probe flags
///
/// Cloning the handle shares the storage. The array is never reallocated,
/// so a handle stays authoritative for its unit for the whole process.
#[derive(Clone)]
pub struct ProbeArray {
    flags: Arc<[AtomicBool]>,
}

impl ProbeArray {
    /// Create a zero-filled array with `len` probes
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            flags: (0..len).map(|_| AtomicBool::new(false)).collect(),
        }
    }

    /// Number of probes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    /// Whether the array has no probes
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Mark a probe as executed
    ///
    /// Returns `false` when `index` is out of range; the array is unchanged.
    #[inline]
    pub fn hit(&self, index: usize) -> bool {
        match self.flags.get(index) {
            Some(flag) => {
                flag.store(true, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// Whether a probe has been executed
    #[inline]
    #[must_use]
    pub fn is_hit(&self, index: usize) -> bool {
        self.flags
            .get(index)
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Number of executed probes
    #[must_use]
    pub fn hit_count(&self) -> usize {
        self.flags
            .iter()
            .filter(|flag| flag.load(Ordering::Relaxed))
            .count()
    }

    /// Copy the current flags out
    #[must_use]
    pub fn to_vec(&self) -> Vec<bool> {
        self.flags
            .iter()
            .map(|flag| flag.load(Ordering::Relaxed))
            .collect()
    }

    /// OR the hits of `other` into this array
    ///
    /// Only the overlapping prefix is merged when lengths differ.
    pub fn merge_from(&self, other: &Self) {
        for (dst, src) in self.flags.iter().zip(other.flags.iter()) {
            if src.load(Ordering::Relaxed) {
                dst.store(true, Ordering::Relaxed);
            }
        }
    }

    /// Clear every flag
    pub fn reset(&self) {
        for flag in self.flags.iter() {
            flag.store(false, Ordering::Relaxed);
        }
    }

    /// Whether two handles share the same storage
    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.flags, &other.flags)
    }
}

impl fmt::Debug for ProbeArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.to_vec()).finish()
    }
}

/// Coverage state of one instrumented unit
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    id: ClassId,
    name: String,
    probes: ProbeArray,
}

impl ExecutionRecord {
    /// Create a record with a fresh zero-filled array
    #[must_use]
    pub fn new(id: ClassId, name: &str, probe_count: usize) -> Self {
        Self::with_probes(id, name, ProbeArray::new(probe_count))
    }

    /// Create a record around an existing array
    #[must_use]
    pub fn with_probes(id: ClassId, name: &str, probes: ProbeArray) -> Self {
        Self {
            id,
            name: name.to_string(),
            probes,
        }
    }

    /// Unit id
    #[must_use]
    pub const fn id(&self) -> ClassId {
        self.id
    }

    /// Fully qualified unit name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shared probe array
    #[must_use]
    pub const fn probes(&self) -> &ProbeArray {
        &self.probes
    }

    /// Frozen copy for dumping
    #[must_use]
    pub fn snapshot(&self) -> ExecutionSnapshot {
        ExecutionSnapshot {
            id: self.id,
            name: self.name.clone(),
            probes: self.probes.to_vec(),
        }
    }
}

/// Point-in-time copy of an execution record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSnapshot {
    /// Unit id
    pub id: ClassId,
    /// Unit name
    pub name: String,
    /// Probe flags at snapshot time
    pub probes: Vec<bool>,
}

impl ExecutionSnapshot {
    /// Whether any probe was executed
    #[must_use]
    pub fn has_hits(&self) -> bool {
        self.probes.iter().any(|&p| p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_array_is_zeroed() {
        let probes = ProbeArray::new(4);
        assert_eq!(probes.len(), 4);
        assert_eq!(probes.to_vec(), vec![false; 4]);
        assert_eq!(probes.hit_count(), 0);
    }

    #[test]
    fn test_empty_array() {
        let probes = ProbeArray::new(0);
        assert!(probes.is_empty());
        assert!(!probes.hit(0));
        assert!(!probes.is_hit(0));
    }

    #[test]
    fn test_clone_shares_storage() {
        let a = ProbeArray::new(3);
        let b = a.clone();
        b.hit(1);
        assert!(a.is_hit(1));
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&ProbeArray::new(3)));
    }

    #[test]
    fn test_hit_out_of_range_is_ignored() {
        let probes = ProbeArray::new(2);
        assert!(!probes.hit(2));
        assert_eq!(probes.to_vec(), vec![false, false]);
    }

    #[test]
    fn test_merge_is_logical_or() {
        let a = ProbeArray::new(4);
        let b = ProbeArray::new(4);
        a.hit(0);
        b.hit(2);
        a.merge_from(&b);
        assert_eq!(a.to_vec(), vec![true, false, true, false]);
        assert_eq!(b.to_vec(), vec![false, false, true, false]);
    }

    #[test]
    fn test_merge_shorter_source() {
        let a = ProbeArray::new(3);
        let b = ProbeArray::new(1);
        b.hit(0);
        a.merge_from(&b);
        assert_eq!(a.to_vec(), vec![true, false, false]);
    }

    #[test]
    fn test_reset_clears_in_place() {
        let a = ProbeArray::new(2);
        let held = a.clone();
        a.hit(0);
        a.hit(1);
        a.reset();
        assert_eq!(held.hit_count(), 0);
    }

    #[test]
    fn test_class_id_display_is_hex() {
        assert_eq!(ClassId::new(255).to_string(), "00000000000000ff");
        assert_eq!(ClassId::new(-1).to_string(), "ffffffffffffffff");
    }

    #[test]
    fn test_record_snapshot() {
        let record = ExecutionRecord::new(ClassId::new(9), "pkg/Foo", 3);
        record.probes().hit(2);
        let snap = record.snapshot();
        assert_eq!(snap.id, ClassId::new(9));
        assert_eq!(snap.name, "pkg/Foo");
        assert_eq!(snap.probes, vec![false, false, true]);
        assert!(snap.has_hits());
    }
}
