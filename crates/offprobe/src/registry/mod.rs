//! Probe Registry
//!
//! The single entry point instrumented code calls to obtain its probe array.
//!
//! # Lifecycle
//!
//! ```text
//! ┌──────┐  ready + CAS won   ┌───────────┐  cache drained   ┌──────┐
//! │ Cold │ ─────────────────► │ Migrating │ ───────────────► │ Warm │
//! └──────┘ ◄───────────────── └───────────┘                  └──────┘
//!              construction failed
//! ```
//!
//! - **Cold**: arrays are served from the bounded [`BootstrapCache`].
//! - **Migrating**: one caller is building the backing store. Every other
//!   call, including recursive calls made by the construction itself, is
//!   served from the cache and never tries to construct again.
//! - **Warm**: the backing store is authoritative and the cache is gone.
//!
//! Migration hands the cached array instances to the store, so handles
//! given out while Cold keep recording into the authoritative data.
//!
//! Store calls are isolated: an error or panic from the store never reaches
//! the caller. A failed migration returns the registry to Cold. A rejected
//! request once Warm is served a detached array, stable per id, whose hits
//! are not recorded.

mod cache;

pub use cache::BootstrapCache;

use crate::probe::{ClassId, ProbeArray};
use crate::readiness::{AlwaysReady, RuntimeReadiness};
use crate::result::{ProbeError, ProbeResult};
use crate::store::{ProbeStore, StoreFactory};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

/// Default number of distinct units the bootstrap cache can hold
pub const DEFAULT_CAPACITY: usize = 100_000;

const COLD: u8 = 0;
const MIGRATING: u8 = 1;
const WARM: u8 = 2;

/// Registry lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No backing store yet
    Cold,
    /// Backing store is being constructed and the cache drained
    Migrating,
    /// Backing store is authoritative
    Warm,
}

impl Phase {
    const fn from_raw(raw: u8) -> Self {
        match raw {
            COLD => Self::Cold,
            MIGRATING => Self::Migrating,
            _ => Self::Warm,
        }
    }
}

/// Process-wide bookkeeping of probe arrays
pub struct ProbeRegistry {
    phase: AtomicU8,
    cache: Mutex<BootstrapCache>,
    backing: OnceLock<Arc<dyn ProbeStore>>,
    detached: Mutex<HashMap<ClassId, ProbeArray>>,
    factory: Box<dyn StoreFactory>,
    readiness: Arc<dyn RuntimeReadiness>,
}

impl ProbeRegistry {
    /// Create a registry with default capacity that is ready immediately
    #[must_use]
    pub fn new(factory: impl StoreFactory + 'static) -> Self {
        Self::builder().build(factory)
    }

    /// Create a builder for a registry
    #[must_use]
    pub fn builder() -> ProbeRegistryBuilder {
        ProbeRegistryBuilder::default()
    }

    /// Current lifecycle phase
    #[must_use]
    pub fn phase(&self) -> Phase {
        Phase::from_raw(self.phase.load(Ordering::Acquire))
    }

    /// Whether the backing store is authoritative
    #[must_use]
    pub fn is_warm(&self) -> bool {
        self.backing.get().is_some()
    }

    /// The backing store, once Warm
    #[must_use]
    pub fn store(&self) -> Option<Arc<dyn ProbeStore>> {
        self.backing.get().cloned()
    }

    /// Bootstrap cache capacity
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.lock_cache().capacity()
    }

    /// Number of units currently held in the bootstrap cache
    #[must_use]
    pub fn cached_len(&self) -> usize {
        self.lock_cache().len()
    }

    /// Probe array for a unit
    ///
    /// Never fails for bootstrap or store problems; those fall back to the
    /// cache. Running out of cache capacity before bootstrap completes is
    /// unrecoverable for the coverage data and panics.
    ///
    /// # Panics
    ///
    /// When more distinct units are requested before bootstrap than the
    /// cache capacity allows.
    pub fn request(&self, id: i64, name: &str, probe_count: usize) -> ProbeArray {
        match self.try_request(id, name, probe_count) {
            Ok(probes) => probes,
            Err(err) => {
                tracing::error!(error = %err, "probe registry cannot record coverage");
                panic!("{err}");
            }
        }
    }

    /// Probe array for a unit, reporting capacity exhaustion as an error
    ///
    /// [`ProbeError::CapacityExceeded`] is the only error returned.
    pub fn try_request(&self, id: i64, name: &str, probe_count: usize) -> ProbeResult<ProbeArray> {
        let id = ClassId::new(id);
        if let Some(store) = self.backing.get() {
            return Ok(self.from_store(store.as_ref(), id, name, probe_count));
        }

        match self.try_bootstrap() {
            Ok(store) => return Ok(self.from_store(store.as_ref(), id, name, probe_count)),
            Err(err) if err.is_deferral() => {}
            Err(err) => {
                tracing::warn!(error = %err, "backing store unavailable; serving from bootstrap cache");
            }
        }

        self.from_cache(id, name, probe_count)
    }

    /// Attempt the Cold to Warm transition
    ///
    /// Returns the backing store if it is (or just became) authoritative.
    /// [`ProbeError::BootstrapNotReady`] and [`ProbeError::MigrationInProgress`]
    /// mean "use the cache for now"; any other error is a failed construction
    /// or migration that leaves the registry Cold so a later call can retry.
    pub fn try_bootstrap(&self) -> ProbeResult<Arc<dyn ProbeStore>> {
        if let Some(store) = self.backing.get() {
            return Ok(Arc::clone(store));
        }
        if !self.readiness.is_ready() {
            return Err(ProbeError::BootstrapNotReady);
        }
        if self
            .phase
            .compare_exchange(COLD, MIGRATING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return match self.backing.get() {
                Some(store) => Ok(Arc::clone(store)),
                None => Err(ProbeError::MigrationInProgress),
            };
        }

        tracing::debug!("constructing backing store");
        let constructed = panic::catch_unwind(AssertUnwindSafe(|| self.factory.construct()))
            .unwrap_or_else(|payload| Err(ProbeError::store_construction(panic_message(&*payload))));

        let migrated = constructed.and_then(|store| self.migrate(&store).map(|()| store));
        if migrated.is_err() {
            self.phase.store(COLD, Ordering::Release);
        }
        migrated
    }

    /// Hand every cached record to the store, then switch to Warm
    ///
    /// No lock is held while the store runs, so reentrant requests land in
    /// the cache and are picked up by the next round. The cache is only
    /// cleared once the store is published; after a failure every record is
    /// still cached and a retry adopts them again.
    fn migrate(&self, store: &Arc<dyn ProbeStore>) -> ProbeResult<()> {
        let mut migrated = 0;
        loop {
            let pending = {
                let mut cache = self.lock_cache();
                let pending = cache.records_from(migrated);
                if pending.is_empty() {
                    // Only the CAS winner gets here, so the cell is empty.
                    let _ = self.backing.set(Arc::clone(store));
                    self.phase.store(WARM, Ordering::Release);
                    cache.clear();
                    break;
                }
                pending
            };
            migrated += pending.len();
            for record in pending {
                panic::catch_unwind(AssertUnwindSafe(|| store.adopt(record)))
                    .map_err(|payload| ProbeError::store_failure(panic_message(&*payload)))?;
            }
        }
        tracing::debug!(migrated, "bootstrap cache migrated to backing store");
        Ok(())
    }

    fn from_cache(&self, id: ClassId, name: &str, probe_count: usize) -> ProbeResult<ProbeArray> {
        let mut cache = self.lock_cache();
        // Warm is published under this lock, so nothing is appended after the drain.
        if let Some(store) = self.backing.get() {
            drop(cache);
            return Ok(self.from_store(store.as_ref(), id, name, probe_count));
        }
        cache.get_or_insert(id, name, probe_count)
    }

    fn from_store(
        &self,
        store: &dyn ProbeStore,
        id: ClassId,
        name: &str,
        probe_count: usize,
    ) -> ProbeArray {
        let fetched = panic::catch_unwind(AssertUnwindSafe(|| {
            store.get_or_create(id, name, probe_count)
        }))
        .unwrap_or_else(|payload| Err(ProbeError::store_failure(panic_message(&*payload))));

        match fetched {
            Ok(probes) => probes,
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    %id,
                    name,
                    "backing store rejected unit; hits will not be recorded"
                );
                self.detached_array(id, probe_count)
            }
        }
    }

    /// Stand-in array for a unit the store rejected, one per id
    ///
    /// A request with a different probe count replaces the previous one.
    fn detached_array(&self, id: ClassId, probe_count: usize) -> ProbeArray {
        let mut detached = self
            .detached
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match detached.get(&id) {
            Some(probes) if probes.len() == probe_count => probes.clone(),
            _ => {
                let probes = ProbeArray::new(probe_count);
                detached.insert(id, probes.clone());
                probes
            }
        }
    }

    fn lock_cache(&self) -> MutexGuard<'_, BootstrapCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ProbeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbeRegistry")
            .field("phase", &self.phase())
            .field("cached", &self.cached_len())
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panicked".to_string())
}

/// Builder for [`ProbeRegistry`]
pub struct ProbeRegistryBuilder {
    capacity: usize,
    readiness: Arc<dyn RuntimeReadiness>,
}

impl Default for ProbeRegistryBuilder {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            readiness: Arc::new(AlwaysReady),
        }
    }
}

impl fmt::Debug for ProbeRegistryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbeRegistryBuilder")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl ProbeRegistryBuilder {
    /// Set the bootstrap cache capacity
    #[must_use]
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the readiness source
    #[must_use]
    pub fn readiness(mut self, readiness: Arc<dyn RuntimeReadiness>) -> Self {
        self.readiness = readiness;
        self
    }

    /// Build the registry in the Cold phase
    #[must_use]
    pub fn build(self, factory: impl StoreFactory + 'static) -> ProbeRegistry {
        ProbeRegistry {
            phase: AtomicU8::new(COLD),
            cache: Mutex::new(BootstrapCache::new(self.capacity)),
            backing: OnceLock::new(),
            detached: Mutex::new(HashMap::new()),
            factory: Box::new(factory),
            readiness: self.readiness,
        }
    }
}
