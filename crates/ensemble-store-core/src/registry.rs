//! Session-scoped provider and scan caches.
//!
//! A [`ProviderRegistry`] is created by the application for one session and
//! handed to every [`crate::factory::ProviderFactory`] that should share
//! work. There is no process-global state: dropping the registry (or calling
//! [`ProviderRegistry::clear`]) releases every cached provider.
//!
//! Each cache maps a key to a slot holding a `tokio::sync::OnceCell`. The
//! map's mutex is held only to fetch or insert a slot; the expensive
//! initialiser (a conversion or a filesystem scan) runs outside it. Callers
//! asking for the same key while the initialiser runs wait on the same cell,
//! so each artifact is converted at most once. An initialiser that fails
//! leaves its cell empty and the next caller retries.
//!
//! Artifacts are cached per storage root and storage key, independent of how
//! a provider is built over them. Providers are cached per
//! [`ProviderSlot`], which also carries the settings they were opened under,
//! so factories with different configurations never share a provider.

use std::{
    collections::{BTreeMap, HashMap},
    future::Future,
    hash::Hash,
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::sync::OnceCell;

use crate::{
    backing_store::StoreHandle,
    config::DuplicateColumnPolicy,
    factory::EnsembleScanSnapshot,
    frequency::Frequency,
    key::StorageKey,
    provider::{EnsembleSummaryProvider, EnsembleTableProvider},
};

/// Map of per-key once-cells.
pub(crate) struct KeyedCache<K, V> {
    slots: Mutex<HashMap<K, Arc<OnceCell<V>>>>,
}

impl<K, V> KeyedCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub(crate) fn new() -> Self {
        KeyedCache {
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, key: &K) -> Arc<OnceCell<V>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(key.clone()).or_default())
    }

    /// Value for `key`, running `init` if no value is cached yet.
    pub(crate) async fn get_or_try_init<F, Fut, E>(&self, key: &K, init: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let cell = self.slot(key);
        cell.get_or_try_init(init).await.cloned()
    }

    /// Cached value for `key`, if initialised.
    pub(crate) fn get(&self, key: &K) -> Option<V> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.get(key).and_then(|cell| cell.get().cloned())
    }

    pub(crate) fn remove(&self, key: &K) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.remove(key);
    }

    pub(crate) fn clear(&self) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.clear();
    }

    /// Number of initialised entries.
    pub(crate) fn len(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.values().filter(|cell| cell.initialized()).count()
    }
}

/// Identity of a cached provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct ProviderSlot {
    /// Storage root holding the artifact.
    pub(crate) root: PathBuf,
    /// Policy baked into the provider.
    pub(crate) duplicate_columns: DuplicateColumnPolicy,
    pub(crate) key: StorageKey,
}

/// How a summary artifact is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum SummaryMode {
    /// Stored at this frequency (`None` for raw dates).
    Presampled(Option<Frequency>),
    /// Raw dates, resampled per query.
    Lazy,
}

/// Counters describing the work a registry has done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegistryStats {
    /// Artifacts converted from source files.
    pub conversions: u64,
    /// Ensemble realization scans performed.
    pub scans: u64,
    /// Table providers currently cached.
    pub cached_tables: usize,
    /// Summary providers currently cached.
    pub cached_summaries: usize,
}

/// Session-owned caches shared by provider factories.
pub struct ProviderRegistry {
    artifacts: KeyedCache<(PathBuf, StorageKey), StoreHandle>,
    tables: KeyedCache<ProviderSlot, Arc<EnsembleTableProvider>>,
    summaries: KeyedCache<(ProviderSlot, SummaryMode), Arc<dyn EnsembleSummaryProvider>>,
    aggregated: KeyedCache<(PathBuf, StorageKey), Arc<BTreeMap<String, StorageKey>>>,
    scans: KeyedCache<(String, PathBuf), Arc<EnsembleScanSnapshot>>,
    conversions: AtomicU64,
    scans_performed: AtomicU64,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("stats", &self.stats())
            .finish()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        ProviderRegistry {
            artifacts: KeyedCache::new(),
            tables: KeyedCache::new(),
            summaries: KeyedCache::new(),
            aggregated: KeyedCache::new(),
            scans: KeyedCache::new(),
            conversions: AtomicU64::new(0),
            scans_performed: AtomicU64::new(0),
        }
    }

    /// Drop every cached provider, index and scan snapshot.
    ///
    /// Providers already handed out stay valid; they own their artifact.
    pub fn clear(&self) {
        self.artifacts.clear();
        self.tables.clear();
        self.summaries.clear();
        self.aggregated.clear();
        self.scans.clear();
        log::debug!("provider registry cleared");
    }

    /// Work counters and cache sizes.
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            conversions: self.conversions.load(Ordering::Relaxed),
            scans: self.scans_performed.load(Ordering::Relaxed),
            cached_tables: self.tables.len(),
            cached_summaries: self.summaries.len(),
        }
    }

    pub(crate) fn record_conversion(&self) {
        self.conversions.fetch_add(1, Ordering::Relaxed);
    }

    /// Opened artifact `key` under `root`; `init` opens or converts it.
    pub(crate) async fn artifact<F, Fut, E>(&self, root: &Path, key: &StorageKey, init: F) -> Result<StoreHandle, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<StoreHandle, E>>,
    {
        self.artifacts
            .get_or_try_init(&(root.to_path_buf(), key.clone()), init)
            .await
    }

    pub(crate) async fn table<F, Fut, E>(&self, slot: &ProviderSlot, init: F) -> Result<Arc<EnsembleTableProvider>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<EnsembleTableProvider>, E>>,
    {
        self.tables.get_or_try_init(slot, init).await
    }

    pub(crate) async fn summary<F, Fut, E>(
        &self,
        slot: &ProviderSlot,
        mode: SummaryMode,
        init: F,
    ) -> Result<Arc<dyn EnsembleSummaryProvider>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<dyn EnsembleSummaryProvider>, E>>,
    {
        self.summaries
            .get_or_try_init(&(slot.clone(), mode), init)
            .await
    }

    pub(crate) async fn aggregated<F, Fut, E>(
        &self,
        root: &Path,
        key: &StorageKey,
        init: F,
    ) -> Result<Arc<BTreeMap<String, StorageKey>>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<BTreeMap<String, StorageKey>>, E>>,
    {
        self.aggregated
            .get_or_try_init(&(root.to_path_buf(), key.clone()), init)
            .await
    }

    /// Realization scan for `(name, path)`, reusing a still-valid snapshot.
    ///
    /// A cached snapshot that no longer validates is evicted and `scan`
    /// runs again.
    pub(crate) async fn ensemble_scan<F, Fut, E>(
        &self,
        name: &str,
        path: &Path,
        scan: F,
    ) -> Result<Arc<EnsembleScanSnapshot>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<EnsembleScanSnapshot, E>>,
    {
        let key = (name.to_string(), path.to_path_buf());
        if let Some(snapshot) = self.scans.get(&key) {
            if snapshot.is_valid() {
                log::debug!("reusing scan snapshot for ensemble '{name}'");
                return Ok(snapshot);
            }
            log::info!(
                "scan snapshot for ensemble '{name}' at {} is stale; rescanning",
                path.display()
            );
            self.scans.remove(&key);
        }

        self.scans
            .get_or_try_init(&key, || async move {
                self.scans_performed.fetch_add(1, Ordering::Relaxed);
                scan().await.map(Arc::new)
            })
            .await
    }
}
