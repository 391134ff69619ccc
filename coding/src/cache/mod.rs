//! A bounded, thread-safe cache of coding matrices.
//!
//! [MatrixCache] maps [Parameters] to a shared [CodingMatrix], constructing missing
//! entries on demand through its [Backend].
//!
//! # Concurrency
//!
//! Lookups of cached matrices share a read lock. A miss takes the write lock and
//! checks again before constructing, so every key is constructed at most once even
//! when many threads request it at the same time. [MatrixCache::cleanup] takes the
//! same write lock and therefore never interleaves with a lookup or an insertion.
//!
//! Matrices are handed out as [Arc]s. A decode that obtained a matrix keeps it alive
//! even if the entry is evicted or the cache is cleaned up while the decode runs.
//!
//! # Capacity
//!
//! The cache never holds more than [Config::capacity] entries. Inserting into a full
//! cache evicts the oldest entry (by insertion), so every constructed matrix is either
//! cached or owned by the callers that still hold it.

use crate::{Backend, CodingMatrix, Error, Parameters};
use prometheus_client::registry::Registry;
use std::{
    collections::{HashMap, VecDeque},
    num::NonZeroUsize,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};
use tracing::{debug, info};

mod metrics;
pub use metrics::Metrics;

/// Maximum number of distinct [Parameters] cached by default.
pub const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(200) {
    Some(capacity) => capacity,
    None => panic!("capacity must be non-zero"),
};

/// Configuration for [MatrixCache].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// The maximum number of matrices kept in the cache.
    pub capacity: NonZeroUsize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
        }
    }
}

#[derive(Default)]
struct Entries {
    matrices: HashMap<Parameters, Arc<CodingMatrix>>,
    /// Keys of `matrices`, oldest first.
    order: VecDeque<Parameters>,
}

/// A bounded cache of coding matrices keyed by [Parameters].
pub struct MatrixCache<B: Backend> {
    backend: B,
    capacity: NonZeroUsize,
    entries: RwLock<Entries>,
    metrics: Metrics,
}

impl<B: Backend> MatrixCache<B> {
    /// Create an empty cache that constructs matrices with `backend`.
    pub fn new(backend: B, cfg: Config) -> Self {
        Self {
            backend,
            capacity: cfg.capacity,
            entries: RwLock::new(Entries::default()),
            metrics: Metrics::default(),
        }
    }

    /// Register the cache's metrics under the `matrix_cache` prefix.
    pub fn register(&self, registry: &mut Registry) {
        self.metrics
            .register(registry.sub_registry_with_prefix("matrix_cache"));
    }

    /// The backend used to construct matrices.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The cache's metrics.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// The maximum number of cached entries.
    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// The number of cached entries.
    pub fn len(&self) -> usize {
        self.read().matrices.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a matrix for `parameters` is currently cached.
    pub fn contains(&self, parameters: &Parameters) -> bool {
        self.read().matrices.contains_key(parameters)
    }

    /// Construct a matrix for `parameters` without consulting or populating the cache.
    pub fn create(&self, parameters: &Parameters) -> Result<CodingMatrix, Error> {
        let coefficients = self
            .backend
            .generate(parameters)
            .ok_or(Error::AllocationFailed(*parameters))?;
        let matrix = CodingMatrix::new(*parameters, coefficients)
            .ok_or(Error::AllocationFailed(*parameters))?;
        self.metrics.constructions.inc();
        debug!(%parameters, "constructed coding matrix");
        Ok(matrix)
    }

    /// Return the cached matrix for `parameters`, constructing and caching it if absent.
    pub fn get_or_create(&self, parameters: &Parameters) -> Result<Arc<CodingMatrix>, Error> {
        let cached = self.read().matrices.get(parameters).cloned();
        if let Some(matrix) = cached {
            self.metrics.hits.inc();
            return Ok(matrix);
        }

        // Check again under the write lock: another caller may have won the race.
        let mut entries = self.write();
        if let Some(matrix) = entries.matrices.get(parameters) {
            self.metrics.hits.inc();
            return Ok(matrix.clone());
        }
        self.metrics.misses.inc();
        let matrix = Arc::new(self.create(parameters)?);

        if entries.matrices.len() >= self.capacity.get() {
            if let Some(oldest) = entries.order.pop_front() {
                entries.matrices.remove(&oldest);
                self.metrics.evictions.inc();
                debug!(evicted = %oldest, "matrix cache full");
            }
        }
        entries.order.push_back(*parameters);
        entries.matrices.insert(*parameters, matrix.clone());
        self.metrics.entries.set(entries.matrices.len() as i64);
        Ok(matrix)
    }

    /// Release every cached matrix and empty the cache.
    pub fn cleanup(&self) {
        let mut entries = self.write();
        let released = entries.matrices.len();
        entries.matrices.clear();
        entries.order.clear();
        self.metrics.entries.set(0);
        info!(released, "cleaned up matrix cache");
    }

    // The map is never left half-updated, so a poisoned lock is still consistent.
    fn read(&self) -> RwLockReadGuard<'_, Entries> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Entries> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mocks::{Counting, Failing},
        Galois,
    };
    use cauchy_macros::test_traced;
    use std::{num::NonZeroU16, thread};

    fn parameters(k: u16, m: u16) -> Parameters {
        Parameters::new(
            NonZeroU16::new(k).unwrap(),
            NonZeroU16::new(m).unwrap(),
            crate::WordSize::W8,
        )
    }

    fn small(capacity: usize) -> Config {
        Config {
            capacity: NonZeroUsize::new(capacity).unwrap(),
        }
    }

    #[test_traced]
    fn test_get_or_create_caches() {
        let backend = Counting::default();
        let cache = MatrixCache::new(backend.clone(), Config::default());
        let p = parameters(4, 2);

        let first = cache.get_or_create(&p).unwrap();
        let second = cache.get_or_create(&p).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.parameters(), &p);
        assert_eq!(backend.generated(), 1);
        assert_eq!(cache.metrics().hits.get(), 1);
        assert_eq!(cache.metrics().misses.get(), 1);
        assert_eq!(cache.metrics().constructions.get(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&p));
    }

    #[test]
    fn test_create_bypasses_cache() {
        let cache = MatrixCache::new(Galois, Config::default());
        let p = parameters(10, 4);

        let first = cache.create(&p).unwrap();
        let second = cache.create(&p).unwrap();
        assert_eq!(first.coefficients(), second.coefficients());
        assert!(cache.is_empty());
        assert_eq!(cache.metrics().constructions.get(), 2);

        // The cached matrix carries the same coefficients.
        let cached = cache.get_or_create(&p).unwrap();
        assert_eq!(cached.coefficients(), first.coefficients());
    }

    #[test]
    fn test_allocation_failed() {
        let cache = MatrixCache::new(Galois, Config::default());
        let p = parameters(200, 57);
        assert!(matches!(
            cache.get_or_create(&p),
            Err(Error::AllocationFailed(failed)) if failed == p
        ));
        assert!(matches!(cache.create(&p), Err(Error::AllocationFailed(_))));
        assert!(cache.is_empty());
        assert_eq!(cache.metrics().constructions.get(), 0);
    }

    #[test]
    fn test_allocation_failed_backend() {
        let cache = MatrixCache::new(Failing::on_generate(), Config::default());
        assert!(matches!(
            cache.get_or_create(&parameters(4, 2)),
            Err(Error::AllocationFailed(_))
        ));
        assert!(cache.is_empty());
    }

    #[test_traced("INFO")]
    fn test_capacity_bound() {
        let cache = MatrixCache::new(Galois, Config::default());
        let mut requested = Vec::new();
        for k in 1..=25 {
            for m in 1..=10 {
                let p = parameters(k, m);
                let matrix = cache.get_or_create(&p).unwrap();
                assert_eq!(matrix.parameters(), &p);
                assert_eq!(matrix.coefficients().len(), usize::from(k * m));
                assert!(cache.len() <= DEFAULT_CAPACITY.get());
                requested.push(p);
            }
        }
        assert_eq!(cache.len(), 200);
        assert_eq!(cache.metrics().evictions.get(), 50);
        assert_eq!(cache.metrics().entries.get(), 200);

        // The oldest entries were evicted, the newest remain.
        for p in &requested[..50] {
            assert!(!cache.contains(p));
        }
        for p in &requested[50..] {
            assert!(cache.contains(p));
        }
    }

    #[test]
    fn test_evicted_matrix_stays_usable() {
        let cache = MatrixCache::new(Galois, small(2));
        let oldest = cache.get_or_create(&parameters(4, 2)).unwrap();
        cache.get_or_create(&parameters(5, 2)).unwrap();
        cache.get_or_create(&parameters(6, 2)).unwrap();
        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(&parameters(4, 2)));

        let fresh = cache.create(&parameters(4, 2)).unwrap();
        assert_eq!(oldest.coefficients(), fresh.coefficients());
    }

    #[test_traced]
    fn test_cleanup_resets_state() {
        let backend = Counting::default();
        let cache = MatrixCache::new(backend.clone(), Config::default());
        let a = parameters(4, 2);
        let b = parameters(6, 3);
        let held = cache.get_or_create(&a).unwrap();
        cache.get_or_create(&b).unwrap();
        assert_eq!(backend.generated(), 2);

        cache.cleanup();
        assert!(cache.is_empty());
        assert_eq!(cache.metrics().entries.get(), 0);

        // Matrices held by callers survive cleanup.
        assert_eq!(held.parameters(), &a);

        // A previously cached key is constructed again.
        let rebuilt = cache.get_or_create(&a).unwrap();
        assert!(!Arc::ptr_eq(&held, &rebuilt));
        assert_eq!(held.coefficients(), rebuilt.coefficients());
        assert_eq!(backend.generated(), 3);
        assert_eq!(cache.metrics().constructions.get(), 3);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_concurrent_first_access_constructs_once() {
        let backend = Counting::default();
        let cache = MatrixCache::new(backend.clone(), Config::default());
        let p = parameters(8, 4);

        let matrices: Vec<Arc<CodingMatrix>> = thread::scope(|s| {
            let handles: Vec<_> = (0..16)
                .map(|_| s.spawn(|| cache.get_or_create(&p).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(backend.generated(), 1);
        assert!(matrices.iter().all(|m| Arc::ptr_eq(m, &matrices[0])));
        assert_eq!(cache.metrics().hits.get() + cache.metrics().misses.get(), 16);
    }

    #[test]
    fn test_concurrent_cleanup() {
        let cache = MatrixCache::new(Galois, small(8));
        thread::scope(|s| {
            for t in 0..4u16 {
                let cache = &cache;
                s.spawn(move || {
                    for k in 1..=32u16 {
                        let p = parameters(k, 1 + t);
                        let matrix = cache.get_or_create(&p).unwrap();
                        assert_eq!(matrix.parameters(), &p);
                    }
                });
            }
            s.spawn(|| {
                for _ in 0..16 {
                    cache.cleanup();
                    thread::yield_now();
                }
            });
        });
        assert!(cache.len() <= 8);
    }

    #[test]
    fn test_register_metrics() {
        let cache = MatrixCache::new(Galois, Config::default());
        let mut registry = Registry::default();
        cache.register(&mut registry);
        cache.get_or_create(&parameters(4, 2)).unwrap();
        cache.get_or_create(&parameters(4, 2)).unwrap();

        let mut buffer = String::new();
        prometheus_client::encoding::text::encode(&mut buffer, &registry).unwrap();
        assert!(buffer.contains("matrix_cache_hits_total 1"));
        assert!(buffer.contains("matrix_cache_misses_total 1"));
        assert!(buffer.contains("matrix_cache_entries 1"));
    }
}
