//! Metrics for [super::MatrixCache].

use prometheus_client::{
    metrics::{counter::Counter, gauge::Gauge},
    registry::Registry,
};

/// Metrics for [super::MatrixCache].
#[derive(Default)]
pub struct Metrics {
    /// Lookups served from the cache.
    pub hits: Counter,
    /// Lookups that had to construct a matrix.
    pub misses: Counter,
    /// Matrices constructed by the backend (cached or not).
    pub constructions: Counter,
    /// Entries evicted to stay within capacity.
    pub evictions: Counter,
    /// Entries currently cached.
    pub entries: Gauge,
}

impl Metrics {
    /// Register all metrics with the given registry.
    pub fn register(&self, registry: &mut Registry) {
        registry.register("hits", "Lookups served from the cache", self.hits.clone());
        registry.register(
            "misses",
            "Lookups that had to construct a matrix",
            self.misses.clone(),
        );
        registry.register(
            "constructions",
            "Matrices constructed by the backend",
            self.constructions.clone(),
        );
        registry.register(
            "evictions",
            "Entries evicted to stay within capacity",
            self.evictions.clone(),
        );
        registry.register("entries", "Entries currently cached", self.entries.clone());
    }
}
