//! Engine metrics
//!
//! Purely observational counters for monitoring and tests.
//!
//! # Memory Ordering
//!
//! All counters use Relaxed ordering intentionally:
//! 1. They are observational metrics, not synchronization points
//! 2. They do not order any other memory operations
//! 3. The atomic increments still guarantee no torn updates

use std::sync::atomic::{AtomicU64, Ordering};

/// Relaxed atomic counters maintained by the engine
#[derive(Debug, Default)]
pub struct EngineMetrics {
    constructions: AtomicU64,
    cache_hits: AtomicU64,
    scopes_created: AtomicU64,
    scopes_disposed: AtomicU64,
}

impl EngineMetrics {
    /// Fresh zeroed metrics
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_construction(&self) {
        self.constructions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_scope_created(&self) {
        self.scopes_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_scopes_disposed(&self, count: u64) {
        self.scopes_disposed.fetch_add(count, Ordering::Relaxed);
    }

    /// Consistent-enough snapshot of the counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            constructions: self.constructions.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            scopes_created: self.scopes_created.load(Ordering::Relaxed),
            scopes_disposed: self.scopes_disposed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the engine counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Instances constructed (cache misses included, hits excluded)
    pub constructions: u64,
    /// Requests served from a scope cache
    pub cache_hits: u64,
    /// Scope instances created (the root is not counted)
    pub scopes_created: u64,
    /// Scope instances disposed (children counted individually)
    pub scopes_disposed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_count() {
        let metrics = EngineMetrics::new();
        metrics.record_construction();
        metrics.record_construction();
        metrics.record_cache_hit();
        metrics.record_scope_created();
        metrics.record_scopes_disposed(3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.constructions, 2);
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.scopes_created, 1);
        assert_eq!(snapshot.scopes_disposed, 3);
    }
}
