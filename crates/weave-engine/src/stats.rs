//! Engine counters
//!
//! All counters use relaxed atomics; a snapshot is a consistent-enough view
//! for reporting, not a synchronization point.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Live engine counters
#[derive(Debug, Default)]
pub struct EngineStats {
    generations: AtomicU64,
    generation_failures: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    invalidations: AtomicU64,
    invocations_created: AtomicU64,
    direct_forwards: AtomicU64,
}

/// Point-in-time copy of [`EngineStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Blueprint builds started
    pub generations: u64,
    /// Blueprint builds that failed
    pub generation_failures: u64,
    /// Proxy creations served from the cache
    pub cache_hits: u64,
    /// Proxy creations that triggered a build
    pub cache_misses: u64,
    /// Cache entries dropped
    pub invalidations: u64,
    /// Invocation records constructed (only with `call_stats`)
    pub invocations_created: u64,
    /// Calls forwarded without a chain (only with `call_stats`)
    pub direct_forwards: u64,
}

impl EngineStats {
    /// Fresh counters
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_generation(&self) {
        self.generations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_generation_failure(&self) {
        self.generation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_invalidations(&self, count: u64) {
        self.invalidations.fetch_add(count, Ordering::Relaxed);
    }

    /// One invocation record per call routed through a chain
    pub(crate) fn record_invocation(&self) {
        self.invocations_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_direct_forward(&self) {
        self.direct_forwards.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current counter values
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            generations: self.generations.load(Ordering::Relaxed),
            generation_failures: self.generation_failures.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            invocations_created: self.invocations_created.load(Ordering::Relaxed),
            direct_forwards: self.direct_forwards.load(Ordering::Relaxed),
        }
    }
}
