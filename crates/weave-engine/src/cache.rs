//! Blueprint cache
//!
//! Keyed by [`Fingerprint`]. Each key owns a slot whose cell is initialized
//! exactly once: concurrent requests for a missing key block on the same
//! build instead of racing to build duplicates. Build failures are stored
//! like successes, so a failing configuration is not rebuilt until it is
//! invalidated.

use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::OnceCell;

use crate::blueprint::ProxyBlueprint;
use crate::descriptor::TypeIdentity;
use crate::error::GenerationError;
use crate::fingerprint::Fingerprint;

type BuildResult = Result<Arc<ProxyBlueprint>, GenerationError>;

struct CacheSlot {
    identity: TypeIdentity,
    cell: OnceCell<BuildResult>,
}

/// Fingerprint-keyed blueprint store
#[derive(Default)]
pub struct BlueprintCache {
    entries: DashMap<Fingerprint, Arc<CacheSlot>>,
}

impl BlueprintCache {
    /// Empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached result for `fingerprint`, building it on first use
    ///
    /// The flag is true when this call ran `build`. The map shard lock is
    /// released before building, so `build` may itself use the cache.
    pub fn get_or_build<F>(
        &self,
        fingerprint: Fingerprint,
        identity: &TypeIdentity,
        build: F,
    ) -> (BuildResult, bool)
    where
        F: FnOnce() -> BuildResult,
    {
        let slot = {
            let entry = self.entries.entry(fingerprint).or_insert_with(|| {
                Arc::new(CacheSlot {
                    identity: identity.clone(),
                    cell: OnceCell::new(),
                })
            });
            Arc::clone(entry.value())
        };

        let mut built = false;
        let result = slot.cell.get_or_init(|| {
            built = true;
            build()
        });
        (result.clone(), built)
    }

    /// Successfully built blueprint for `fingerprint`, if present
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<Arc<ProxyBlueprint>> {
        let slot = self.entries.get(fingerprint)?;
        match slot.cell.get() {
            Some(Ok(blueprint)) => Some(Arc::clone(blueprint)),
            _ => None,
        }
    }

    /// Whether a slot exists for `fingerprint`
    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.entries.contains_key(fingerprint)
    }

    /// Drop the entry for `fingerprint`
    ///
    /// Proxies already holding the blueprint keep it; the next request
    /// rebuilds. A build still in flight completes for its own waiters only.
    pub fn invalidate(&self, fingerprint: &Fingerprint) -> bool {
        self.entries.remove(fingerprint).is_some()
    }

    /// Drop every entry built for a type named like `identity`, any generation
    pub fn invalidate_type(&self, identity: &TypeIdentity) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, slot| {
            let keep = slot.identity.name() != identity.name();
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    /// Number of entries, including cached failures
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop everything
    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl std::fmt::Debug for BlueprintCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlueprintCache")
            .field("entries", &self.entries.len())
            .finish()
    }
}
