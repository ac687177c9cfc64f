//! Proxy factory
//!
//! The factory owns the blueprint cache and the engine counters. Creating a
//! proxy fingerprints the (type, advice) pair, fetches or builds the shared
//! blueprint, and binds it to the target.

use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::advice::PolicyOracle;
use crate::blueprint::{BlueprintBuilder, ProxyBlueprint};
use crate::cache::BlueprintCache;
use crate::config::EngineConfig;
use crate::descriptor::{TargetDescriptor, TypeIdentity};
use crate::error::{GenerationError, ProxyError};
use crate::fingerprint::Fingerprint;
use crate::proxy::Proxy;
use crate::stats::{EngineStats, StatsSnapshot};
use crate::target::Target;

static GLOBAL: Lazy<ProxyFactory> = Lazy::new(ProxyFactory::new);

/// Creates proxies and caches their blueprints
#[derive(Debug)]
pub struct ProxyFactory {
    config: EngineConfig,
    cache: BlueprintCache,
    stats: Arc<EngineStats>,
}

impl Default for ProxyFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ProxyFactory {
    /// Factory with the default configuration
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Factory with `config`
    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            config,
            cache: BlueprintCache::new(),
            stats: Arc::new(EngineStats::new()),
        }
    }

    /// Process-wide factory with the default configuration
    pub fn global() -> &'static ProxyFactory {
        &GLOBAL
    }

    /// Active configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Blueprint cache
    pub fn cache(&self) -> &BlueprintCache {
        &self.cache
    }

    /// Live counters
    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// Counter snapshot
    pub fn snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Cache key for `descriptor` under `oracle`
    pub fn fingerprint(&self, descriptor: &TargetDescriptor, oracle: &dyn PolicyOracle) -> Fingerprint {
        Fingerprint::compute(descriptor, oracle.declared_advice())
    }

    /// Proxy `target` as `descriptor` with the advice `oracle` resolves
    pub fn create_proxy(
        &self,
        descriptor: &Arc<TargetDescriptor>,
        target: Arc<dyn Target>,
        oracle: &dyn PolicyOracle,
    ) -> Result<Proxy, ProxyError> {
        if target.type_identity() != descriptor.identity() {
            return Err(ProxyError::TargetMismatch {
                expected: descriptor.identity().to_string(),
                found: target.type_identity().to_string(),
            });
        }
        let blueprint = self.blueprint(descriptor, oracle)?;
        let stats = self.config.call_stats.then(|| Arc::clone(&self.stats));
        Ok(Proxy::new(blueprint, target, stats))
    }

    /// Fetch or build the blueprint for `descriptor` under `oracle`
    pub fn blueprint(
        &self,
        descriptor: &Arc<TargetDescriptor>,
        oracle: &dyn PolicyOracle,
    ) -> Result<Arc<ProxyBlueprint>, GenerationError> {
        let fingerprint = self.fingerprint(descriptor, oracle);
        let (result, built) = self.cache.get_or_build(fingerprint, descriptor.identity(), || {
            BlueprintBuilder::new(&self.config, &self.stats)
                .build(fingerprint, Arc::clone(descriptor), oracle)
                .map(Arc::new)
        });
        if built {
            self.stats.record_cache_miss();
        } else {
            self.stats.record_cache_hit();
            tracing::trace!(fingerprint = %fingerprint.short(), "blueprint cache hit");
        }
        result
    }

    /// Drop the cached blueprint for `fingerprint`
    ///
    /// Existing proxies keep working; the next creation rebuilds.
    pub fn invalidate(&self, fingerprint: &Fingerprint) -> bool {
        let removed = self.cache.invalidate(fingerprint);
        if removed {
            self.stats.record_invalidations(1);
            tracing::info!(fingerprint = %fingerprint.short(), "invalidated proxy blueprint");
        }
        removed
    }

    /// Drop every blueprint built for the type `identity` names
    pub fn on_type_redefined(&self, identity: &TypeIdentity) -> usize {
        let removed = self.cache.invalidate_type(identity);
        if removed > 0 {
            self.stats.record_invalidations(removed as u64);
            tracing::info!(target_type = %identity.name(), removed, "type redefined; dropped proxy blueprints");
        }
        removed
    }
}
