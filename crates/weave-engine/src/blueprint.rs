//! Proxy blueprints
//!
//! A blueprint is everything proxies of one (type, advice configuration) pair
//! share: the per-method dispatch plan, the resolved chains, the emitted unit
//! and its linked dispatch table. Blueprints are immutable and shared through
//! `Arc` by every proxy built from them.

use std::fmt;
use std::sync::Arc;

use weave_bytecode::{verify_unit, EmitError, UnitBuilder, UnitDescriptor};

use crate::advice::{InterceptorChain, PolicyOracle};
use crate::config::EngineConfig;
use crate::descriptor::{MethodDescriptor, MethodId, TargetDescriptor, TypeIdentity};
use crate::dispatch::{CallFrame, LinkedUnit};
use crate::error::{CallError, GenerationError};
use crate::fingerprint::Fingerprint;
use crate::stats::EngineStats;
use crate::target::Target;
use crate::value::Value;

/// Why a method forwards directly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectReason {
    /// No advice matched
    NoAdvice,
    /// The method cannot be intercepted
    NotOverridable,
}

/// How one method dispatches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPlan {
    /// Straight to the target, no invocation record
    Direct(DirectReason),
    /// Through the chain at this index
    Chain(usize),
}

/// Shared, immutable proxy blueprint
pub struct ProxyBlueprint {
    fingerprint: Fingerprint,
    descriptor: Arc<TargetDescriptor>,
    plans: Vec<DispatchPlan>,
    chains: Vec<InterceptorChain>,
    unit: UnitDescriptor,
    linked: LinkedUnit,
}

impl ProxyBlueprint {
    /// Cache key this blueprint was built for
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// Target descriptor
    pub fn descriptor(&self) -> &Arc<TargetDescriptor> {
        &self.descriptor
    }

    /// Target type identity
    pub fn identity(&self) -> &TypeIdentity {
        self.descriptor.identity()
    }

    /// Generated unit name
    pub fn unit_name(&self) -> &str {
        &self.unit.name
    }

    /// Emitted unit
    pub fn unit(&self) -> &UnitDescriptor {
        &self.unit
    }

    /// Linked dispatch table
    pub fn linked(&self) -> &LinkedUnit {
        &self.linked
    }

    /// Plans in slot order
    pub fn plans(&self) -> &[DispatchPlan] {
        &self.plans
    }

    /// Plan for one method
    pub fn plan(&self, id: MethodId) -> Option<DispatchPlan> {
        self.plans.get(id.index()).copied()
    }

    /// Resolved chains by chain index
    pub fn chains(&self) -> &[InterceptorChain] {
        &self.chains
    }

    /// Chain a method dispatches through, if any
    pub fn chain_for(&self, id: MethodId) -> Option<&InterceptorChain> {
        match self.plan(id)? {
            DispatchPlan::Chain(index) => self.chains.get(index),
            DispatchPlan::Direct(_) => None,
        }
    }

    /// Listing of every stub
    pub fn disassemble(&self) -> String {
        self.unit.disassemble()
    }

    pub(crate) fn invoke<'a>(
        &'a self,
        target: &'a dyn Target,
        method: &'a MethodDescriptor,
        args: &'a [Value],
        stats: Option<&'a EngineStats>,
    ) -> Result<Value, CallError> {
        let body = self
            .linked
            .body(method.id().index())
            .ok_or_else(|| CallError::NoSuchMethod {
                type_name: self.identity().to_string(),
                method: method.to_string(),
            })?;
        let frame = CallFrame {
            target,
            descriptor: &self.descriptor,
            chains: &self.chains,
            unit: &self.unit,
            stats,
        };
        frame.dispatch(method, body, args)
    }
}

impl fmt::Debug for ProxyBlueprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyBlueprint")
            .field("fingerprint", &self.fingerprint)
            .field("unit", &self.unit.name)
            .field("plans", &self.plans)
            .field("chains", &self.chains)
            .finish()
    }
}

/// Builds blueprints under one engine configuration
pub(crate) struct BlueprintBuilder<'c> {
    config: &'c EngineConfig,
    stats: &'c EngineStats,
}

impl<'c> BlueprintBuilder<'c> {
    pub(crate) fn new(config: &'c EngineConfig, stats: &'c EngineStats) -> Self {
        Self { config, stats }
    }

    /// Generate, verify and link a blueprint
    pub(crate) fn build(
        &self,
        fingerprint: Fingerprint,
        descriptor: Arc<TargetDescriptor>,
        oracle: &dyn PolicyOracle,
    ) -> Result<ProxyBlueprint, GenerationError> {
        self.stats.record_generation();
        let result = self.generate(fingerprint, descriptor, oracle);
        if let Err(err) = &result {
            self.stats.record_generation_failure();
            tracing::warn!(fingerprint = %fingerprint.short(), error = %err, "proxy generation failed");
        }
        result
    }

    fn generate(
        &self,
        fingerprint: Fingerprint,
        descriptor: Arc<TargetDescriptor>,
        oracle: &dyn PolicyOracle,
    ) -> Result<ProxyBlueprint, GenerationError> {
        let identity = descriptor.identity();
        let type_name = identity.to_string();
        let emit_error = |source: EmitError| GenerationError::Emit {
            type_name: type_name.clone(),
            source,
        };

        let unit_name = format!("{}$$Weave$${}", identity.name(), fingerprint.short());
        let mut builder = UnitBuilder::new(unit_name, identity.name());
        let mut plans = Vec::with_capacity(descriptor.len());
        let mut chains = Vec::new();

        for method in descriptor.methods() {
            let advice = oracle.resolve_advice(method);
            let plan = if !method.is_overridable() {
                if !advice.is_empty() {
                    tracing::info!(
                        target_type = %type_name,
                        method = %method,
                        skipped = advice.len(),
                        "advice matched a non-overridable method; calls forward directly"
                    );
                }
                DispatchPlan::Direct(DirectReason::NotOverridable)
            } else if advice.is_empty() {
                DispatchPlan::Direct(DirectReason::NoAdvice)
            } else {
                let chain = builder.add_chain().map_err(emit_error)?;
                chains.push(InterceptorChain::build(advice));
                DispatchPlan::Chain(chain as usize)
            };

            let mut emitter = builder
                .begin_method(method.signature().clone())
                .map_err(emit_error)?;
            let body = match plan {
                DispatchPlan::Direct(_) => emitter.emit_direct_forward(),
                DispatchPlan::Chain(chain) => emitter.emit_chain_invoke(chain as u16),
            };
            body.map_err(emit_error)?;
            emitter.finish().map_err(emit_error)?;
            plans.push(plan);
        }

        let unit = builder.finish();
        if self.config.verify {
            verify_unit(&unit, self.config.max_stack_depth).map_err(|source| {
                GenerationError::Rejected {
                    type_name: type_name.clone(),
                    source,
                }
            })?;
        }
        let linked = LinkedUnit::link(&unit, chains.len(), descriptor.len(), self.config.fuse_stubs)
            .map_err(|source| GenerationError::Load {
                unit: unit.name.clone(),
                source,
            })?;

        tracing::debug!(
            unit = %unit.name,
            methods = descriptor.len(),
            chains = chains.len(),
            fused = linked.fused_count(),
            code_size = unit.code_size(),
            "generated proxy blueprint"
        );

        Ok(ProxyBlueprint {
            fingerprint,
            descriptor,
            plans,
            chains,
            unit,
            linked,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_bytecode::TypeRef;

    use crate::advice::{AdvicePolicy, AdviceSpec, MethodMatcher};

    fn service() -> Arc<TargetDescriptor> {
        Arc::new(
            TargetDescriptor::builder("UserService")
                .method(MethodDescriptor::new("findUser", vec![TypeRef::I64], TypeRef::object("User")))
                .method(MethodDescriptor::new("saveUser", vec![TypeRef::object("User")], TypeRef::Void))
                .method(MethodDescriptor::new("version", vec![], TypeRef::Str).non_overridable())
                .build(),
        )
    }

    fn build(
        descriptor: Arc<TargetDescriptor>,
        policy: &AdvicePolicy,
        config: &EngineConfig,
    ) -> Result<ProxyBlueprint, GenerationError> {
        let stats = EngineStats::new();
        let fp = Fingerprint::compute(&descriptor, policy.declared_advice());
        BlueprintBuilder::new(config, &stats).build(fp, descriptor, policy)
    }

    #[test]
    fn test_plans_per_method() {
        let policy = AdvicePolicy::new()
            .with(AdviceSpec::before("audit", |_| Ok(())).matching(MethodMatcher::prefix("save")))
            .with(AdviceSpec::before("trace", |_| Ok(())).matching(MethodMatcher::name("version")));
        let blueprint = build(service(), &policy, &EngineConfig::default()).unwrap();

        assert_eq!(
            blueprint.plans(),
            &[
                DispatchPlan::Direct(DirectReason::NoAdvice),
                DispatchPlan::Chain(0),
                DispatchPlan::Direct(DirectReason::NotOverridable),
            ]
        );
        assert_eq!(blueprint.chains().len(), 1);
        assert_eq!(blueprint.chain_for(MethodId(1)).unwrap().ids(), vec!["audit"]);
        assert!(blueprint.chain_for(MethodId(0)).is_none());
        assert!(blueprint.unit_name().starts_with("UserService$$Weave$$"));
        assert_eq!(blueprint.linked().fused_count(), 3);
    }

    #[test]
    fn test_unrepresentable_signature_names_method() {
        let descriptor = Arc::new(
            TargetDescriptor::builder("Wide")
                .method(MethodDescriptor::new("many", vec![TypeRef::I32; 300], TypeRef::Void))
                .build(),
        );
        let err = build(descriptor, &AdvicePolicy::new(), &EngineConfig::default()).unwrap_err();
        assert!(matches!(err, GenerationError::Emit { .. }));
        assert!(err.to_string().contains("many("));
    }

    #[test]
    fn test_unverified_unfused_build_still_links() {
        let config = EngineConfig {
            verify: false,
            fuse_stubs: false,
            ..EngineConfig::default()
        };
        let policy = AdvicePolicy::new().with(AdviceSpec::before("log", |_| Ok(())));
        let blueprint = build(service(), &policy, &config).unwrap();
        assert_eq!(blueprint.linked().fused_count(), 0);
        assert_eq!(blueprint.chains().len(), 2);
    }

    #[test]
    fn test_stack_bound_rejects_unit() {
        let config = EngineConfig {
            max_stack_depth: 1,
            ..EngineConfig::default()
        };
        let descriptor = Arc::new(
            TargetDescriptor::builder("Calc")
                .method(MethodDescriptor::new("add", vec![TypeRef::I32, TypeRef::I32], TypeRef::I32))
                .build(),
        );
        let err = build(descriptor, &AdvicePolicy::new(), &config).unwrap_err();
        assert!(matches!(err, GenerationError::Rejected { .. }));
    }
}
