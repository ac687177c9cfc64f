//! Advice resolution policies

use crate::advice::spec::AdviceSpec;
use crate::descriptor::MethodDescriptor;

/// Decides which advice applies to each method
///
/// The factory fingerprints [`declared_advice`](Self::declared_advice) to
/// decide whether two policies may share a blueprint, so `resolve_advice`
/// must be a pure function of that list and the method.
pub trait PolicyOracle: Send + Sync {
    /// Advice for `method`, in declaration order
    fn resolve_advice(&self, method: &MethodDescriptor) -> Vec<AdviceSpec>;

    /// Every advice declaration this policy can resolve to
    fn declared_advice(&self) -> &[AdviceSpec];
}

/// Matcher-driven policy over a fixed list of declarations
#[derive(Debug, Clone, Default)]
pub struct AdvicePolicy {
    specs: Vec<AdviceSpec>,
}

impl AdvicePolicy {
    /// Empty policy
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a declaration
    pub fn with(mut self, spec: AdviceSpec) -> Self {
        self.specs.push(spec);
        self
    }

    /// Add a declaration in place
    pub fn push(&mut self, spec: AdviceSpec) {
        self.specs.push(spec);
    }

    /// Number of declarations
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Check if the policy declares nothing
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

impl FromIterator<AdviceSpec> for AdvicePolicy {
    fn from_iter<I: IntoIterator<Item = AdviceSpec>>(iter: I) -> Self {
        Self {
            specs: iter.into_iter().collect(),
        }
    }
}

impl PolicyOracle for AdvicePolicy {
    fn resolve_advice(&self, method: &MethodDescriptor) -> Vec<AdviceSpec> {
        self.specs
            .iter()
            .filter(|spec| spec.matcher().matches(method))
            .cloned()
            .collect()
    }

    fn declared_advice(&self) -> &[AdviceSpec] {
        &self.specs
    }
}
