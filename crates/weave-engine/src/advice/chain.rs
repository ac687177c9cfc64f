//! Resolved interceptor chains

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use crate::advice::interceptor::Interceptor;
use crate::advice::invocation::Invocation;
use crate::advice::spec::{AdviceKind, AdviceSpec, InterceptorId};
use crate::descriptor::MethodDescriptor;
use crate::error::CallError;
use crate::target::Target;
use crate::value::Value;

/// One element of a chain
#[derive(Clone)]
pub struct ChainLink {
    id: InterceptorId,
    kind: AdviceKind,
    order: i32,
    interceptor: Arc<dyn Interceptor>,
}

impl ChainLink {
    /// Interceptor identity
    pub fn id(&self) -> &InterceptorId {
        &self.id
    }

    /// Kind of the advice this link was built from
    pub fn kind(&self) -> AdviceKind {
        self.kind
    }

    /// Order key
    pub fn order(&self) -> i32 {
        self.order
    }

    /// Chain element
    pub fn interceptor(&self) -> &Arc<dyn Interceptor> {
        &self.interceptor
    }
}

impl fmt::Debug for ChainLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}, order={})", self.kind, self.id, self.order)
    }
}

/// Ordered interceptors for one method
///
/// Immutable once built and shared by every proxy of a blueprint; each call
/// walks it through its own [`Invocation`].
#[derive(Debug, Clone, Default)]
pub struct InterceptorChain {
    links: Vec<ChainLink>,
}

impl InterceptorChain {
    /// Build a chain sorted by order; equal orders keep declaration order
    pub fn build(specs: impl IntoIterator<Item = AdviceSpec>) -> Self {
        let mut links: Vec<ChainLink> = specs
            .into_iter()
            .map(|spec| ChainLink {
                id: spec.id().clone(),
                kind: spec.kind(),
                order: spec.order(),
                interceptor: spec.advice().to_interceptor(),
            })
            .collect();
        links.sort_by_key(|link| link.order);
        Self { links }
    }

    /// Number of interceptors
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Check if the chain has no interceptors
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Link at `index`
    pub fn get(&self, index: usize) -> Option<&ChainLink> {
        self.links.get(index)
    }

    /// Links in execution order
    pub fn links(&self) -> &[ChainLink] {
        &self.links
    }

    /// Interceptor identities in execution order
    pub fn ids(&self) -> Vec<&str> {
        self.links.iter().map(|link| link.id.as_str()).collect()
    }

    /// Run one call of `method` through the chain
    pub fn invoke<'a>(
        &'a self,
        target: &'a dyn Target,
        method: &'a MethodDescriptor,
        args: impl Into<Cow<'a, [Value]>>,
    ) -> Result<Value, CallError> {
        Invocation::new(target, method, args, self).run()
    }
}
