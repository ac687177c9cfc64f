//! Proxy instances
//!
//! A [`Proxy`] is a blueprint bound to one target. It is cheap to clone and
//! safe to call from any number of threads; per-call state lives in the
//! invocation record of each call, never in the proxy.

use std::fmt;
use std::sync::Arc;

use crate::blueprint::ProxyBlueprint;
use crate::descriptor::{MethodDescriptor, MethodId, TypeIdentity};
use crate::dispatch::check_arguments;
use crate::error::CallError;
use crate::stats::EngineStats;
use crate::target::Target;
use crate::value::Value;

/// A blueprint bound to a target instance
#[derive(Clone)]
pub struct Proxy {
    blueprint: Arc<ProxyBlueprint>,
    target: Arc<dyn Target>,
    stats: Option<Arc<EngineStats>>,
}

impl Proxy {
    pub(crate) fn new(
        blueprint: Arc<ProxyBlueprint>,
        target: Arc<dyn Target>,
        stats: Option<Arc<EngineStats>>,
    ) -> Self {
        Self {
            blueprint,
            target,
            stats,
        }
    }

    /// Call the overload of `name` that accepts `args`
    pub fn invoke(&self, name: &str, args: &[Value]) -> Result<Value, CallError> {
        let method = self.resolve(name, args)?;
        self.dispatch(method, args)
    }

    /// Call the method in slot `id`
    pub fn invoke_method(&self, id: MethodId, args: &[Value]) -> Result<Value, CallError> {
        let method = self
            .blueprint
            .descriptor()
            .method(id)
            .ok_or_else(|| self.no_such_method(format!("#{}", id.index())))?;
        check_arguments(method, args)?;
        self.dispatch(method, args)
    }

    /// Shared blueprint
    pub fn blueprint(&self) -> &Arc<ProxyBlueprint> {
        &self.blueprint
    }

    /// Proxied target
    pub fn target(&self) -> &Arc<dyn Target> {
        &self.target
    }

    /// Give back the proxied target
    pub fn into_target(self) -> Arc<dyn Target> {
        self.target
    }

    /// Target type identity
    pub fn type_identity(&self) -> &TypeIdentity {
        self.blueprint.identity()
    }

    /// Whether two proxies run the same blueprint
    pub fn shares_blueprint(&self, other: &Proxy) -> bool {
        Arc::ptr_eq(&self.blueprint, &other.blueprint)
    }

    fn resolve<'p>(&'p self, name: &str, args: &[Value]) -> Result<&'p MethodDescriptor, CallError> {
        let descriptor = self.blueprint.descriptor();
        if let Some(method) = descriptor.resolve(name, args) {
            return Ok(method);
        }
        // a single overload gets the precise conversion error
        let mut overloads = descriptor.overloads(name);
        match (overloads.next(), overloads.next()) {
            (Some(only), None) => {
                check_arguments(only, args)?;
                Ok(only)
            }
            _ => Err(self.no_such_method(name.to_string())),
        }
    }

    fn dispatch(&self, method: &MethodDescriptor, args: &[Value]) -> Result<Value, CallError> {
        self.blueprint
            .invoke(&*self.target, method, args, self.stats.as_deref())
    }

    fn no_such_method(&self, method: String) -> CallError {
        CallError::NoSuchMethod {
            type_name: self.type_identity().to_string(),
            method,
        }
    }
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("type", &self.type_identity().to_string())
            .field("unit", &self.blueprint.unit_name())
            .finish()
    }
}
