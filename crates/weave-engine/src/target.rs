//! Proxied target instances

use std::fmt;

use crate::descriptor::{MethodDescriptor, TypeIdentity};
use crate::error::Failure;
use crate::value::Value;

/// An instance a proxy forwards to
///
/// Implementations must be safe to call from many threads at once; a proxy
/// holds its target behind an `Arc` and never serializes calls.
pub trait Target: Send + Sync {
    /// Identity of the instance's type
    fn type_identity(&self) -> &TypeIdentity;

    /// Run `method` with `args`
    ///
    /// `args` has already been checked against the method's parameter list.
    fn invoke(&self, method: &MethodDescriptor, args: &[Value]) -> Result<Value, Failure>;
}

/// Target backed by a closure
pub struct FnTarget<F> {
    identity: TypeIdentity,
    handler: F,
}

impl<F> FnTarget<F>
where
    F: Fn(&MethodDescriptor, &[Value]) -> Result<Value, Failure> + Send + Sync,
{
    /// Target of type `identity` dispatching every call to `handler`
    pub fn new(identity: impl Into<TypeIdentity>, handler: F) -> Self {
        Self {
            identity: identity.into(),
            handler,
        }
    }
}

impl<F> Target for FnTarget<F>
where
    F: Fn(&MethodDescriptor, &[Value]) -> Result<Value, Failure> + Send + Sync,
{
    fn type_identity(&self) -> &TypeIdentity {
        &self.identity
    }

    fn invoke(&self, method: &MethodDescriptor, args: &[Value]) -> Result<Value, Failure> {
        (self.handler)(method, args)
    }
}

impl<F> fmt::Debug for FnTarget<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTarget")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}
