//! Weave Proxy Engine
//!
//! Runtime interception for typed targets. A [`ProxyFactory`] turns a
//! [`TargetDescriptor`] and a [`PolicyOracle`] into a shared
//! [`ProxyBlueprint`]: one dispatch stub per method, emitted and verified by
//! `weave-bytecode`, then linked into a dispatch table. Methods without
//! advice forward straight to the target; advised methods hand a fresh
//! [`Invocation`] to their resolved [`InterceptorChain`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use weave_engine::{AdvicePolicy, AdviceSpec, MethodDescriptor, ProxyFactory, TargetDescriptor, TypeRef};
//!
//! let descriptor = Arc::new(
//!     TargetDescriptor::builder("Calculator")
//!         .method(MethodDescriptor::new("add", vec![TypeRef::I32, TypeRef::I32], TypeRef::I32))
//!         .build(),
//! );
//! let policy = AdvicePolicy::new().with(AdviceSpec::before("log", |jp| {
//!     tracing::info!(method = jp.name(), "calling");
//!     Ok(())
//! }));
//! let proxy = ProxyFactory::new().create_proxy(&descriptor, calculator, &policy)?;
//! let sum = proxy.invoke("add", &[2.into(), 3.into()])?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod advice;
pub mod blueprint;
pub mod cache;
pub mod config;
pub mod descriptor;
pub mod dispatch;
pub mod error;
pub mod factory;
pub mod fingerprint;
pub mod proxy;
pub mod stats;
pub mod target;
pub mod value;

pub use advice::{
    Advice, AdviceKind, AdvicePolicy, AdviceSpec, AfterAdvice, AfterReturningAdvice, BeforeAdvice,
    ChainLink, Interceptor, InterceptorChain, InterceptorId, Invocation, InvocationState, JoinPoint,
    MethodMatcher, PolicyOracle, ThrowsAdvice, ThrowsOutcome,
};
pub use blueprint::{DirectReason, DispatchPlan, ProxyBlueprint};
pub use cache::BlueprintCache;
pub use config::{ConfigError, EngineConfig};
pub use descriptor::{MethodDescriptor, MethodId, TargetDescriptor, TargetDescriptorBuilder, TypeIdentity};
pub use error::{CallError, ChainStateError, ConversionError, Failure, GenerationError, ProxyError};
pub use factory::ProxyFactory;
pub use fingerprint::Fingerprint;
pub use proxy::Proxy;
pub use stats::{EngineStats, StatsSnapshot};
pub use target::{FnTarget, Target};
pub use value::{ObjectRef, Value};

pub use weave_bytecode::{Primitive, Signature, TypeRef};
