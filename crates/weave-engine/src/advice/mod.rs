//! Advice model
//!
//! Advice is declared as [`AdviceSpec`]s, resolved per method by a
//! [`PolicyOracle`], and compiled into an [`InterceptorChain`] that each call
//! walks with its own [`Invocation`].

mod chain;
mod interceptor;
mod invocation;
mod matcher;
mod policy;
mod spec;

pub use chain::{ChainLink, InterceptorChain};
pub use interceptor::{
    AfterAdvice, AfterReturningAdvice, BeforeAdvice, Interceptor, ThrowsAdvice, ThrowsOutcome,
};
pub use invocation::{Invocation, InvocationState, JoinPoint};
pub use matcher::MethodMatcher;
pub use policy::{AdvicePolicy, PolicyOracle};
pub use spec::{Advice, AdviceKind, AdviceSpec, InterceptorId};
