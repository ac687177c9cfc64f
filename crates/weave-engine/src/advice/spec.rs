//! Advice declarations

use std::fmt;
use std::sync::Arc;

use crate::advice::interceptor::{
    AfterAdvice, AfterFn, AfterInterceptor, AfterReturningAdvice, AfterReturningFn,
    AfterReturningInterceptor, BeforeAdvice, BeforeFn, BeforeInterceptor, Interceptor,
    ThrowsAdvice, ThrowsFn, ThrowsInterceptor, ThrowsOutcome,
};
use crate::advice::invocation::{Invocation, JoinPoint};
use crate::advice::matcher::MethodMatcher;
use crate::error::{CallError, Failure};
use crate::value::Value;

/// Advice kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdviceKind {
    /// Before the call
    Before,
    /// After a normal return, observing the result
    After,
    /// After a normal return, replacing the result
    AfterReturning,
    /// On failure
    AfterThrowing,
    /// Wrapping the call
    Around,
}

impl AdviceKind {
    /// Stable tag
    pub fn name(self) -> &'static str {
        match self {
            Self::Before => "before",
            Self::After => "after",
            Self::AfterReturning => "after-returning",
            Self::AfterThrowing => "after-throwing",
            Self::Around => "around",
        }
    }
}

impl fmt::Display for AdviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Stable identity of an interceptor within a policy
///
/// Two policies with the same identities, orders and matchers share proxy
/// blueprints, so an identity must name one piece of advice logic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InterceptorId(Arc<str>);

impl InterceptorId {
    /// Identity string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for InterceptorId {
    fn from(id: &str) -> Self {
        Self(id.into())
    }
}

impl From<String> for InterceptorId {
    fn from(id: String) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for InterceptorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Advice logic of one kind
#[derive(Clone)]
pub enum Advice {
    /// Before advice
    Before(Arc<dyn BeforeAdvice>),
    /// After advice
    After(Arc<dyn AfterAdvice>),
    /// After-returning advice
    AfterReturning(Arc<dyn AfterReturningAdvice>),
    /// Throws advice
    AfterThrowing(Arc<dyn ThrowsAdvice>),
    /// Around advice
    Around(Arc<dyn Interceptor>),
}

impl Advice {
    /// Kind of this advice
    pub fn kind(&self) -> AdviceKind {
        match self {
            Self::Before(_) => AdviceKind::Before,
            Self::After(_) => AdviceKind::After,
            Self::AfterReturning(_) => AdviceKind::AfterReturning,
            Self::AfterThrowing(_) => AdviceKind::AfterThrowing,
            Self::Around(_) => AdviceKind::Around,
        }
    }

    /// Adapt to a chain element
    pub fn to_interceptor(&self) -> Arc<dyn Interceptor> {
        match self {
            Self::Before(a) => Arc::new(BeforeInterceptor(a.clone())),
            Self::After(a) => Arc::new(AfterInterceptor(a.clone())),
            Self::AfterReturning(a) => Arc::new(AfterReturningInterceptor(a.clone())),
            Self::AfterThrowing(a) => Arc::new(ThrowsInterceptor(a.clone())),
            Self::Around(a) => a.clone(),
        }
    }
}

impl fmt::Debug for Advice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Advice::{:?}", self.kind())
    }
}

/// One advice declaration: logic, order, identity and method selection
#[derive(Debug, Clone)]
pub struct AdviceSpec {
    id: InterceptorId,
    order: i32,
    matcher: MethodMatcher,
    advice: Advice,
}

impl AdviceSpec {
    /// Declare `advice` under `id`, matching every method at order 0
    pub fn new(id: impl Into<InterceptorId>, advice: Advice) -> Self {
        Self {
            id: id.into(),
            order: 0,
            matcher: MethodMatcher::Any,
            advice,
        }
    }

    /// Before advice from a closure
    pub fn before<F>(id: impl Into<InterceptorId>, f: F) -> Self
    where
        F: Fn(&JoinPoint<'_>) -> Result<(), Failure> + Send + Sync + 'static,
    {
        Self::new(id, Advice::Before(Arc::new(BeforeFn(f))))
    }

    /// After advice from a closure
    pub fn after<F>(id: impl Into<InterceptorId>, f: F) -> Self
    where
        F: Fn(&JoinPoint<'_>, &Value) -> Result<(), Failure> + Send + Sync + 'static,
    {
        Self::new(id, Advice::After(Arc::new(AfterFn(f))))
    }

    /// After-returning advice from a closure
    pub fn after_returning<F>(id: impl Into<InterceptorId>, f: F) -> Self
    where
        F: Fn(&JoinPoint<'_>, Value) -> Result<Value, Failure> + Send + Sync + 'static,
    {
        Self::new(id, Advice::AfterReturning(Arc::new(AfterReturningFn(f))))
    }

    /// Throws advice from a closure
    pub fn after_throwing<F>(id: impl Into<InterceptorId>, f: F) -> Self
    where
        F: Fn(&JoinPoint<'_>, &Failure) -> ThrowsOutcome + Send + Sync + 'static,
    {
        Self::new(id, Advice::AfterThrowing(Arc::new(ThrowsFn(f))))
    }

    /// Around advice from a closure
    pub fn around<F>(id: impl Into<InterceptorId>, f: F) -> Self
    where
        F: Fn(&mut Invocation<'_>) -> Result<Value, CallError> + Send + Sync + 'static,
    {
        Self::new(id, Advice::Around(Arc::new(f)))
    }

    /// Set the order; lower runs first (outermost)
    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    /// Restrict the methods this advice applies to
    pub fn matching(mut self, matcher: MethodMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    /// Interceptor identity
    pub fn id(&self) -> &InterceptorId {
        &self.id
    }

    /// Order key
    pub fn order(&self) -> i32 {
        self.order
    }

    /// Method matcher
    pub fn matcher(&self) -> &MethodMatcher {
        &self.matcher
    }

    /// Advice logic
    pub fn advice(&self) -> &Advice {
        &self.advice
    }

    /// Advice kind
    pub fn kind(&self) -> AdviceKind {
        self.advice.kind()
    }
}
