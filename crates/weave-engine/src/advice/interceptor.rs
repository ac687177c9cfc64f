//! Advice logic and the adapters that turn it into chain elements
//!
//! The chain only knows [`Interceptor`]. Every other advice kind is wrapped in
//! an adapter that calls `proceed()` exactly once and applies the advice
//! before or after it.

use std::sync::Arc;

use crate::advice::invocation::{Invocation, JoinPoint};
use crate::error::{CallError, Failure};
use crate::value::Value;

/// Around advice: full control over whether and how the call proceeds
pub trait Interceptor: Send + Sync {
    /// Handle the invocation, usually by calling [`Invocation::proceed`]
    fn invoke(&self, invocation: &mut Invocation<'_>) -> Result<Value, CallError>;
}

impl<F> Interceptor for F
where
    F: Fn(&mut Invocation<'_>) -> Result<Value, CallError> + Send + Sync,
{
    fn invoke(&self, invocation: &mut Invocation<'_>) -> Result<Value, CallError> {
        self(invocation)
    }
}

/// Runs before the rest of the chain; a failure aborts the call
pub trait BeforeAdvice: Send + Sync {
    /// Observe the call about to happen
    fn before(&self, join_point: &JoinPoint<'_>) -> Result<(), Failure>;
}

/// Runs after a normal return and observes the result
pub trait AfterAdvice: Send + Sync {
    /// Observe the result
    fn after(&self, join_point: &JoinPoint<'_>, result: &Value) -> Result<(), Failure>;
}

/// Runs after a normal return and may replace the result
pub trait AfterReturningAdvice: Send + Sync {
    /// Produce the result handed upstream
    fn after_returning(&self, join_point: &JoinPoint<'_>, result: Value) -> Result<Value, Failure>;
}

/// What throws advice does with a failure
#[derive(Debug, Clone, PartialEq)]
pub enum ThrowsOutcome {
    /// Let the original failure continue upstream
    Rethrow,
    /// Swallow the failure and return this value instead
    Recover(Value),
}

/// Runs when the rest of the chain raises a [`Failure`]
pub trait ThrowsAdvice: Send + Sync {
    /// Decide the fate of `failure`
    fn after_throwing(&self, join_point: &JoinPoint<'_>, failure: &Failure) -> ThrowsOutcome;
}

pub(crate) struct BeforeFn<F>(pub(crate) F);

impl<F> BeforeAdvice for BeforeFn<F>
where
    F: Fn(&JoinPoint<'_>) -> Result<(), Failure> + Send + Sync,
{
    fn before(&self, join_point: &JoinPoint<'_>) -> Result<(), Failure> {
        (self.0)(join_point)
    }
}

pub(crate) struct AfterFn<F>(pub(crate) F);

impl<F> AfterAdvice for AfterFn<F>
where
    F: Fn(&JoinPoint<'_>, &Value) -> Result<(), Failure> + Send + Sync,
{
    fn after(&self, join_point: &JoinPoint<'_>, result: &Value) -> Result<(), Failure> {
        (self.0)(join_point, result)
    }
}

pub(crate) struct AfterReturningFn<F>(pub(crate) F);

impl<F> AfterReturningAdvice for AfterReturningFn<F>
where
    F: Fn(&JoinPoint<'_>, Value) -> Result<Value, Failure> + Send + Sync,
{
    fn after_returning(&self, join_point: &JoinPoint<'_>, result: Value) -> Result<Value, Failure> {
        (self.0)(join_point, result)
    }
}

pub(crate) struct ThrowsFn<F>(pub(crate) F);

impl<F> ThrowsAdvice for ThrowsFn<F>
where
    F: Fn(&JoinPoint<'_>, &Failure) -> ThrowsOutcome + Send + Sync,
{
    fn after_throwing(&self, join_point: &JoinPoint<'_>, failure: &Failure) -> ThrowsOutcome {
        (self.0)(join_point, failure)
    }
}

pub(crate) struct BeforeInterceptor<A: ?Sized>(pub(crate) Arc<A>);

impl<A: BeforeAdvice + ?Sized> Interceptor for BeforeInterceptor<A> {
    fn invoke(&self, invocation: &mut Invocation<'_>) -> Result<Value, CallError> {
        self.0.before(&invocation.join_point())?;
        invocation.proceed()
    }
}

pub(crate) struct AfterInterceptor<A: ?Sized>(pub(crate) Arc<A>);

impl<A: AfterAdvice + ?Sized> Interceptor for AfterInterceptor<A> {
    fn invoke(&self, invocation: &mut Invocation<'_>) -> Result<Value, CallError> {
        let result = invocation.proceed()?;
        self.0.after(&invocation.join_point(), &result)?;
        Ok(result)
    }
}

pub(crate) struct AfterReturningInterceptor<A: ?Sized>(pub(crate) Arc<A>);

impl<A: AfterReturningAdvice + ?Sized> Interceptor for AfterReturningInterceptor<A> {
    fn invoke(&self, invocation: &mut Invocation<'_>) -> Result<Value, CallError> {
        let result = invocation.proceed()?;
        Ok(self.0.after_returning(&invocation.join_point(), result)?)
    }
}

pub(crate) struct ThrowsInterceptor<A: ?Sized>(pub(crate) Arc<A>);

impl<A: ThrowsAdvice + ?Sized> Interceptor for ThrowsInterceptor<A> {
    fn invoke(&self, invocation: &mut Invocation<'_>) -> Result<Value, CallError> {
        match invocation.proceed() {
            Err(CallError::Failure(failure)) => {
                match self.0.after_throwing(&invocation.join_point(), &failure) {
                    ThrowsOutcome::Rethrow => Err(CallError::Failure(failure)),
                    ThrowsOutcome::Recover(value) => Ok(value),
                }
            }
            other => other,
        }
    }
}
