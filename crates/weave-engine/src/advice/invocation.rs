//! Invocation records
//!
//! An [`Invocation`] is created per intercepted call and walks the resolved
//! chain. Its cursor only moves forward while a traversal descends; when a
//! nested `proceed()` returns, the cursor is back at the interceptor that
//! called it, so an interceptor that proceeds again re-runs only what lies
//! downstream of itself.

use std::borrow::Cow;
use std::fmt;

use crate::advice::chain::InterceptorChain;
use crate::descriptor::{MethodDescriptor, TypeIdentity};
use crate::dispatch::check_arguments;
use crate::error::{CallError, ChainStateError};
use crate::target::Target;
use crate::value::Value;

/// Read-only view of a call, handed to non-around advice
#[derive(Debug, Clone, Copy)]
pub struct JoinPoint<'a> {
    method: &'a MethodDescriptor,
    args: &'a [Value],
    target_type: &'a TypeIdentity,
}

impl<'a> JoinPoint<'a> {
    /// Method being called
    pub fn method(&self) -> &'a MethodDescriptor {
        self.method
    }

    /// Method name
    pub fn name(&self) -> &'a str {
        self.method.name()
    }

    /// Current arguments
    pub fn arguments(&self) -> &'a [Value] {
        self.args
    }

    /// Argument at `index`
    pub fn argument(&self, index: usize) -> Option<&'a Value> {
        self.args.get(index)
    }

    /// Target type
    pub fn target_type(&self) -> &'a TypeIdentity {
        self.target_type
    }
}

/// Furthest progress of an invocation
///
/// States are ordered; the recorded state never moves backwards even when an
/// interceptor re-proceeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InvocationState {
    /// Created, not yet run
    NotStarted,
    /// Deepest interceptor entered
    InChain(usize),
    /// The target was reached at least once
    AtTarget,
    /// Returned normally
    Completed,
    /// Returned with an error
    Failed,
}

impl InvocationState {
    /// Whether the invocation has finished
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// A single intercepted call moving through its chain
pub struct Invocation<'a> {
    target: &'a dyn Target,
    method: &'a MethodDescriptor,
    args: Cow<'a, [Value]>,
    chain: &'a InterceptorChain,
    cursor: usize,
    state: InvocationState,
    target_calls: u32,
}

impl<'a> Invocation<'a> {
    /// Record a call of `method` on `target` through `chain`
    pub fn new(
        target: &'a dyn Target,
        method: &'a MethodDescriptor,
        args: impl Into<Cow<'a, [Value]>>,
        chain: &'a InterceptorChain,
    ) -> Self {
        Self {
            target,
            method,
            args: args.into(),
            chain,
            cursor: 0,
            state: InvocationState::NotStarted,
            target_calls: 0,
        }
    }

    /// Method being called
    pub fn method(&self) -> &'a MethodDescriptor {
        self.method
    }

    /// Current arguments
    pub fn arguments(&self) -> &[Value] {
        &self.args
    }

    /// Target type
    pub fn target_type(&self) -> &TypeIdentity {
        self.target.type_identity()
    }

    /// Furthest progress so far
    pub fn state(&self) -> InvocationState {
        self.state
    }

    /// Position of the interceptor currently running
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Number of interceptors in the chain
    pub fn chain_len(&self) -> usize {
        self.chain.len()
    }

    /// How many times the target has been called
    pub fn target_calls(&self) -> u32 {
        self.target_calls
    }

    /// Read-only view for advice
    pub fn join_point(&self) -> JoinPoint<'_> {
        JoinPoint {
            method: self.method,
            args: &self.args,
            target_type: self.target.type_identity(),
        }
    }

    /// Enter the chain at its first interceptor
    pub fn run(&mut self) -> Result<Value, CallError> {
        if self.state != InvocationState::NotStarted {
            return Err(ChainStateError::AlreadyStarted {
                method: self.method.to_string(),
            }
            .into());
        }
        self.cursor = 0;
        let result = self.step();
        self.state = if result.is_ok() {
            InvocationState::Completed
        } else {
            InvocationState::Failed
        };
        result
    }

    /// Run the rest of the chain after the calling interceptor
    pub fn proceed(&mut self) -> Result<Value, CallError> {
        self.ensure_running()?;
        debug_assert!(self.cursor < self.chain.len(), "proceed() outside an interceptor");
        self.cursor += 1;
        let result = self.step();
        self.cursor -= 1;
        result
    }

    /// Replace the arguments, then [`proceed`](Self::proceed)
    ///
    /// The replacement is checked against the method's parameter list and
    /// stays in effect for the rest of the invocation.
    pub fn proceed_with(&mut self, args: Vec<Value>) -> Result<Value, CallError> {
        self.ensure_running()?;
        check_arguments(self.method, &args)?;
        self.args = Cow::Owned(args);
        self.proceed()
    }

    fn ensure_running(&self) -> Result<(), ChainStateError> {
        let method = || self.method.to_string();
        match self.state {
            InvocationState::NotStarted => Err(ChainStateError::NotStarted { method: method() }),
            InvocationState::Completed => Err(ChainStateError::Terminated {
                method: method(),
                state: "completed",
            }),
            InvocationState::Failed => Err(ChainStateError::Terminated {
                method: method(),
                state: "failed",
            }),
            InvocationState::InChain(_) | InvocationState::AtTarget => Ok(()),
        }
    }

    fn step(&mut self) -> Result<Value, CallError> {
        let chain = self.chain;
        match chain.get(self.cursor) {
            Some(link) => {
                self.advance(InvocationState::InChain(self.cursor));
                link.interceptor().invoke(self)
            }
            None => {
                self.advance(InvocationState::AtTarget);
                self.target_calls += 1;
                Ok(self.target.invoke(self.method, &self.args)?)
            }
        }
    }

    fn advance(&mut self, state: InvocationState) {
        if state > self.state {
            self.state = state;
        }
    }
}

impl fmt::Debug for Invocation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("method", &self.method.to_string())
            .field("args", &self.args)
            .field("cursor", &self.cursor)
            .field("chain_len", &self.chain.len())
            .field("state", &self.state)
            .finish()
    }
}
