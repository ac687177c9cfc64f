//! Error types for proxy generation and invocation

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use weave_bytecode::{EmitError, VerifyError};

use crate::dispatch::LinkError;

/// A failure raised by a target method or by advice
///
/// Failures are shared, not copied: cloning a `Failure` keeps the same
/// underlying error, so the caller can tell that what reached it is exactly
/// what the target raised.
#[derive(Clone)]
pub struct Failure {
    inner: Arc<dyn StdError + Send + Sync + 'static>,
}

#[derive(Debug, Error)]
#[error("{0}")]
struct MessageFailure(String);

impl Failure {
    /// Wrap an error value
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(error),
        }
    }

    /// Failure carrying only a message
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(MessageFailure(message.into()))
    }

    /// Whether `other` is the very same failure instance
    pub fn same_as(&self, other: &Failure) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Borrow the underlying error as `E`
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.inner.downcast_ref::<E>()
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Failure({:?})", self.inner)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl StdError for Failure {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.source()
    }
}

/// Misuse of an invocation record's state machine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainStateError {
    /// `proceed()` before the chain was entered
    #[error("proceed() on `{method}` before the invocation was started")]
    NotStarted {
        /// Method signature
        method: String,
    },

    /// `proceed()` after the invocation finished
    #[error("proceed() on `{method}` after the invocation {state}")]
    Terminated {
        /// Method signature
        method: String,
        /// "completed" or "failed"
        state: &'static str,
    },

    /// `run()` on an invocation that already left `NotStarted`
    #[error("invocation for `{method}` was already started")]
    AlreadyStarted {
        /// Method signature
        method: String,
    },
}

/// Argument or result conversion failure at the proxy boundary
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    /// Wrong number of arguments
    #[error("`{method}` expects {expected} arguments, got {found}")]
    Arity {
        /// Method signature
        method: String,
        /// Declared parameter count
        expected: usize,
        /// Supplied argument count
        found: usize,
    },

    /// Argument does not conform to its declared type
    #[error("`{method}` argument {index}: expected {expected}, found {found}")]
    Argument {
        /// Method signature
        method: String,
        /// Argument index
        index: usize,
        /// Declared type
        expected: String,
        /// Supplied value kind
        found: String,
    },

    /// Null reached a primitive return
    #[error("`{method}` produced null for primitive return type {expected}")]
    NullToPrimitive {
        /// Method signature
        method: String,
        /// Declared primitive
        expected: String,
    },

    /// Result does not conform to the declared return type
    #[error("`{method}` produced {found} where {expected} was declared")]
    Return {
        /// Method signature
        method: String,
        /// Declared return type
        expected: String,
        /// Produced value kind
        found: String,
    },
}

/// Error produced by a proxied call
#[derive(Debug, Clone, Error)]
pub enum CallError {
    /// Raised by the target or by advice
    #[error(transparent)]
    Failure(#[from] Failure),

    /// Invocation record misuse
    #[error(transparent)]
    ChainState(#[from] ChainStateError),

    /// Boundary conversion failure
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// No method of the type matches the call
    #[error("No method `{method}` on {type_name} accepts the given arguments")]
    NoSuchMethod {
        /// Type name
        type_name: String,
        /// Requested method name or slot
        method: String,
    },

    /// A stub that skipped verification misbehaved
    #[error("Malformed stub for `{method}` at offset {offset}: {reason}")]
    MalformedStub {
        /// Method signature
        method: String,
        /// Instruction offset
        offset: usize,
        /// What went wrong
        reason: &'static str,
    },
}

impl CallError {
    /// Shorthand for a message-only failure
    pub fn raise(message: impl Into<String>) -> Self {
        Self::Failure(Failure::msg(message))
    }

    /// The failure, if this error is one
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Self::Failure(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Proxy blueprint generation failure
///
/// Cached alongside successful blueprints, so it must be cheap to clone.
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    /// A method could not be encoded
    #[error("Cannot generate proxy for {type_name}: {source}")]
    Emit {
        /// Target type
        type_name: String,
        /// Emitter error naming the signature
        #[source]
        source: EmitError,
    },

    /// The emitted unit failed verification
    #[error("Dispatch unit for {type_name} rejected: {source}")]
    Rejected {
        /// Target type
        type_name: String,
        /// Verifier error naming the signature
        #[source]
        source: VerifyError,
    },

    /// The verified unit could not be linked
    #[error("Dispatch unit `{unit}` failed to load: {source}")]
    Load {
        /// Unit name
        unit: String,
        /// Linker error
        #[source]
        source: LinkError,
    },
}

/// Error returned by proxy creation
#[derive(Debug, Clone, Error)]
pub enum ProxyError {
    /// Blueprint generation failed
    #[error(transparent)]
    Generation(#[from] GenerationError),

    /// The target instance is not of the described type
    #[error("Target type mismatch: descriptor is {expected}, instance is {found}")]
    TargetMismatch {
        /// Described identity
        expected: String,
        /// Instance identity
        found: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("division by zero")]
    struct DivideByZero;

    #[test]
    fn test_failure_identity_survives_clone() {
        let failure = Failure::new(DivideByZero);
        let copy = failure.clone();
        assert!(failure.same_as(&copy));
        assert!(!failure.same_as(&Failure::new(DivideByZero)));
        assert!(copy.downcast_ref::<DivideByZero>().is_some());
    }

    #[test]
    fn test_call_error_transparent_display() {
        let err: CallError = Failure::msg("boom").into();
        assert_eq!(err.to_string(), "boom");
        assert!(err.failure().is_some());

        let err: CallError = ChainStateError::NotStarted {
            method: "run() -> void".to_string(),
        }
        .into();
        assert!(err.to_string().contains("before the invocation was started"));
        assert!(err.failure().is_none());
    }
}
