//! Shared fixtures for the proxy integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use weave_engine::{
    Failure, MethodDescriptor, MethodId, Primitive, Target, TargetDescriptor, TypeIdentity, TypeRef,
    Value,
};

#[derive(Debug, Error)]
#[error("division by zero")]
pub struct ArithmeticError;

#[derive(Debug, Error)]
#[error("connection reset")]
pub struct TransientError;

/// Calculator type used throughout the tests
///
/// Slots: add(i32, i32), add(f64, f64), divide, find, describe, reset, version
pub fn calculator_descriptor() -> Arc<TargetDescriptor> {
    calculator_descriptor_with(TypeIdentity::new("Calculator"))
}

pub fn calculator_descriptor_with(identity: TypeIdentity) -> Arc<TargetDescriptor> {
    let long = TypeRef::Boxed(Primitive::I64);
    Arc::new(
        TargetDescriptor::builder(identity)
            .method(MethodDescriptor::new("add", vec![TypeRef::I32, TypeRef::I32], TypeRef::I32))
            .method(MethodDescriptor::new("add", vec![TypeRef::F64, TypeRef::F64], TypeRef::F64))
            .method(
                MethodDescriptor::new("divide", vec![TypeRef::I32, TypeRef::I32], TypeRef::I32)
                    .throws("ArithmeticError"),
            )
            .method(MethodDescriptor::new("find", vec![long.clone()], long))
            .method(MethodDescriptor::new("describe", vec![TypeRef::Any], TypeRef::Str))
            .method(MethodDescriptor::new("reset", vec![], TypeRef::Void))
            .method(MethodDescriptor::new("version", vec![], TypeRef::Str).non_overridable())
            .build(),
    )
}

/// Calculator instance counting how often it is entered
///
/// Optionally logs `target <name>` into a [`Recorder`] and fails its first
/// few calls with [`TransientError`].
pub struct Calculator {
    identity: TypeIdentity,
    calls: AtomicUsize,
    transient_failures: AtomicUsize,
    recorder: Option<Recorder>,
}

impl Calculator {
    pub fn new() -> Arc<Self> {
        Self::with_identity(TypeIdentity::new("Calculator"))
    }

    pub fn with_identity(identity: TypeIdentity) -> Arc<Self> {
        Self::build(identity, 0, None)
    }

    pub fn recording(recorder: &Recorder) -> Arc<Self> {
        Self::build(TypeIdentity::new("Calculator"), 0, Some(recorder.clone()))
    }

    pub fn flaky(failures: usize, recorder: &Recorder) -> Arc<Self> {
        Self::build(TypeIdentity::new("Calculator"), failures, Some(recorder.clone()))
    }

    fn build(identity: TypeIdentity, failures: usize, recorder: Option<Recorder>) -> Arc<Self> {
        Arc::new(Self {
            identity,
            calls: AtomicUsize::new(0),
            transient_failures: AtomicUsize::new(failures),
            recorder,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Target for Calculator {
    fn type_identity(&self) -> &TypeIdentity {
        &self.identity
    }

    fn invoke(&self, method: &MethodDescriptor, args: &[Value]) -> Result<Value, Failure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(recorder) = &self.recorder {
            recorder.push(format!("target {}", method.name()));
        }
        let transient = self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if transient {
            return Err(Failure::new(TransientError));
        }
        match (method.name(), args) {
            ("add", [Value::I32(a), Value::I32(b)]) => Ok(Value::I32(a.wrapping_add(*b))),
            ("add", [Value::F64(a), Value::F64(b)]) => Ok(Value::F64(a + b)),
            ("divide", [Value::I32(_), Value::I32(0)]) => Err(Failure::new(ArithmeticError)),
            ("divide", [Value::I32(a), Value::I32(b)]) => Ok(Value::I32(a / b)),
            ("find", [Value::I64(id)]) if *id >= 0 => Ok(Value::I64(id * 10)),
            ("find", [_]) => Ok(Value::Null),
            ("describe", [value]) => Ok(Value::str(value.to_string())),
            ("reset", []) => Ok(Value::Void),
            ("version", []) => Ok(Value::str("1.0")),
            _ => Err(Failure::msg(format!("unexpected call {}", method))),
        }
    }
}

/// Ordered log shared between advice and assertions
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: impl Into<String>) {
        self.events.lock().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

/// Slot of the first overload named `name`
pub fn calculator_method(descriptor: &TargetDescriptor, name: &str) -> MethodId {
    descriptor
        .overloads(name)
        .next()
        .map(|m| m.id())
        .unwrap_or_else(|| panic!("no method {}", name))
}
