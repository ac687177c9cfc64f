//! Target type descriptors
//!
//! A [`TargetDescriptor`] is the engine's view of a proxied type: its identity
//! and its ordered method list. Method slots in generated units are the
//! indices of this list.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use weave_bytecode::{Signature, TypeRef};

use crate::value::Value;

/// Identity of a target type
///
/// The generation distinguishes successive definitions of the same type name
/// in environments that redefine types at run time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeIdentity {
    name: Arc<str>,
    generation: u32,
}

impl TypeIdentity {
    /// Generation-zero identity for `name`
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            generation: 0,
        }
    }

    /// Identity with an explicit generation
    pub fn with_generation(name: impl Into<Arc<str>>, generation: u32) -> Self {
        Self {
            name: name.into(),
            generation,
        }
    }

    /// Type name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Definition generation
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Identity of the next definition of this type
    pub fn redefined(&self) -> Self {
        Self {
            name: self.name.clone(),
            generation: self.generation + 1,
        }
    }
}

impl fmt::Display for TypeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.generation == 0 {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}@{}", self.name, self.generation)
        }
    }
}

/// Slot of a method within its target descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId(pub(crate) usize);

impl MethodId {
    /// Slot index
    pub fn index(self) -> usize {
        self.0
    }
}

/// One method of a target type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    id: MethodId,
    signature: Signature,
    declared_failures: Vec<String>,
    overridable: bool,
}

impl MethodDescriptor {
    /// Overridable method with no declared failures
    pub fn new(name: impl Into<String>, params: Vec<TypeRef>, ret: TypeRef) -> Self {
        Self {
            id: MethodId(0),
            signature: Signature::new(name, params, ret),
            declared_failures: Vec::new(),
            overridable: true,
        }
    }

    /// Declare a failure type the method may raise
    pub fn throws(mut self, failure: impl Into<String>) -> Self {
        self.declared_failures.push(failure.into());
        self
    }

    /// Mark the method as non-overridable (final, static or private)
    pub fn non_overridable(mut self) -> Self {
        self.overridable = false;
        self
    }

    /// Slot of this method
    pub fn id(&self) -> MethodId {
        self.id
    }

    /// Method name
    pub fn name(&self) -> &str {
        &self.signature.name
    }

    /// Parameter types
    pub fn params(&self) -> &[TypeRef] {
        &self.signature.params
    }

    /// Return type
    pub fn ret(&self) -> &TypeRef {
        &self.signature.ret
    }

    /// Emitter signature
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Declared failure type names
    pub fn declared_failures(&self) -> &[String] {
        &self.declared_failures
    }

    /// Whether a proxy may intercept this method
    pub fn is_overridable(&self) -> bool {
        self.overridable
    }

    /// Whether `args` match this method's parameter list
    pub fn accepts(&self, args: &[Value]) -> bool {
        args.len() == self.signature.params.len()
            && args
                .iter()
                .zip(&self.signature.params)
                .all(|(arg, ty)| arg.conforms_to(ty))
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.signature)
    }
}

/// Type identity plus ordered method list
#[derive(Debug, Clone)]
pub struct TargetDescriptor {
    identity: TypeIdentity,
    methods: Vec<MethodDescriptor>,
    by_name: FxHashMap<String, Vec<MethodId>>,
}

impl TargetDescriptor {
    /// Start describing a type
    pub fn builder(identity: impl Into<TypeIdentity>) -> TargetDescriptorBuilder {
        TargetDescriptorBuilder {
            identity: identity.into(),
            methods: Vec::new(),
        }
    }

    /// Type identity
    pub fn identity(&self) -> &TypeIdentity {
        &self.identity
    }

    /// Methods in slot order
    pub fn methods(&self) -> &[MethodDescriptor] {
        &self.methods
    }

    /// Look up a method by slot
    pub fn method(&self, id: MethodId) -> Option<&MethodDescriptor> {
        self.methods.get(id.0)
    }

    /// All overloads named `name`
    pub fn overloads(&self, name: &str) -> impl Iterator<Item = &MethodDescriptor> + '_ {
        self.by_name
            .get(name)
            .into_iter()
            .flatten()
            .map(move |id| &self.methods[id.0])
    }

    /// First overload of `name` that accepts `args`
    pub fn resolve(&self, name: &str, args: &[Value]) -> Option<&MethodDescriptor> {
        self.overloads(name).find(|m| m.accepts(args))
    }

    /// Number of methods
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Check if the type has no methods
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl From<&str> for TypeIdentity {
    fn from(name: &str) -> Self {
        TypeIdentity::new(name)
    }
}

impl From<String> for TypeIdentity {
    fn from(name: String) -> Self {
        TypeIdentity::new(name)
    }
}

/// Builder for [`TargetDescriptor`]
#[derive(Debug)]
pub struct TargetDescriptorBuilder {
    identity: TypeIdentity,
    methods: Vec<MethodDescriptor>,
}

impl TargetDescriptorBuilder {
    /// Append a method; its slot is its position
    pub fn method(mut self, mut method: MethodDescriptor) -> Self {
        method.id = MethodId(self.methods.len());
        self.methods.push(method);
        self
    }

    /// Finish the descriptor
    pub fn build(self) -> TargetDescriptor {
        let mut by_name: FxHashMap<String, Vec<MethodId>> = FxHashMap::default();
        for method in &self.methods {
            by_name
                .entry(method.name().to_string())
                .or_default()
                .push(method.id);
        }
        TargetDescriptor {
            identity: self.identity,
            methods: self.methods,
            by_name,
        }
    }
}
