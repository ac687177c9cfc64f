//! Type model for proxied method signatures
//!
//! Stubs preserve the exact declared types of a method, including whether a
//! numeric or boolean parameter is a raw primitive or its nullable boxed
//! form. Conversions between the two happen only at the chain boundary.

use std::fmt;

/// Primitive value kinds
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Primitive {
    /// Boolean
    Bool = 0x01,
    /// 32-bit signed integer
    I32 = 0x02,
    /// 64-bit signed integer
    I64 = 0x03,
    /// 64-bit float
    F64 = 0x04,
}

impl Primitive {
    /// Decode from the operand byte used by `Box`/`Unbox`
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::Bool),
            0x02 => Some(Self::I32),
            0x03 => Some(Self::I64),
            0x04 => Some(Self::F64),
            _ => None,
        }
    }

    /// Operand byte for this primitive
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Lowercase primitive name
    pub fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::F64 => "f64",
        }
    }

    /// Name of the boxed wrapper type
    pub fn boxed_name(self) -> &'static str {
        match self {
            Self::Bool => "Boolean",
            Self::I32 => "Integer",
            Self::I64 => "Long",
            Self::F64 => "Double",
        }
    }
}

/// A declared parameter or return type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    /// No value (return types only)
    Void,
    /// Raw primitive, never null
    Primitive(Primitive),
    /// Nullable boxed primitive
    Boxed(Primitive),
    /// Nullable string
    Str,
    /// Nullable reference to a named object type
    Object(String),
    /// Any reference value
    Any,
}

impl TypeRef {
    /// Shorthand for `TypeRef::Primitive(Primitive::I32)`
    pub const I32: TypeRef = TypeRef::Primitive(Primitive::I32);
    /// Shorthand for `TypeRef::Primitive(Primitive::I64)`
    pub const I64: TypeRef = TypeRef::Primitive(Primitive::I64);
    /// Shorthand for `TypeRef::Primitive(Primitive::F64)`
    pub const F64: TypeRef = TypeRef::Primitive(Primitive::F64);
    /// Shorthand for `TypeRef::Primitive(Primitive::Bool)`
    pub const BOOL: TypeRef = TypeRef::Primitive(Primitive::Bool);

    /// Object type by name
    pub fn object(name: impl Into<String>) -> Self {
        Self::Object(name.into())
    }

    /// True for raw primitives
    pub fn is_primitive(&self) -> bool {
        matches!(self, Self::Primitive(_))
    }

    /// True for types whose values are references (may be null)
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            Self::Boxed(_) | Self::Str | Self::Object(_) | Self::Any
        )
    }

    /// True for `Void`
    pub fn is_void(&self) -> bool {
        matches!(self, Self::Void)
    }

    /// Whether a value of type `other` can be stored where `self` is expected
    /// without a conversion instruction.
    pub fn is_assignable_from(&self, other: &TypeRef) -> bool {
        match (self, other) {
            (Self::Any, o) => o.is_reference(),
            (a, b) => a == b,
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Void => write!(f, "void"),
            Self::Primitive(p) => write!(f, "{}", p.name()),
            Self::Boxed(p) => write!(f, "{}", p.boxed_name()),
            Self::Str => write!(f, "String"),
            Self::Object(name) => write!(f, "{}", name),
            Self::Any => write!(f, "Object"),
        }
    }
}

/// Method signature as seen by the emitter
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    /// Method name
    pub name: String,
    /// Parameter types in declaration order
    pub params: Vec<TypeRef>,
    /// Return type
    pub ret: TypeRef,
}

impl Signature {
    /// Create a new signature
    pub fn new(name: impl Into<String>, params: Vec<TypeRef>, ret: TypeRef) -> Self {
        Self {
            name: name.into(),
            params,
            ret,
        }
    }

    /// Number of parameters
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", param)?;
        }
        write!(f, ") -> {}", self.ret)
    }
}
