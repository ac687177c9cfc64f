//! Uniform value representation
//!
//! Every argument and return value travels as a [`Value`]. Whether a value is
//! a raw primitive or a boxed one is a property of the declared [`TypeRef`]
//! it is checked against, not of the value itself: `Value::I32(7)` satisfies
//! both `i32` and `Integer`, while `Value::Null` only satisfies reference
//! types.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use weave_bytecode::{Primitive, TypeRef};

/// Opaque reference to a named object
#[derive(Clone)]
pub struct ObjectRef {
    type_name: Arc<str>,
    data: Arc<dyn Any + Send + Sync>,
}

impl ObjectRef {
    /// Wrap `data` as an instance of `type_name`
    pub fn new<T: Any + Send + Sync>(type_name: impl Into<Arc<str>>, data: T) -> Self {
        Self {
            type_name: type_name.into(),
            data: Arc::new(data),
        }
    }

    /// Declared type name
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Borrow the payload as `T`
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.data.downcast_ref::<T>()
    }

    /// Identity comparison
    pub fn same_instance(&self, other: &ObjectRef) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:p}", self.type_name, Arc::as_ptr(&self.data) as *const u8)
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.same_instance(other)
    }
}

/// A call argument or result
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// No value (void return)
    Void,
    /// Null reference
    Null,
    /// Boolean
    Bool(bool),
    /// 32-bit integer
    I32(i32),
    /// 64-bit integer
    I64(i64),
    /// 64-bit float
    F64(f64),
    /// String
    Str(Arc<str>),
    /// Object reference
    Object(ObjectRef),
}

impl Value {
    /// String value
    pub fn str(s: impl Into<Arc<str>>) -> Self {
        Self::Str(s.into())
    }

    /// Short name of the value's runtime kind, used in error messages
    pub fn kind_name(&self) -> String {
        match self {
            Self::Void => "void".to_string(),
            Self::Null => "null".to_string(),
            Self::Bool(_) => "bool".to_string(),
            Self::I32(_) => "i32".to_string(),
            Self::I64(_) => "i64".to_string(),
            Self::F64(_) => "f64".to_string(),
            Self::Str(_) => "String".to_string(),
            Self::Object(obj) => obj.type_name().to_string(),
        }
    }

    /// Check if this is `Null`
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Primitive kind carried by this value, if any
    pub fn primitive(&self) -> Option<Primitive> {
        match self {
            Self::Bool(_) => Some(Primitive::Bool),
            Self::I32(_) => Some(Primitive::I32),
            Self::I64(_) => Some(Primitive::I64),
            Self::F64(_) => Some(Primitive::F64),
            _ => None,
        }
    }

    /// Whether this value may be stored where `ty` is declared
    pub fn conforms_to(&self, ty: &TypeRef) -> bool {
        match ty {
            TypeRef::Void => matches!(self, Self::Void),
            TypeRef::Primitive(p) => self.primitive() == Some(*p),
            TypeRef::Boxed(p) => self.is_null() || self.primitive() == Some(*p),
            TypeRef::Str => matches!(self, Self::Null | Self::Str(_)),
            TypeRef::Object(name) => match self {
                Self::Null => true,
                Self::Object(obj) => obj.type_name() == name,
                _ => false,
            },
            TypeRef::Any => !matches!(self, Self::Void),
        }
    }

    /// Get as i32
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Self::I32(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::I64(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::F64(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Get as object reference
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Void => write!(f, "void"),
            Self::Null => write!(f, "null"),
            Self::Bool(v) => write!(f, "{}", v),
            Self::I32(v) => write!(f, "{}", v),
            Self::I64(v) => write!(f, "{}", v),
            Self::F64(v) => write!(f, "{}", v),
            Self::Str(s) => write!(f, "{:?}", s),
            Self::Object(obj) => write!(f, "{:?}", obj),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::I32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::I64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::F64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.into())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v.into())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}
