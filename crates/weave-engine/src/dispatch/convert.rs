//! Boundary conversions between caller values and declared types

use weave_bytecode::{Primitive, TypeRef};

use crate::descriptor::MethodDescriptor;
use crate::error::ConversionError;
use crate::value::Value;

/// Check `args` against the parameter list of `method`
pub(crate) fn check_arguments(method: &MethodDescriptor, args: &[Value]) -> Result<(), ConversionError> {
    let params = method.params();
    if args.len() != params.len() {
        return Err(ConversionError::Arity {
            method: method.to_string(),
            expected: params.len(),
            found: args.len(),
        });
    }
    for (index, (arg, ty)) in args.iter().zip(params).enumerate() {
        if !arg.conforms_to(ty) {
            return Err(ConversionError::Argument {
                method: method.to_string(),
                index,
                expected: ty.to_string(),
                found: arg.kind_name(),
            });
        }
    }
    Ok(())
}

/// Convert a chain result to primitive `p`
pub(crate) fn unbox(method: &MethodDescriptor, p: Primitive, value: Value) -> Result<Value, ConversionError> {
    if value.primitive() == Some(p) {
        return Ok(value);
    }
    if value.is_null() {
        return Err(ConversionError::NullToPrimitive {
            method: method.to_string(),
            expected: p.name().to_string(),
        });
    }
    Err(ConversionError::Return {
        method: method.to_string(),
        expected: p.name().to_string(),
        found: value.kind_name(),
    })
}

/// Check a result against reference type `ty`
pub(crate) fn check_cast(method: &MethodDescriptor, ty: &TypeRef, value: Value) -> Result<Value, ConversionError> {
    if value.conforms_to(ty) {
        Ok(value)
    } else {
        Err(ConversionError::Return {
            method: method.to_string(),
            expected: ty.to_string(),
            found: value.kind_name(),
        })
    }
}

/// Normalize a target's result to the declared return type
pub(crate) fn conform_return(method: &MethodDescriptor, value: Value) -> Result<Value, ConversionError> {
    match method.ret() {
        TypeRef::Void => Ok(Value::Void),
        TypeRef::Primitive(p) => unbox(method, *p, value),
        ty => check_cast(method, ty, value),
    }
}
