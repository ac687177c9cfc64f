//! Dispatch unit verification
//!
//! Every stub is checked by abstract interpretation over a typed operand
//! stack before the unit may be linked. A unit that passes verification can
//! only fail at run time through value conversions (`UNBOX`, `CHECKCAST`),
//! never through a malformed stack.

use crate::encoder::{decode_stub, DecodeError, Instruction};
use crate::types::{Primitive, Signature, TypeRef};
use crate::unit::UnitDescriptor;

/// Default operand stack limit
pub const DEFAULT_MAX_STACK_DEPTH: usize = 64;

/// Stub verification errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    /// Stub bodies do not match the unit checksum
    #[error("Checksum mismatch in unit `{unit}`: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        /// Unit name
        unit: String,
        /// Stored checksum
        expected: u32,
        /// Recomputed checksum
        actual: u32,
    },

    /// Stub could not be decoded
    #[error("Malformed stub for `{method}`: {source}")]
    Decode {
        /// Rendered signature
        method: String,
        /// Decoder failure
        source: DecodeError,
    },

    /// Stack underflow
    #[error("Stack underflow in `{method}` at offset {offset}")]
    StackUnderflow {
        /// Rendered signature
        method: String,
        /// Instruction offset
        offset: usize,
    },

    /// Stack overflow
    #[error("Stack overflow in `{method}` at offset {offset} (depth: {depth})")]
    StackOverflow {
        /// Rendered signature
        method: String,
        /// Instruction offset
        offset: usize,
        /// Depth reached
        depth: usize,
    },

    /// Operand has the wrong type
    #[error("Type mismatch in `{method}` at offset {offset}: expected {expected}, found {found}")]
    TypeMismatch {
        /// Rendered signature
        method: String,
        /// Instruction offset
        offset: usize,
        /// Expected operand
        expected: String,
        /// Actual operand
        found: String,
    },

    /// Argument index out of range
    #[error("Invalid argument reference in `{method}`: index {index} (arity {arity}) at offset {offset}")]
    InvalidArgRef {
        /// Rendered signature
        method: String,
        /// Argument index
        index: usize,
        /// Method arity
        arity: usize,
        /// Instruction offset
        offset: usize,
    },

    /// Method slot out of range
    #[error("Invalid method slot {slot} in `{method}` at offset {offset}")]
    InvalidSlot {
        /// Rendered signature
        method: String,
        /// Slot operand
        slot: u16,
        /// Instruction offset
        offset: usize,
    },

    /// Chain index out of range
    #[error("Invalid chain reference {chain} in `{method}` at offset {offset}")]
    InvalidChainRef {
        /// Rendered signature
        method: String,
        /// Chain operand
        chain: u16,
        /// Instruction offset
        offset: usize,
    },

    /// Type table index out of range, or not a reference type
    #[error("Invalid type reference #{index} in `{method}` at offset {offset}")]
    InvalidTypeRef {
        /// Rendered signature
        method: String,
        /// Type table index
        index: u16,
        /// Instruction offset
        offset: usize,
    },

    /// Call site argument count differs from the callee arity
    #[error("Argument count mismatch in `{method}` at offset {offset}: callee takes {expected}, got {found}")]
    ArgCountMismatch {
        /// Rendered signature
        method: String,
        /// Instruction offset
        offset: usize,
        /// Callee arity
        expected: usize,
        /// Operand argc
        found: usize,
    },

    /// Values left on the stack at return
    #[error("Unbalanced stack in `{method}` at offset {offset}: {remaining} values remaining")]
    UnbalancedStack {
        /// Rendered signature
        method: String,
        /// Instruction offset
        offset: usize,
        /// Leftover value count
        remaining: usize,
    },

    /// Instructions follow the return
    #[error("Unreachable code in `{method}` at offset {offset}")]
    UnreachableCode {
        /// Rendered signature
        method: String,
        /// Offset of the first unreachable instruction
        offset: usize,
    },

    /// Execution falls off the end of the stub
    #[error("Execution falls off end of `{method}`")]
    FallOffEnd {
        /// Rendered signature
        method: String,
    },
}

/// Abstract operand on the verifier stack
#[derive(Debug, Clone, PartialEq, Eq)]
enum StackType {
    /// The held target reference
    Target,
    /// A value of a declared type
    Value(TypeRef),
    /// An invocation record
    Invocation,
}

impl std::fmt::Display for StackType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Target => write!(f, "target"),
            Self::Value(ty) => write!(f, "{}", ty),
            Self::Invocation => write!(f, "invocation"),
        }
    }
}

/// Verify every stub in a unit
pub fn verify_unit(unit: &UnitDescriptor, max_stack_depth: usize) -> Result<(), VerifyError> {
    let actual = unit.compute_checksum();
    if actual != unit.checksum {
        return Err(VerifyError::ChecksumMismatch {
            unit: unit.name.clone(),
            expected: unit.checksum,
            actual,
        });
    }

    for method in &unit.methods {
        let mut verifier = StubVerifier {
            unit,
            signature: &method.signature,
            method: method.signature.to_string(),
            stack: Vec::with_capacity(8),
            max_stack_depth,
        };
        verifier.verify(&method.code)?;
    }
    Ok(())
}

struct StubVerifier<'a> {
    unit: &'a UnitDescriptor,
    signature: &'a Signature,
    method: String,
    stack: Vec<StackType>,
    max_stack_depth: usize,
}

impl<'a> StubVerifier<'a> {
    fn verify(&mut self, code: &[u8]) -> Result<(), VerifyError> {
        let instructions = decode_stub(code).map_err(|source| VerifyError::Decode {
            method: self.method.clone(),
            source,
        })?;

        let mut returned = false;
        for (offset, instruction) in instructions {
            if returned {
                return Err(VerifyError::UnreachableCode {
                    method: self.method.clone(),
                    offset,
                });
            }
            self.step(offset, instruction)?;
            returned = instruction.opcode().is_return();
        }

        if !returned {
            return Err(VerifyError::FallOffEnd {
                method: self.method.clone(),
            });
        }
        Ok(())
    }

    fn step(&mut self, offset: usize, instruction: Instruction) -> Result<(), VerifyError> {
        let signature = self.signature;
        match instruction {
            Instruction::Nop => {}
            Instruction::Pop => {
                self.pop(offset)?;
            }
            Instruction::LoadTarget => self.push(offset, StackType::Target)?,
            Instruction::LoadArg(index) => {
                let param = signature.params.get(index as usize).ok_or_else(|| {
                    VerifyError::InvalidArgRef {
                        method: self.method.clone(),
                        index: index as usize,
                        arity: signature.arity(),
                        offset,
                    }
                })?;
                self.push(offset, StackType::Value(param.clone()))?;
            }
            Instruction::Box(p) => {
                self.pop_expect(offset, &TypeRef::Primitive(p))?;
                self.push(offset, StackType::Value(TypeRef::Boxed(p)))?;
            }
            Instruction::Unbox(p) => {
                let operand = self.pop(offset)?;
                if !is_unboxable(&operand, p) {
                    return Err(self.mismatch(
                        offset,
                        format!("Object or {}", p.boxed_name()),
                        &operand,
                    ));
                }
                self.push(offset, StackType::Value(TypeRef::Primitive(p)))?;
            }
            Instruction::CheckCast(index) => {
                let target = match self.unit.type_at(index) {
                    Some(ty) if ty.is_reference() => ty.clone(),
                    _ => {
                        return Err(VerifyError::InvalidTypeRef {
                            method: self.method.clone(),
                            index,
                            offset,
                        })
                    }
                };
                let operand = self.pop(offset)?;
                match &operand {
                    StackType::Value(ty) if ty.is_reference() => {}
                    _ => return Err(self.mismatch(offset, "reference".to_string(), &operand)),
                }
                self.push(offset, StackType::Value(target))?;
            }
            Instruction::InvokeTarget { slot, argc } => {
                let callee = self.callee(offset, slot, argc)?;
                for param in callee.params.iter().rev() {
                    self.pop_expect(offset, param)?;
                }
                let receiver = self.pop(offset)?;
                if receiver != StackType::Target {
                    return Err(self.mismatch(offset, "target".to_string(), &receiver));
                }
                if !callee.ret.is_void() {
                    self.push(offset, StackType::Value(callee.ret.clone()))?;
                }
            }
            Instruction::NewInvocation { slot, argc } => {
                let callee = self.callee(offset, slot, argc)?;
                for param in callee.params.iter().rev() {
                    let boundary = match param {
                        TypeRef::Primitive(p) => TypeRef::Boxed(*p),
                        other => other.clone(),
                    };
                    self.pop_expect(offset, &boundary)?;
                }
                self.push(offset, StackType::Invocation)?;
            }
            Instruction::DispatchChain(chain) => {
                if chain as usize >= self.unit.chain_count {
                    return Err(VerifyError::InvalidChainRef {
                        method: self.method.clone(),
                        chain,
                        offset,
                    });
                }
                let operand = self.pop(offset)?;
                if operand != StackType::Invocation {
                    return Err(self.mismatch(offset, "invocation".to_string(), &operand));
                }
                self.push(offset, StackType::Value(TypeRef::Any))?;
            }
            Instruction::Return => {
                if signature.ret.is_void() {
                    return Err(self.mismatch(
                        offset,
                        "RETURN_VOID".to_string(),
                        &StackType::Value(TypeRef::Any),
                    ));
                }
                self.pop_expect(offset, &signature.ret)?;
                self.expect_empty(offset)?;
            }
            Instruction::ReturnVoid => {
                if !signature.ret.is_void() {
                    return Err(self.mismatch(
                        offset,
                        signature.ret.to_string(),
                        &StackType::Value(TypeRef::Void),
                    ));
                }
                self.expect_empty(offset)?;
            }
        }
        Ok(())
    }

    fn callee(&self, offset: usize, slot: u16, argc: u8) -> Result<&'a Signature, VerifyError> {
        let callee = self
            .unit
            .method(slot as usize)
            .map(|m| &m.signature)
            .ok_or_else(|| VerifyError::InvalidSlot {
                method: self.method.clone(),
                slot,
                offset,
            })?;
        if callee.arity() != argc as usize {
            return Err(VerifyError::ArgCountMismatch {
                method: self.method.clone(),
                offset,
                expected: callee.arity(),
                found: argc as usize,
            });
        }
        Ok(callee)
    }

    fn push(&mut self, offset: usize, operand: StackType) -> Result<(), VerifyError> {
        self.stack.push(operand);
        if self.stack.len() > self.max_stack_depth {
            return Err(VerifyError::StackOverflow {
                method: self.method.clone(),
                offset,
                depth: self.stack.len(),
            });
        }
        Ok(())
    }

    fn pop(&mut self, offset: usize) -> Result<StackType, VerifyError> {
        self.stack.pop().ok_or_else(|| VerifyError::StackUnderflow {
            method: self.method.clone(),
            offset,
        })
    }

    fn pop_expect(&mut self, offset: usize, expected: &TypeRef) -> Result<(), VerifyError> {
        let operand = self.pop(offset)?;
        match &operand {
            StackType::Value(ty) if expected.is_assignable_from(ty) => Ok(()),
            _ => Err(self.mismatch(offset, expected.to_string(), &operand)),
        }
    }

    fn expect_empty(&self, offset: usize) -> Result<(), VerifyError> {
        if self.stack.is_empty() {
            Ok(())
        } else {
            Err(VerifyError::UnbalancedStack {
                method: self.method.clone(),
                offset,
                remaining: self.stack.len(),
            })
        }
    }

    fn mismatch(&self, offset: usize, expected: String, found: &StackType) -> VerifyError {
        VerifyError::TypeMismatch {
            method: self.method.clone(),
            offset,
            expected,
            found: found.to_string(),
        }
    }
}

fn is_unboxable(operand: &StackType, p: Primitive) -> bool {
    match operand {
        StackType::Value(TypeRef::Any) => true,
        StackType::Value(TypeRef::Boxed(b)) => *b == p,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::UnitBuilder;
    use crate::encoder::StubWriter;
    use crate::unit::MethodStub;

    fn unit_with(signature: Signature, code: Vec<u8>, chain_count: usize) -> UnitDescriptor {
        let mut unit = UnitDescriptor {
            name: "Test$$Weave".to_string(),
            base_type: "Test".to_string(),
            types: vec![TypeRef::Str, TypeRef::I32],
            methods: vec![MethodStub {
                signature,
                code,
                max_stack: 0,
            }],
            chain_count,
            checksum: 0,
        };
        unit.checksum = unit.compute_checksum();
        unit
    }

    fn add_sig() -> Signature {
        Signature::new("add", vec![TypeRef::I32, TypeRef::I32], TypeRef::I32)
    }

    #[test]
    fn test_emitted_unit_verifies() {
        let mut builder = UnitBuilder::new("Calc$$Weave", "Calc");
        let chain = builder.add_chain().unwrap();

        let mut method = builder.begin_method(add_sig()).unwrap();
        method.emit_direct_forward().unwrap();
        method.finish().unwrap();

        let sig = Signature::new("name", vec![TypeRef::Boxed(Primitive::I32)], TypeRef::Str);
        let mut method = builder.begin_method(sig).unwrap();
        method.emit_chain_invoke(chain).unwrap();
        method.finish().unwrap();

        let sig = Signature::new("clear", vec![], TypeRef::Void);
        let mut method = builder.begin_method(sig).unwrap();
        method.emit_chain_invoke(chain).unwrap();
        method.finish().unwrap();

        let unit = builder.finish();
        assert_eq!(verify_unit(&unit, DEFAULT_MAX_STACK_DEPTH), Ok(()));
    }

    #[test]
    fn test_reject_checksum_mismatch() {
        let mut writer = StubWriter::new();
        writer.emit_return_void();
        let mut unit = unit_with(Signature::new("noop", vec![], TypeRef::Void), writer.into_bytes(), 0);
        unit.checksum ^= 1;
        assert!(matches!(
            verify_unit(&unit, DEFAULT_MAX_STACK_DEPTH),
            Err(VerifyError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_reject_unboxed_argument_to_chain() {
        // Primitive passed to NEW_INVOCATION without BOX
        let mut writer = StubWriter::new();
        writer.emit_load_arg(0);
        writer.emit_load_arg(1);
        writer.emit_new_invocation(0, 2);
        writer.emit_dispatch_chain(0);
        writer.emit_unbox(Primitive::I32);
        writer.emit_return();
        let unit = unit_with(add_sig(), writer.into_bytes(), 1);

        match verify_unit(&unit, DEFAULT_MAX_STACK_DEPTH) {
            Err(VerifyError::TypeMismatch { method, expected, found, .. }) => {
                assert_eq!(method, "add(i32, i32) -> i32");
                assert_eq!(expected, "Integer");
                assert_eq!(found, "i32");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_reject_missing_return_conversion() {
        // Chain result returned as i32 without UNBOX
        let mut writer = StubWriter::new();
        writer.emit_load_arg(0);
        writer.emit_box(Primitive::I32);
        writer.emit_load_arg(1);
        writer.emit_box(Primitive::I32);
        writer.emit_new_invocation(0, 2);
        writer.emit_dispatch_chain(0);
        writer.emit_return();
        let unit = unit_with(add_sig(), writer.into_bytes(), 1);

        assert!(matches!(
            verify_unit(&unit, DEFAULT_MAX_STACK_DEPTH),
            Err(VerifyError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_reject_invalid_arg_ref() {
        let mut writer = StubWriter::new();
        writer.emit_load_target();
        writer.emit_load_arg(0);
        writer.emit_load_arg(2);
        writer.emit_invoke_target(0, 2);
        writer.emit_return();
        let unit = unit_with(add_sig(), writer.into_bytes(), 0);

        assert!(matches!(
            verify_unit(&unit, DEFAULT_MAX_STACK_DEPTH),
            Err(VerifyError::InvalidArgRef { index: 2, arity: 2, .. })
        ));
    }

    #[test]
    fn test_reject_arg_count_mismatch() {
        let mut writer = StubWriter::new();
        writer.emit_load_target();
        writer.emit_load_arg(0);
        writer.emit_invoke_target(0, 1);
        writer.emit_return();
        let unit = unit_with(add_sig(), writer.into_bytes(), 0);

        assert!(matches!(
            verify_unit(&unit, DEFAULT_MAX_STACK_DEPTH),
            Err(VerifyError::ArgCountMismatch { expected: 2, found: 1, .. })
        ));
    }

    #[test]
    fn test_reject_invalid_chain_and_slot() {
        let mut writer = StubWriter::new();
        writer.emit_load_arg(0);
        writer.emit_box(Primitive::I32);
        writer.emit_load_arg(1);
        writer.emit_box(Primitive::I32);
        writer.emit_new_invocation(0, 2);
        writer.emit_dispatch_chain(3);
        writer.emit_unbox(Primitive::I32);
        writer.emit_return();
        let unit = unit_with(add_sig(), writer.into_bytes(), 1);
        assert!(matches!(
            verify_unit(&unit, DEFAULT_MAX_STACK_DEPTH),
            Err(VerifyError::InvalidChainRef { chain: 3, .. })
        ));

        let mut writer = StubWriter::new();
        writer.emit_load_target();
        writer.emit_invoke_target(9, 0);
        writer.emit_return();
        let unit = unit_with(add_sig(), writer.into_bytes(), 0);
        assert!(matches!(
            verify_unit(&unit, DEFAULT_MAX_STACK_DEPTH),
            Err(VerifyError::InvalidSlot { slot: 9, .. })
        ));
    }

    #[test]
    fn test_reject_checkcast_to_primitive() {
        // Type table entry 1 is i32, which CHECKCAST may not produce
        let sig = Signature::new("count", vec![], TypeRef::I32);
        let mut writer = StubWriter::new();
        writer.emit_new_invocation(0, 0);
        writer.emit_dispatch_chain(0);
        writer.emit_check_cast(1);
        writer.emit_return();
        let unit = unit_with(sig, writer.into_bytes(), 1);

        assert!(matches!(
            verify_unit(&unit, DEFAULT_MAX_STACK_DEPTH),
            Err(VerifyError::InvalidTypeRef { index: 1, .. })
        ));
    }

    #[test]
    fn test_reject_stack_underflow() {
        let mut writer = StubWriter::new();
        writer.emit_pop();
        writer.emit_return_void();
        let unit = unit_with(Signature::new("noop", vec![], TypeRef::Void), writer.into_bytes(), 0);

        assert!(matches!(
            verify_unit(&unit, DEFAULT_MAX_STACK_DEPTH),
            Err(VerifyError::StackUnderflow { offset: 0, .. })
        ));
    }

    #[test]
    fn test_reject_stack_overflow() {
        let sig = Signature::new("id", vec![TypeRef::Str], TypeRef::Str);
        let mut writer = StubWriter::new();
        for _ in 0..4 {
            writer.emit_load_arg(0);
        }
        writer.emit_return();
        let unit = unit_with(sig, writer.into_bytes(), 0);

        assert!(matches!(
            verify_unit(&unit, 3),
            Err(VerifyError::StackOverflow { depth: 4, .. })
        ));
    }

    #[test]
    fn test_reject_unbalanced_return() {
        let sig = Signature::new("id", vec![TypeRef::Str], TypeRef::Str);
        let mut writer = StubWriter::new();
        writer.emit_load_arg(0);
        writer.emit_load_arg(0);
        writer.emit_return();
        let unit = unit_with(sig, writer.into_bytes(), 0);

        assert!(matches!(
            verify_unit(&unit, DEFAULT_MAX_STACK_DEPTH),
            Err(VerifyError::UnbalancedStack { remaining: 1, .. })
        ));
    }

    #[test]
    fn test_reject_fall_off_end_and_unreachable() {
        let mut writer = StubWriter::new();
        writer.emit_load_target();
        let unit = unit_with(Signature::new("noop", vec![], TypeRef::Void), writer.into_bytes(), 0);
        assert!(matches!(
            verify_unit(&unit, DEFAULT_MAX_STACK_DEPTH),
            Err(VerifyError::FallOffEnd { .. })
        ));

        let mut writer = StubWriter::new();
        writer.emit_return_void();
        writer.emit_return_void();
        let unit = unit_with(Signature::new("noop", vec![], TypeRef::Void), writer.into_bytes(), 0);
        assert!(matches!(
            verify_unit(&unit, DEFAULT_MAX_STACK_DEPTH),
            Err(VerifyError::UnreachableCode { offset: 1, .. })
        ));
    }

    #[test]
    fn test_reject_malformed_stub() {
        let unit = unit_with(Signature::new("noop", vec![], TypeRef::Void), vec![0x99], 0);
        assert!(matches!(
            verify_unit(&unit, DEFAULT_MAX_STACK_DEPTH),
            Err(VerifyError::Decode { source: DecodeError::InvalidOpcode(0x99, 0), .. })
        ));
    }
}
