//! Dispatch unit emission
//!
//! [`UnitBuilder`] assembles one stub per proxied method. Each method is
//! begun for a [`Signature`], given a body through its [`MethodEmitter`], and
//! finished; finishing the unit seals it into a [`UnitDescriptor`].
//!
//! Two canonical bodies are provided:
//!
//! - **direct forward**: `LOAD_TARGET; LOAD_ARG 0..n; INVOKE_TARGET; RETURN`
//! - **chain invoke**: `LOAD_ARG 0..n` (boxing primitives), `NEW_INVOCATION`,
//!   `DISPATCH_CHAIN`, then the return conversion (`UNBOX`, `CHECKCAST`, or
//!   `POP` for void) and the matching return
//!
//! Emission only records instructions. Type safety is established by
//! [`verify_unit`](crate::verify_unit).

use thiserror::Error;

use crate::encoder::{Instruction, StubWriter};
use crate::types::{Signature, TypeRef};
use crate::unit::{MethodStub, UnitDescriptor};

/// Maximum parameters per method (argument indices are u8 operands)
pub const MAX_PARAMS: usize = u8::MAX as usize;

/// Maximum methods, chains and type-table entries per unit
pub const MAX_TABLE_ENTRIES: usize = u16::MAX as usize;

/// Errors raised while emitting a unit
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmitError {
    /// The signature cannot be expressed in the stub encoding
    #[error("Unrepresentable signature `{signature}`: {reason}")]
    Unrepresentable {
        /// Rendered signature
        signature: String,
        /// Why it is unrepresentable
        reason: String,
    },

    /// An instruction was emitted after the body's return
    #[error("Method `{signature}` already has a terminated body")]
    BodyTerminated {
        /// Rendered signature
        signature: String,
    },

    /// The method was finished without a return instruction
    #[error("Method `{signature}` ends without a return")]
    MissingReturn {
        /// Rendered signature
        signature: String,
    },

    /// A unit-level table overflowed its operand width
    #[error("Unit `{unit}` exceeds the limit of {limit} {what}")]
    LimitExceeded {
        /// Unit name
        unit: String,
        /// Which table overflowed
        what: &'static str,
        /// The limit
        limit: usize,
    },
}

/// Check that a signature fits the stub encoding
pub fn check_representable(signature: &Signature) -> Result<(), EmitError> {
    let reject = |reason: String| EmitError::Unrepresentable {
        signature: signature.to_string(),
        reason,
    };

    if signature.name.is_empty() {
        return Err(reject("method name is empty".to_string()));
    }
    if signature.params.len() > MAX_PARAMS {
        return Err(reject(format!(
            "{} parameters exceed the maximum of {}",
            signature.params.len(),
            MAX_PARAMS
        )));
    }
    for (index, param) in signature.params.iter().enumerate() {
        match param {
            TypeRef::Void => return Err(reject(format!("parameter {} is void", index))),
            TypeRef::Object(name) if name.is_empty() => {
                return Err(reject(format!("parameter {} has an unnamed object type", index)))
            }
            _ => {}
        }
    }
    if let TypeRef::Object(name) = &signature.ret {
        if name.is_empty() {
            return Err(reject("return type is an unnamed object type".to_string()));
        }
    }
    Ok(())
}

/// Builder for a dispatch unit bound to a base type
#[derive(Debug)]
pub struct UnitBuilder {
    name: String,
    base_type: String,
    types: Vec<TypeRef>,
    methods: Vec<MethodStub>,
    chain_count: usize,
}

impl UnitBuilder {
    /// Begin a unit bound to `base_type`
    pub fn new(name: impl Into<String>, base_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_type: base_type.into(),
            types: Vec::new(),
            methods: Vec::with_capacity(16),
            chain_count: 0,
        }
    }

    /// Unit name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of methods emitted so far
    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    /// Reserve a chain slot and return its index
    pub fn add_chain(&mut self) -> Result<u16, EmitError> {
        if self.chain_count >= MAX_TABLE_ENTRIES {
            return Err(self.limit("chains"));
        }
        let index = self.chain_count as u16;
        self.chain_count += 1;
        Ok(index)
    }

    /// Intern a type in the unit's type table
    pub fn intern_type(&mut self, ty: &TypeRef) -> Result<u16, EmitError> {
        if let Some(index) = self.types.iter().position(|t| t == ty) {
            return Ok(index as u16);
        }
        if self.types.len() >= MAX_TABLE_ENTRIES {
            return Err(self.limit("type entries"));
        }
        self.types.push(ty.clone());
        Ok((self.types.len() - 1) as u16)
    }

    /// Begin a method for `signature`
    ///
    /// The method occupies the next slot. Fails if the signature is
    /// unrepresentable or the unit is full.
    pub fn begin_method(&mut self, signature: Signature) -> Result<MethodEmitter<'_>, EmitError> {
        check_representable(&signature)?;
        if self.methods.len() >= MAX_TABLE_ENTRIES {
            return Err(self.limit("methods"));
        }
        let slot = self.methods.len() as u16;
        Ok(MethodEmitter {
            unit: self,
            slot,
            signature,
            writer: StubWriter::with_capacity(32),
            depth: 0,
            max_depth: 0,
            terminated: false,
        })
    }

    /// End the unit, producing a loadable descriptor
    pub fn finish(self) -> UnitDescriptor {
        let mut unit = UnitDescriptor {
            name: self.name,
            base_type: self.base_type,
            types: self.types,
            methods: self.methods,
            chain_count: self.chain_count,
            checksum: 0,
        };
        unit.checksum = unit.compute_checksum();
        unit
    }

    fn limit(&self, what: &'static str) -> EmitError {
        EmitError::LimitExceeded {
            unit: self.name.clone(),
            what,
            limit: MAX_TABLE_ENTRIES,
        }
    }
}

/// Emitter for one method body
///
/// Tracks operand stack depth so the finished stub records its maximum
/// depth. Dropping an emitter without calling [`finish`](Self::finish)
/// discards the method.
#[derive(Debug)]
pub struct MethodEmitter<'u> {
    unit: &'u mut UnitBuilder,
    slot: u16,
    signature: Signature,
    writer: StubWriter,
    depth: usize,
    max_depth: usize,
    terminated: bool,
}

impl<'u> MethodEmitter<'u> {
    /// Slot this method will occupy
    pub fn slot(&self) -> u16 {
        self.slot
    }

    /// Signature being emitted
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Emit a single instruction
    pub fn emit(&mut self, instruction: Instruction) -> Result<(), EmitError> {
        if self.terminated {
            return Err(EmitError::BodyTerminated {
                signature: self.signature.to_string(),
            });
        }
        let (pops, pushes) = depth_effect(&instruction);
        self.depth = self.depth.saturating_sub(pops) + pushes;
        self.max_depth = self.max_depth.max(self.depth);
        if instruction.opcode().is_return() {
            self.terminated = true;
        }
        self.writer.emit(instruction);
        Ok(())
    }

    /// Emit a body that forwards straight to the held target
    pub fn emit_direct_forward(&mut self) -> Result<(), EmitError> {
        let argc = self.argc();
        self.emit(Instruction::LoadTarget)?;
        for index in 0..argc {
            self.emit(Instruction::LoadArg(index))?;
        }
        self.emit(Instruction::InvokeTarget {
            slot: self.slot,
            argc,
        })?;
        if self.signature.ret.is_void() {
            self.emit(Instruction::ReturnVoid)
        } else {
            self.emit(Instruction::Return)
        }
    }

    /// Emit a body that hands an invocation record to chain `chain`
    pub fn emit_chain_invoke(&mut self, chain: u16) -> Result<(), EmitError> {
        let argc = self.argc();
        let params = self.signature.params.clone();
        for (index, param) in params.iter().enumerate() {
            self.emit(Instruction::LoadArg(index as u8))?;
            if let TypeRef::Primitive(p) = param {
                self.emit(Instruction::Box(*p))?;
            }
        }
        self.emit(Instruction::NewInvocation {
            slot: self.slot,
            argc,
        })?;
        self.emit(Instruction::DispatchChain(chain))?;

        match self.signature.ret.clone() {
            TypeRef::Void => {
                self.emit(Instruction::Pop)?;
                self.emit(Instruction::ReturnVoid)
            }
            TypeRef::Primitive(p) => {
                self.emit(Instruction::Unbox(p))?;
                self.emit(Instruction::Return)
            }
            TypeRef::Any => self.emit(Instruction::Return),
            reference => {
                let index = self.unit.intern_type(&reference)?;
                self.emit(Instruction::CheckCast(index))?;
                self.emit(Instruction::Return)
            }
        }
    }

    /// End the method, appending it to the unit
    pub fn finish(self) -> Result<u16, EmitError> {
        if !self.terminated {
            return Err(EmitError::MissingReturn {
                signature: self.signature.to_string(),
            });
        }
        self.unit.methods.push(MethodStub {
            signature: self.signature,
            code: self.writer.into_bytes(),
            max_stack: self.max_depth,
        });
        Ok(self.slot)
    }

    fn argc(&self) -> u8 {
        // check_representable bounds the parameter count
        self.signature.params.len() as u8
    }
}

/// Operand stack depth effect (pops, pushes) of an instruction
pub fn depth_effect(instruction: &Instruction) -> (usize, usize) {
    match instruction {
        Instruction::Nop => (0, 0),
        Instruction::Pop => (1, 0),
        Instruction::LoadTarget | Instruction::LoadArg(_) => (0, 1),
        Instruction::Box(_) | Instruction::Unbox(_) | Instruction::CheckCast(_) => (1, 1),
        // The pushed result of a void target call is accounted for by the verifier
        Instruction::InvokeTarget { argc, .. } => (*argc as usize + 1, 1),
        Instruction::NewInvocation { argc, .. } => (*argc as usize, 1),
        Instruction::DispatchChain(_) => (1, 1),
        Instruction::Return => (1, 0),
        Instruction::ReturnVoid => (0, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::decode_stub;
    use crate::types::Primitive;

    fn add_signature() -> Signature {
        Signature::new("add", vec![TypeRef::I32, TypeRef::I32], TypeRef::I32)
    }

    fn instructions(unit: &UnitDescriptor, slot: usize) -> Vec<Instruction> {
        decode_stub(&unit.methods[slot].code)
            .unwrap()
            .into_iter()
            .map(|(_, i)| i)
            .collect()
    }

    #[test]
    fn test_direct_forward_body() {
        let mut builder = UnitBuilder::new("Calc$$Weave", "Calc");
        let mut method = builder.begin_method(add_signature()).unwrap();
        method.emit_direct_forward().unwrap();
        assert_eq!(method.finish().unwrap(), 0);

        let unit = builder.finish();
        assert_eq!(
            instructions(&unit, 0),
            vec![
                Instruction::LoadTarget,
                Instruction::LoadArg(0),
                Instruction::LoadArg(1),
                Instruction::InvokeTarget { slot: 0, argc: 2 },
                Instruction::Return,
            ]
        );
        assert_eq!(unit.methods[0].max_stack, 3);
        assert!(unit.checksum_matches());
    }

    #[test]
    fn test_chain_invoke_boxes_primitives() {
        let mut builder = UnitBuilder::new("Calc$$Weave", "Calc");
        let chain = builder.add_chain().unwrap();
        let sig = Signature::new("scale", vec![TypeRef::F64, TypeRef::Str], TypeRef::I64);
        let mut method = builder.begin_method(sig).unwrap();
        method.emit_chain_invoke(chain).unwrap();
        method.finish().unwrap();

        let unit = builder.finish();
        assert_eq!(
            instructions(&unit, 0),
            vec![
                Instruction::LoadArg(0),
                Instruction::Box(Primitive::F64),
                Instruction::LoadArg(1),
                Instruction::NewInvocation { slot: 0, argc: 2 },
                Instruction::DispatchChain(0),
                Instruction::Unbox(Primitive::I64),
                Instruction::Return,
            ]
        );
        assert_eq!(unit.chain_count, 1);
    }

    #[test]
    fn test_chain_invoke_reference_return_interns_type() {
        let mut builder = UnitBuilder::new("Repo$$Weave", "Repo");
        let chain = builder.add_chain().unwrap();
        for name in ["find", "load"] {
            let sig = Signature::new(name, vec![], TypeRef::object("User"));
            let mut method = builder.begin_method(sig).unwrap();
            method.emit_chain_invoke(chain).unwrap();
            method.finish().unwrap();
        }

        let unit = builder.finish();
        assert_eq!(unit.types, vec![TypeRef::object("User")]);
        assert_eq!(
            instructions(&unit, 1),
            vec![
                Instruction::NewInvocation { slot: 1, argc: 0 },
                Instruction::DispatchChain(0),
                Instruction::CheckCast(0),
                Instruction::Return,
            ]
        );
    }

    #[test]
    fn test_chain_invoke_void_pops_result() {
        let mut builder = UnitBuilder::new("Svc$$Weave", "Svc");
        let chain = builder.add_chain().unwrap();
        let mut method = builder
            .begin_method(Signature::new("reset", vec![], TypeRef::Void))
            .unwrap();
        method.emit_chain_invoke(chain).unwrap();
        method.finish().unwrap();

        let unit = builder.finish();
        assert_eq!(
            instructions(&unit, 0),
            vec![
                Instruction::NewInvocation { slot: 0, argc: 0 },
                Instruction::DispatchChain(0),
                Instruction::Pop,
                Instruction::ReturnVoid,
            ]
        );
    }

    #[test]
    fn test_unrepresentable_void_parameter() {
        let mut builder = UnitBuilder::new("Bad$$Weave", "Bad");
        let sig = Signature::new("take", vec![TypeRef::Void], TypeRef::Void);
        let err = builder.begin_method(sig).unwrap_err();
        match err {
            EmitError::Unrepresentable { signature, reason } => {
                assert_eq!(signature, "take(void) -> void");
                assert!(reason.contains("void"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_unrepresentable_too_many_parameters() {
        let mut builder = UnitBuilder::new("Bad$$Weave", "Bad");
        let sig = Signature::new("wide", vec![TypeRef::I32; 256], TypeRef::Void);
        assert!(matches!(
            builder.begin_method(sig),
            Err(EmitError::Unrepresentable { .. })
        ));
    }

    #[test]
    fn test_chain_table_limit() {
        let mut builder = UnitBuilder::new("Full$$Weave", "Full");
        for expected in 0..MAX_TABLE_ENTRIES {
            assert_eq!(builder.add_chain().unwrap() as usize, expected);
        }
        assert_eq!(MAX_TABLE_ENTRIES, 65535);
        assert!(matches!(
            builder.add_chain(),
            Err(EmitError::LimitExceeded { what: "chains", limit: 65535, .. })
        ));
    }

    #[test]
    fn test_missing_return() {
        let mut builder = UnitBuilder::new("Bad$$Weave", "Bad");
        let mut method = builder.begin_method(add_signature()).unwrap();
        method.emit(Instruction::LoadTarget).unwrap();
        assert!(matches!(method.finish(), Err(EmitError::MissingReturn { .. })));
        // The unfinished method is discarded
        assert_eq!(builder.method_count(), 0);
    }

    #[test]
    fn test_cannot_emit_after_return() {
        let mut builder = UnitBuilder::new("Bad$$Weave", "Bad");
        let mut method = builder
            .begin_method(Signature::new("noop", vec![], TypeRef::Void))
            .unwrap();
        method.emit(Instruction::ReturnVoid).unwrap();
        assert!(matches!(
            method.emit(Instruction::Nop),
            Err(EmitError::BodyTerminated { .. })
        ));
    }
}
