//! Unit linking
//!
//! Linking turns a [`UnitDescriptor`] into the dispatch table a proxy runs.
//! Stubs in the two canonical shapes the emitter produces are fused into
//! native bodies; anything else is kept as decoded instructions for the
//! stub interpreter.

use thiserror::Error;
use weave_bytecode::{decode_stub, DecodeError, Instruction, Primitive, Signature, TypeRef, UnitDescriptor};

/// Unit loading failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    /// Stub bodies changed after the unit was sealed
    #[error("checksum mismatch: recorded {recorded:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        /// Checksum stored in the unit
        recorded: u32,
        /// Checksum of the current bodies
        computed: u32,
    },

    /// A stub body could not be decoded
    #[error("`{method}`: {source}")]
    Decode {
        /// Method signature
        method: String,
        /// Decoder error
        #[source]
        source: DecodeError,
    },

    /// The unit and the blueprint disagree on chain slots
    #[error("unit declares {declared} chains, blueprint provides {provided}")]
    ChainCount {
        /// Chains named by the unit
        declared: usize,
        /// Chains resolved for the blueprint
        provided: usize,
    },

    /// The unit and the target disagree on method slots
    #[error("unit has {stubs} stubs for {methods} methods")]
    MethodCount {
        /// Stubs in the unit
        stubs: usize,
        /// Methods on the target type
        methods: usize,
    },
}

/// Conversion applied to a chain result before it is returned
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnConversion {
    /// Void method: drop the result
    Discard,
    /// Primitive return: unbox, rejecting null
    Unbox(Primitive),
    /// Reference return: checked cast
    Cast(TypeRef),
    /// `Any` return: no conversion
    Passthrough,
}

/// Executable body of one method slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkedBody {
    /// Straight call into the target
    Forward,
    /// Boxed arguments handed to `chain`, result converted by `ret`
    Chain {
        /// Chain slot
        chain: usize,
        /// Result conversion
        ret: ReturnConversion,
    },
    /// Decoded stub run by the interpreter
    Program(Vec<(usize, Instruction)>),
}

impl LinkedBody {
    /// Whether the body was fused into a native form
    pub fn is_fused(&self) -> bool {
        !matches!(self, Self::Program(_))
    }
}

/// Dispatch table linked from a unit
#[derive(Debug, Clone)]
pub struct LinkedUnit {
    name: String,
    bodies: Vec<LinkedBody>,
}

impl LinkedUnit {
    /// Link `unit` against `chain_count` resolved chains and `method_count` target methods
    pub fn link(
        unit: &UnitDescriptor,
        chain_count: usize,
        method_count: usize,
        fuse: bool,
    ) -> Result<Self, LinkError> {
        let computed = unit.compute_checksum();
        if computed != unit.checksum {
            return Err(LinkError::ChecksumMismatch {
                recorded: unit.checksum,
                computed,
            });
        }
        if unit.chain_count != chain_count {
            return Err(LinkError::ChainCount {
                declared: unit.chain_count,
                provided: chain_count,
            });
        }
        if unit.methods.len() != method_count {
            return Err(LinkError::MethodCount {
                stubs: unit.methods.len(),
                methods: method_count,
            });
        }

        let mut bodies = Vec::with_capacity(unit.methods.len());
        for (slot, stub) in unit.methods.iter().enumerate() {
            let code = decode_stub(&stub.code).map_err(|source| LinkError::Decode {
                method: stub.signature.to_string(),
                source,
            })?;
            let fused = if fuse {
                fuse_body(unit, slot, &stub.signature, &code)
            } else {
                None
            };
            bodies.push(fused.unwrap_or(LinkedBody::Program(code)));
        }

        Ok(Self {
            name: unit.name.clone(),
            bodies,
        })
    }

    /// Unit name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Body for `slot`
    pub fn body(&self, slot: usize) -> Option<&LinkedBody> {
        self.bodies.get(slot)
    }

    /// Bodies in slot order
    pub fn bodies(&self) -> &[LinkedBody] {
        &self.bodies
    }

    /// Number of fused bodies
    pub fn fused_count(&self) -> usize {
        self.bodies.iter().filter(|b| b.is_fused()).count()
    }
}

fn fuse_body(
    unit: &UnitDescriptor,
    slot: usize,
    signature: &Signature,
    code: &[(usize, Instruction)],
) -> Option<LinkedBody> {
    let instructions: Vec<Instruction> = code.iter().map(|(_, ins)| *ins).collect();
    if is_forward(slot, signature, &instructions) {
        return Some(LinkedBody::Forward);
    }
    fuse_chain(unit, slot, signature, &instructions)
}

fn is_forward(slot: usize, signature: &Signature, code: &[Instruction]) -> bool {
    let arity = signature.arity();
    let [Instruction::LoadTarget, rest @ ..] = code else {
        return false;
    };
    if rest.len() != arity + 2 {
        return false;
    }
    let (loads, tail) = rest.split_at(arity);
    let loads_in_order = loads
        .iter()
        .enumerate()
        .all(|(i, ins)| *ins == Instruction::LoadArg(i as u8));
    let ret = if signature.ret.is_void() {
        Instruction::ReturnVoid
    } else {
        Instruction::Return
    };
    loads_in_order
        && matches!(
            tail,
            [Instruction::InvokeTarget { slot: s, argc }, last]
                if *s as usize == slot && *argc as usize == arity && *last == ret
        )
}

fn fuse_chain(
    unit: &UnitDescriptor,
    slot: usize,
    signature: &Signature,
    code: &[Instruction],
) -> Option<LinkedBody> {
    let mut pos = 0;
    for (i, param) in signature.params.iter().enumerate() {
        if code.get(pos) != Some(&Instruction::LoadArg(i as u8)) {
            return None;
        }
        pos += 1;
        if let TypeRef::Primitive(p) = param {
            if code.get(pos) != Some(&Instruction::Box(*p)) {
                return None;
            }
            pos += 1;
        }
    }

    let (chain, tail) = match code.get(pos..)? {
        [Instruction::NewInvocation { slot: s, argc }, Instruction::DispatchChain(c), tail @ ..]
            if *s as usize == slot && *argc as usize == signature.arity() =>
        {
            (*c as usize, tail)
        }
        _ => return None,
    };
    if chain >= unit.chain_count {
        return None;
    }

    let ret = match (tail, &signature.ret) {
        ([Instruction::Pop, Instruction::ReturnVoid], TypeRef::Void) => ReturnConversion::Discard,
        ([Instruction::Unbox(p), Instruction::Return], TypeRef::Primitive(q)) if p == q => {
            ReturnConversion::Unbox(*p)
        }
        ([Instruction::CheckCast(t), Instruction::Return], ty) if unit.type_at(*t) == Some(ty) => {
            ReturnConversion::Cast(ty.clone())
        }
        ([Instruction::Return], TypeRef::Any) => ReturnConversion::Passthrough,
        _ => return None,
    };
    Some(LinkedBody::Chain { chain, ret })
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_bytecode::UnitBuilder;

    fn sample_unit() -> UnitDescriptor {
        let mut builder = UnitBuilder::new("Calc$$Weave", "Calc");
        let chain = builder.add_chain().unwrap();

        let mut m = builder
            .begin_method(Signature::new("add", vec![TypeRef::I32, TypeRef::I32], TypeRef::I32))
            .unwrap();
        m.emit_chain_invoke(chain).unwrap();
        m.finish().unwrap();

        let mut m = builder
            .begin_method(Signature::new("name", vec![], TypeRef::Str))
            .unwrap();
        m.emit_direct_forward().unwrap();
        m.finish().unwrap();

        builder.finish()
    }

    #[test]
    fn test_canonical_stubs_fuse() {
        let unit = sample_unit();
        let linked = LinkedUnit::link(&unit, 1, 2, true).unwrap();
        assert_eq!(
            linked.body(0),
            Some(&LinkedBody::Chain {
                chain: 0,
                ret: ReturnConversion::Unbox(Primitive::I32),
            })
        );
        assert_eq!(linked.body(1), Some(&LinkedBody::Forward));
        assert_eq!(linked.fused_count(), 2);
    }

    #[test]
    fn test_fusion_disabled_keeps_programs() {
        let unit = sample_unit();
        let linked = LinkedUnit::link(&unit, 1, 2, false).unwrap();
        assert_eq!(linked.fused_count(), 0);
        assert!(matches!(linked.body(1), Some(LinkedBody::Program(code)) if code.len() == 3));
    }

    #[test]
    fn test_forward_to_other_slot_is_not_fused() {
        let mut builder = UnitBuilder::new("U", "T");
        let mut m = builder
            .begin_method(Signature::new("a", vec![], TypeRef::Void))
            .unwrap();
        m.emit(Instruction::LoadTarget).unwrap();
        m.emit(Instruction::InvokeTarget { slot: 1, argc: 0 }).unwrap();
        m.emit(Instruction::ReturnVoid).unwrap();
        m.finish().unwrap();
        let mut m = builder
            .begin_method(Signature::new("b", vec![], TypeRef::Void))
            .unwrap();
        m.emit_direct_forward().unwrap();
        m.finish().unwrap();
        let unit = builder.finish();

        let linked = LinkedUnit::link(&unit, 0, 2, true).unwrap();
        assert!(!linked.body(0).unwrap().is_fused());
        assert!(linked.body(1).unwrap().is_fused());
    }

    #[test]
    fn test_tampered_unit_fails_to_load() {
        let mut unit = sample_unit();
        unit.methods[1].code[0] = 0x00;
        assert!(matches!(
            LinkedUnit::link(&unit, 1, 2, true),
            Err(LinkError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_count_mismatches() {
        let unit = sample_unit();
        assert!(matches!(
            LinkedUnit::link(&unit, 2, 2, true),
            Err(LinkError::ChainCount { declared: 1, provided: 2 })
        ));
        assert!(matches!(
            LinkedUnit::link(&unit, 1, 3, true),
            Err(LinkError::MethodCount { stubs: 2, methods: 3 })
        ));
    }
}
