//! Loadable dispatch unit descriptor

use std::fmt::Write as _;

use crate::encoder::{decode_stub, Instruction};
use crate::types::{Signature, TypeRef};

/// One method stub in a unit
#[derive(Debug, Clone)]
pub struct MethodStub {
    /// Signature the stub was emitted for
    pub signature: Signature,
    /// Encoded stub body
    pub code: Vec<u8>,
    /// Maximum operand stack depth reached by the body
    pub max_stack: usize,
}

/// A fully emitted dispatch unit
///
/// Produced by [`UnitBuilder::finish`](crate::UnitBuilder::finish). Method
/// slots are indices into `methods` and match the order of the target type's
/// method list.
#[derive(Debug, Clone)]
pub struct UnitDescriptor {
    /// Generated unit name
    pub name: String,
    /// Name of the type the unit proxies
    pub base_type: String,
    /// Type table referenced by `CHECKCAST`
    pub types: Vec<TypeRef>,
    /// Method stubs by slot
    pub methods: Vec<MethodStub>,
    /// Number of chain slots the stubs may dispatch to
    pub chain_count: usize,
    /// CRC32 over every stub body, in slot order
    pub checksum: u32,
}

impl UnitDescriptor {
    /// Compute the checksum of the current stub bodies
    pub fn compute_checksum(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        for method in &self.methods {
            hasher.update(&(method.code.len() as u32).to_le_bytes());
            hasher.update(&method.code);
        }
        hasher.finalize()
    }

    /// Check the stored checksum against the stub bodies
    pub fn checksum_matches(&self) -> bool {
        self.compute_checksum() == self.checksum
    }

    /// Get a method stub by slot
    pub fn method(&self, slot: usize) -> Option<&MethodStub> {
        self.methods.get(slot)
    }

    /// Get a type table entry
    pub fn type_at(&self, index: u16) -> Option<&TypeRef> {
        self.types.get(index as usize)
    }

    /// Total encoded size of all stubs
    pub fn code_size(&self) -> usize {
        self.methods.iter().map(|m| m.code.len()).sum()
    }

    /// Render a human-readable listing of every stub
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "unit {} : {}", self.name, self.base_type);
        for (slot, method) in self.methods.iter().enumerate() {
            let _ = writeln!(out, "  [{}] {}", slot, method.signature);
            match decode_stub(&method.code) {
                Ok(instructions) => {
                    for (offset, instruction) in instructions {
                        let _ = writeln!(out, "    {:04}: {}", offset, render(&instruction, self));
                    }
                }
                Err(e) => {
                    let _ = writeln!(out, "    <{}>", e);
                }
            }
        }
        out
    }
}

fn render(instruction: &Instruction, unit: &UnitDescriptor) -> String {
    let name = instruction.opcode().name();
    match instruction {
        Instruction::LoadArg(index) => format!("{} {}", name, index),
        Instruction::Box(p) | Instruction::Unbox(p) => format!("{} {}", name, p.name()),
        Instruction::CheckCast(index) => match unit.type_at(*index) {
            Some(ty) => format!("{} #{} ({})", name, index, ty),
            None => format!("{} #{}", name, index),
        },
        Instruction::InvokeTarget { slot, argc } | Instruction::NewInvocation { slot, argc } => {
            format!("{} slot={} argc={}", name, slot, argc)
        }
        Instruction::DispatchChain(chain) => format!("{} {}", name, chain),
        _ => name.to_string(),
    }
}
