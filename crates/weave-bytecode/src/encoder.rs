//! Stub encoding and decoding utilities
//!
//! This module provides tools for encoding and decoding dispatch stub
//! instructions.

use crate::opcode::Opcode;
use crate::types::Primitive;
use thiserror::Error;

/// Errors that can occur during stub decoding
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Unexpected end of the stub body
    #[error("Unexpected end of stub at offset {0}")]
    UnexpectedEnd(usize),

    /// Invalid opcode
    #[error("Invalid opcode {0:#x} at offset {1}")]
    InvalidOpcode(u8, usize),

    /// Invalid primitive operand
    #[error("Invalid primitive code {0:#x} at offset {1}")]
    InvalidPrimitive(u8, usize),
}

/// A decoded stub instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    /// No operation
    Nop,
    /// Pop top value
    Pop,
    /// Push the held target
    LoadTarget,
    /// Push argument `n`
    LoadArg(u8),
    /// Box a primitive
    Box(Primitive),
    /// Unbox into a primitive
    Unbox(Primitive),
    /// Narrow to the type at this type-table index
    CheckCast(u16),
    /// Direct call into the target
    InvokeTarget {
        /// Method slot in the unit
        slot: u16,
        /// Argument count
        argc: u8,
    },
    /// Build an invocation record
    NewInvocation {
        /// Method slot in the unit
        slot: u16,
        /// Argument count
        argc: u8,
    },
    /// Dispatch through chain `n`
    DispatchChain(u16),
    /// Return top of stack
    Return,
    /// Return without value
    ReturnVoid,
}

impl Instruction {
    /// The opcode this instruction encodes to
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::Nop => Opcode::Nop,
            Self::Pop => Opcode::Pop,
            Self::LoadTarget => Opcode::LoadTarget,
            Self::LoadArg(_) => Opcode::LoadArg,
            Self::Box(_) => Opcode::Box,
            Self::Unbox(_) => Opcode::Unbox,
            Self::CheckCast(_) => Opcode::CheckCast,
            Self::InvokeTarget { .. } => Opcode::InvokeTarget,
            Self::NewInvocation { .. } => Opcode::NewInvocation,
            Self::DispatchChain(_) => Opcode::DispatchChain,
            Self::Return => Opcode::Return,
            Self::ReturnVoid => Opcode::ReturnVoid,
        }
    }
}

/// Stub writer for encoding instructions
///
/// Provides methods for emitting opcodes and their operands into a binary buffer.
#[derive(Debug, Default)]
pub struct StubWriter {
    buffer: Vec<u8>,
}

impl StubWriter {
    /// Create a new stub writer
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Create a new stub writer with capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Get the current buffer
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Consume the writer and return the encoded stub
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Get the current offset (length of the stub)
    pub fn offset(&self) -> usize {
        self.buffer.len()
    }

    // ===== Basic Emission =====

    /// Emit a raw byte
    pub fn emit_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Emit a 16-bit unsigned integer (little-endian)
    pub fn emit_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit an opcode without operands
    pub fn emit_opcode(&mut self, opcode: Opcode) {
        self.emit_u8(opcode.to_u8());
    }

    /// Emit a decoded instruction
    pub fn emit(&mut self, instruction: Instruction) {
        self.emit_opcode(instruction.opcode());
        match instruction {
            Instruction::LoadArg(index) => self.emit_u8(index),
            Instruction::Box(p) | Instruction::Unbox(p) => self.emit_u8(p.to_u8()),
            Instruction::CheckCast(index) | Instruction::DispatchChain(index) => {
                self.emit_u16(index)
            }
            Instruction::InvokeTarget { slot, argc }
            | Instruction::NewInvocation { slot, argc } => {
                self.emit_u16(slot);
                self.emit_u8(argc);
            }
            Instruction::Nop
            | Instruction::Pop
            | Instruction::LoadTarget
            | Instruction::Return
            | Instruction::ReturnVoid => {}
        }
    }

    // ===== Instruction Emission =====

    /// Emit LOAD_TARGET
    pub fn emit_load_target(&mut self) {
        self.emit(Instruction::LoadTarget);
    }

    /// Emit LOAD_ARG
    pub fn emit_load_arg(&mut self, index: u8) {
        self.emit(Instruction::LoadArg(index));
    }

    /// Emit BOX
    pub fn emit_box(&mut self, primitive: Primitive) {
        self.emit(Instruction::Box(primitive));
    }

    /// Emit UNBOX
    pub fn emit_unbox(&mut self, primitive: Primitive) {
        self.emit(Instruction::Unbox(primitive));
    }

    /// Emit CHECKCAST
    pub fn emit_check_cast(&mut self, type_index: u16) {
        self.emit(Instruction::CheckCast(type_index));
    }

    /// Emit INVOKE_TARGET
    pub fn emit_invoke_target(&mut self, slot: u16, argc: u8) {
        self.emit(Instruction::InvokeTarget { slot, argc });
    }

    /// Emit NEW_INVOCATION
    pub fn emit_new_invocation(&mut self, slot: u16, argc: u8) {
        self.emit(Instruction::NewInvocation { slot, argc });
    }

    /// Emit DISPATCH_CHAIN
    pub fn emit_dispatch_chain(&mut self, chain: u16) {
        self.emit(Instruction::DispatchChain(chain));
    }

    /// Emit POP
    pub fn emit_pop(&mut self) {
        self.emit(Instruction::Pop);
    }

    /// Emit RETURN
    pub fn emit_return(&mut self) {
        self.emit(Instruction::Return);
    }

    /// Emit RETURN_VOID
    pub fn emit_return_void(&mut self) {
        self.emit(Instruction::ReturnVoid);
    }
}

/// Stub reader for decoding instructions
pub struct StubReader<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> StubReader<'a> {
    /// Create a new stub reader
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            position: 0,
        }
    }

    /// Get the current position in the buffer
    pub fn position(&self) -> usize {
        self.position
    }

    /// Check if there are more bytes to read
    pub fn has_more(&self) -> bool {
        self.position < self.buffer.len()
    }

    /// Read a single byte
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        if self.position >= self.buffer.len() {
            return Err(DecodeError::UnexpectedEnd(self.position));
        }
        let value = self.buffer[self.position];
        self.position += 1;
        Ok(value)
    }

    /// Read a 16-bit unsigned integer (little-endian)
    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        if self.position + 2 > self.buffer.len() {
            return Err(DecodeError::UnexpectedEnd(self.position));
        }
        let bytes = [self.buffer[self.position], self.buffer[self.position + 1]];
        self.position += 2;
        Ok(u16::from_le_bytes(bytes))
    }

    fn read_primitive(&mut self) -> Result<Primitive, DecodeError> {
        let offset = self.position;
        let byte = self.read_u8()?;
        Primitive::from_u8(byte).ok_or(DecodeError::InvalidPrimitive(byte, offset))
    }

    /// Decode the next instruction, returning its offset
    pub fn read_instruction(&mut self) -> Result<(usize, Instruction), DecodeError> {
        let offset = self.position;
        let byte = self.read_u8()?;
        let opcode = Opcode::from_u8(byte).ok_or(DecodeError::InvalidOpcode(byte, offset))?;

        let instruction = match opcode {
            Opcode::Nop => Instruction::Nop,
            Opcode::Pop => Instruction::Pop,
            Opcode::LoadTarget => Instruction::LoadTarget,
            Opcode::LoadArg => Instruction::LoadArg(self.read_u8()?),
            Opcode::Box => Instruction::Box(self.read_primitive()?),
            Opcode::Unbox => Instruction::Unbox(self.read_primitive()?),
            Opcode::CheckCast => Instruction::CheckCast(self.read_u16()?),
            Opcode::InvokeTarget => {
                let slot = self.read_u16()?;
                let argc = self.read_u8()?;
                Instruction::InvokeTarget { slot, argc }
            }
            Opcode::NewInvocation => {
                let slot = self.read_u16()?;
                let argc = self.read_u8()?;
                Instruction::NewInvocation { slot, argc }
            }
            Opcode::DispatchChain => Instruction::DispatchChain(self.read_u16()?),
            Opcode::Return => Instruction::Return,
            Opcode::ReturnVoid => Instruction::ReturnVoid,
        };
        Ok((offset, instruction))
    }
}

/// Decode a whole stub body into `(offset, instruction)` pairs
pub fn decode_stub(code: &[u8]) -> Result<Vec<(usize, Instruction)>, DecodeError> {
    let mut reader = StubReader::new(code);
    let mut instructions = Vec::with_capacity(code.len() / 2);
    while reader.has_more() {
        instructions.push(reader.read_instruction()?);
    }
    Ok(instructions)
}
