//! Weave Dispatch Stub Bytecode
//!
//! This crate provides the instruction set, type model, emitter and verifier
//! for proxy dispatch units. A unit is a loadable descriptor holding one
//! straight-line stub per proxied method; stubs either forward to the held
//! target or hand an invocation record to a resolved advice chain.
//!
//! The crate never executes or loads anything: `weave-engine` links a verified
//! [`UnitDescriptor`] into its dispatch table.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod builder;
pub mod encoder;
pub mod opcode;
pub mod types;
pub mod unit;
pub mod verify;

pub use builder::{EmitError, MethodEmitter, UnitBuilder};
pub use encoder::{decode_stub, DecodeError, Instruction, StubReader, StubWriter};
pub use opcode::Opcode;
pub use types::{Primitive, Signature, TypeRef};
pub use unit::{MethodStub, UnitDescriptor};
pub use verify::{verify_unit, VerifyError, DEFAULT_MAX_STACK_DEPTH};
