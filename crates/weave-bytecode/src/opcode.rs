//! Dispatch stub opcodes
//!
//! Stubs are straight-line: there are no jumps, and every method body ends
//! with exactly one return instruction.

/// Stub opcode enumeration
///
/// All opcodes are single-byte instructions. Operands follow the opcode byte
/// in little-endian order.
///
/// Opcodes are organized into categories:
/// - 0x00-0x0F: Stack manipulation
/// - 0x10-0x1F: Loads (held target, arguments)
/// - 0x20-0x2F: Boundary conversions
/// - 0x30-0x3F: Dispatch
/// - 0x40-0x4F: Returns
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // ===== Stack Manipulation (0x00-0x0F) =====
    /// No operation
    Nop = 0x00,
    /// Pop top value from stack
    Pop = 0x01,

    // ===== Loads (0x10-0x1F) =====
    /// Push the held target reference
    LoadTarget = 0x10,
    /// Push a call argument (operand: u8 index)
    LoadArg = 0x11,

    // ===== Conversions (0x20-0x2F) =====
    /// Box a primitive into its nullable wrapper (operand: u8 primitive)
    Box = 0x20,
    /// Unbox a reference into a primitive, failing on null (operand: u8 primitive)
    Unbox = 0x21,
    /// Narrow an untyped reference to a declared type (operand: u16 type index)
    CheckCast = 0x22,

    // ===== Dispatch (0x30-0x3F) =====
    /// Call the held target directly (operands: u16 slot, u8 argc)
    InvokeTarget = 0x30,
    /// Build an invocation record from reference arguments (operands: u16 slot, u8 argc)
    NewInvocation = 0x31,
    /// Run an invocation through a resolved chain (operand: u16 chain index)
    DispatchChain = 0x32,

    // ===== Returns (0x40-0x4F) =====
    /// Return the top of stack
    Return = 0x40,
    /// Return without a value
    ReturnVoid = 0x41,
}

impl Opcode {
    /// Convert from byte to opcode
    ///
    /// Returns None if the byte does not correspond to a valid opcode.
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Nop),
            0x01 => Some(Self::Pop),
            0x10 => Some(Self::LoadTarget),
            0x11 => Some(Self::LoadArg),
            0x20 => Some(Self::Box),
            0x21 => Some(Self::Unbox),
            0x22 => Some(Self::CheckCast),
            0x30 => Some(Self::InvokeTarget),
            0x31 => Some(Self::NewInvocation),
            0x32 => Some(Self::DispatchChain),
            0x40 => Some(Self::Return),
            0x41 => Some(Self::ReturnVoid),
            _ => None,
        }
    }

    /// Convert opcode to byte
    #[inline]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Get the mnemonic name of the opcode
    pub fn name(self) -> &'static str {
        match self {
            Self::Nop => "NOP",
            Self::Pop => "POP",
            Self::LoadTarget => "LOAD_TARGET",
            Self::LoadArg => "LOAD_ARG",
            Self::Box => "BOX",
            Self::Unbox => "UNBOX",
            Self::CheckCast => "CHECKCAST",
            Self::InvokeTarget => "INVOKE_TARGET",
            Self::NewInvocation => "NEW_INVOCATION",
            Self::DispatchChain => "DISPATCH_CHAIN",
            Self::Return => "RETURN",
            Self::ReturnVoid => "RETURN_VOID",
        }
    }

    /// Size in bytes of the operands following this opcode
    pub fn operand_size(self) -> usize {
        match self {
            Self::Nop
            | Self::Pop
            | Self::LoadTarget
            | Self::Return
            | Self::ReturnVoid => 0,
            Self::LoadArg | Self::Box | Self::Unbox => 1,
            Self::CheckCast | Self::DispatchChain => 2,
            Self::InvokeTarget | Self::NewInvocation => 3,
        }
    }

    /// Check if this opcode is a return instruction
    pub fn is_return(self) -> bool {
        matches!(self, Self::Return | Self::ReturnVoid)
    }

    /// Check if this opcode transfers control out of the stub
    pub fn is_dispatch(self) -> bool {
        matches!(self, Self::InvokeTarget | Self::DispatchChain)
    }
}
