//! Instruction opcodes for semweave method bodies
//!
//! The instruction set is a small, stack-based subset modelled on the
//! common intermediate language. Each opcode is encoded as a single byte and
//! is followed by an operand whose shape is given by [`Opcode::operand_kind`].

/// Bytecode opcode enumeration
///
/// Opcodes are organized into categories:
/// - 0x00-0x0F: Stack manipulation & arguments
/// - 0x10-0x1F: Local variables
/// - 0x20-0x2F: Literals
/// - 0x30-0x3F: Comparison & conversion
/// - 0x40-0x4F: Control flow
/// - 0x50-0x5F: Calls & object construction
/// - 0x60-0x6F: Field access
/// - 0x70-0x7F: Array operations
#[allow(non_camel_case_types)]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // ===== Stack Manipulation & Arguments (0x00-0x0F) =====
    /// No operation
    Nop = 0x00,
    /// Load argument 0 (`this` for instance methods)
    Ldarg0 = 0x01,
    /// Load argument 1
    Ldarg1 = 0x02,
    /// Load argument 2
    Ldarg2 = 0x03,
    /// Load argument 3
    Ldarg3 = 0x04,
    /// Load argument (operand: u8 slot)
    LdargS = 0x05,
    /// Duplicate top stack value
    Dup = 0x06,
    /// Pop top value from stack
    Pop = 0x07,

    // ===== Local Variables (0x10-0x1F) =====
    /// Load local 0
    Ldloc0 = 0x10,
    /// Load local 1
    Ldloc1 = 0x11,
    /// Load local 2
    Ldloc2 = 0x12,
    /// Load local 3
    Ldloc3 = 0x13,
    /// Load local (operand: u8 slot)
    LdlocS = 0x14,
    /// Store to local 0
    Stloc0 = 0x15,
    /// Store to local 1
    Stloc1 = 0x16,
    /// Store to local 2
    Stloc2 = 0x17,
    /// Store to local 3
    Stloc3 = 0x18,
    /// Store to local (operand: u8 slot)
    StlocS = 0x19,

    // ===== Literals (0x20-0x2F) =====
    /// Push null reference
    Ldnull = 0x20,
    /// Push int32 0
    LdcI4_0 = 0x21,
    /// Push int32 1
    LdcI4_1 = 0x22,
    /// Push int32 2
    LdcI4_2 = 0x23,
    /// Push int32 3
    LdcI4_3 = 0x24,
    /// Push int32 4
    LdcI4_4 = 0x25,
    /// Push int32 5
    LdcI4_5 = 0x26,
    /// Push int32 6
    LdcI4_6 = 0x27,
    /// Push int32 7
    LdcI4_7 = 0x28,
    /// Push int32 8
    LdcI4_8 = 0x29,
    /// Push int32, short form (operand: zig-zag varint)
    LdcI4S = 0x2A,
    /// Push int32 (operand: i32)
    LdcI4 = 0x2B,
    /// Push int64 (operand: i64)
    LdcI8 = 0x2C,
    /// Push float32 (operand: f32)
    LdcR4 = 0x2D,
    /// Push float64 (operand: f64)
    LdcR8 = 0x2E,
    /// Push string literal (operand: string)
    Ldstr = 0x2F,

    // ===== Comparison & Conversion (0x30-0x3F) =====
    /// Pop b, pop a, push a == b as int32
    Ceq = 0x30,
    /// Convert top of stack to int64 (sign extending)
    ConvI8 = 0x31,
    /// Convert top of stack to uint64 (zero extending)
    ConvU8 = 0x32,
    /// Box a value type (operand: type)
    Box = 0x33,

    // ===== Control Flow (0x40-0x4F) =====
    /// Unconditional branch (operand: target instruction)
    Br = 0x40,
    /// Branch if top of stack is non-zero (operand: target instruction)
    Brtrue = 0x41,
    /// Branch if top of stack is zero (operand: target instruction)
    Brfalse = 0x42,
    /// Return from method
    Ret = 0x43,

    // ===== Calls & Construction (0x50-0x5F) =====
    /// Direct call (operand: method)
    Call = 0x50,
    /// Virtual call (operand: method)
    Callvirt = 0x51,
    /// Allocate and construct an object (operand: constructor)
    Newobj = 0x52,

    // ===== Field Access (0x60-0x6F) =====
    /// Load instance field (operand: field)
    Ldfld = 0x60,
    /// Store instance field (operand: field)
    Stfld = 0x61,
    /// Load static field (operand: field)
    Ldsfld = 0x62,
    /// Store static field (operand: field)
    Stsfld = 0x63,

    // ===== Arrays (0x70-0x7F) =====
    /// Allocate a one-dimensional array (operand: element type)
    Newarr = 0x70,
    /// Load reference element
    LdelemRef = 0x71,
    /// Store reference element
    StelemRef = 0x72,
}

/// Shape of the operand that follows an opcode in the encoded stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// No operand
    None,
    /// Zig-zag LEB128 encoded int32
    ShortInt32,
    /// Fixed 4-byte int32
    Int32,
    /// Fixed 8-byte int64
    Int64,
    /// Fixed 4-byte float32
    Float32,
    /// Fixed 8-byte float64
    Float64,
    /// Length prefixed UTF-8 string
    String,
    /// Argument or local slot number
    Slot,
    /// Field reference
    Field,
    /// Method reference
    Method,
    /// Type signature
    Type,
    /// Branch target instruction index
    Branch,
}

impl Opcode {
    /// Every opcode in encoding order
    pub const ALL: [Opcode; 52] = [
        Self::Nop,
        Self::Ldarg0,
        Self::Ldarg1,
        Self::Ldarg2,
        Self::Ldarg3,
        Self::LdargS,
        Self::Dup,
        Self::Pop,
        Self::Ldloc0,
        Self::Ldloc1,
        Self::Ldloc2,
        Self::Ldloc3,
        Self::LdlocS,
        Self::Stloc0,
        Self::Stloc1,
        Self::Stloc2,
        Self::Stloc3,
        Self::StlocS,
        Self::Ldnull,
        Self::LdcI4_0,
        Self::LdcI4_1,
        Self::LdcI4_2,
        Self::LdcI4_3,
        Self::LdcI4_4,
        Self::LdcI4_5,
        Self::LdcI4_6,
        Self::LdcI4_7,
        Self::LdcI4_8,
        Self::LdcI4S,
        Self::LdcI4,
        Self::LdcI8,
        Self::LdcR4,
        Self::LdcR8,
        Self::Ldstr,
        Self::Ceq,
        Self::ConvI8,
        Self::ConvU8,
        Self::Box,
        Self::Br,
        Self::Brtrue,
        Self::Brfalse,
        Self::Ret,
        Self::Call,
        Self::Callvirt,
        Self::Newobj,
        Self::Ldfld,
        Self::Stfld,
        Self::Ldsfld,
        Self::Stsfld,
        Self::Newarr,
        Self::LdelemRef,
        Self::StelemRef,
    ];

    /// Convert byte to opcode
    ///
    /// Returns None if the byte does not correspond to a valid opcode.
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            // Stack manipulation & arguments
            0x00 => Some(Self::Nop),
            0x01 => Some(Self::Ldarg0),
            0x02 => Some(Self::Ldarg1),
            0x03 => Some(Self::Ldarg2),
            0x04 => Some(Self::Ldarg3),
            0x05 => Some(Self::LdargS),
            0x06 => Some(Self::Dup),
            0x07 => Some(Self::Pop),

            // Local variables
            0x10 => Some(Self::Ldloc0),
            0x11 => Some(Self::Ldloc1),
            0x12 => Some(Self::Ldloc2),
            0x13 => Some(Self::Ldloc3),
            0x14 => Some(Self::LdlocS),
            0x15 => Some(Self::Stloc0),
            0x16 => Some(Self::Stloc1),
            0x17 => Some(Self::Stloc2),
            0x18 => Some(Self::Stloc3),
            0x19 => Some(Self::StlocS),

            // Literals
            0x20 => Some(Self::Ldnull),
            0x21 => Some(Self::LdcI4_0),
            0x22 => Some(Self::LdcI4_1),
            0x23 => Some(Self::LdcI4_2),
            0x24 => Some(Self::LdcI4_3),
            0x25 => Some(Self::LdcI4_4),
            0x26 => Some(Self::LdcI4_5),
            0x27 => Some(Self::LdcI4_6),
            0x28 => Some(Self::LdcI4_7),
            0x29 => Some(Self::LdcI4_8),
            0x2A => Some(Self::LdcI4S),
            0x2B => Some(Self::LdcI4),
            0x2C => Some(Self::LdcI8),
            0x2D => Some(Self::LdcR4),
            0x2E => Some(Self::LdcR8),
            0x2F => Some(Self::Ldstr),

            // Comparison & conversion
            0x30 => Some(Self::Ceq),
            0x31 => Some(Self::ConvI8),
            0x32 => Some(Self::ConvU8),
            0x33 => Some(Self::Box),

            // Control flow
            0x40 => Some(Self::Br),
            0x41 => Some(Self::Brtrue),
            0x42 => Some(Self::Brfalse),
            0x43 => Some(Self::Ret),

            // Calls
            0x50 => Some(Self::Call),
            0x51 => Some(Self::Callvirt),
            0x52 => Some(Self::Newobj),

            // Fields
            0x60 => Some(Self::Ldfld),
            0x61 => Some(Self::Stfld),
            0x62 => Some(Self::Ldsfld),
            0x63 => Some(Self::Stsfld),

            // Arrays
            0x70 => Some(Self::Newarr),
            0x71 => Some(Self::LdelemRef),
            0x72 => Some(Self::StelemRef),

            _ => None,
        }
    }

    /// Convert opcode to byte
    #[inline]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Get the assembler mnemonic of the opcode
    pub fn name(self) -> &'static str {
        match self {
            Self::Nop => "nop",
            Self::Ldarg0 => "ldarg.0",
            Self::Ldarg1 => "ldarg.1",
            Self::Ldarg2 => "ldarg.2",
            Self::Ldarg3 => "ldarg.3",
            Self::LdargS => "ldarg.s",
            Self::Dup => "dup",
            Self::Pop => "pop",
            Self::Ldloc0 => "ldloc.0",
            Self::Ldloc1 => "ldloc.1",
            Self::Ldloc2 => "ldloc.2",
            Self::Ldloc3 => "ldloc.3",
            Self::LdlocS => "ldloc.s",
            Self::Stloc0 => "stloc.0",
            Self::Stloc1 => "stloc.1",
            Self::Stloc2 => "stloc.2",
            Self::Stloc3 => "stloc.3",
            Self::StlocS => "stloc.s",
            Self::Ldnull => "ldnull",
            Self::LdcI4_0 => "ldc.i4.0",
            Self::LdcI4_1 => "ldc.i4.1",
            Self::LdcI4_2 => "ldc.i4.2",
            Self::LdcI4_3 => "ldc.i4.3",
            Self::LdcI4_4 => "ldc.i4.4",
            Self::LdcI4_5 => "ldc.i4.5",
            Self::LdcI4_6 => "ldc.i4.6",
            Self::LdcI4_7 => "ldc.i4.7",
            Self::LdcI4_8 => "ldc.i4.8",
            Self::LdcI4S => "ldc.i4.s",
            Self::LdcI4 => "ldc.i4",
            Self::LdcI8 => "ldc.i8",
            Self::LdcR4 => "ldc.r4",
            Self::LdcR8 => "ldc.r8",
            Self::Ldstr => "ldstr",
            Self::Ceq => "ceq",
            Self::ConvI8 => "conv.i8",
            Self::ConvU8 => "conv.u8",
            Self::Box => "box",
            Self::Br => "br",
            Self::Brtrue => "brtrue",
            Self::Brfalse => "brfalse",
            Self::Ret => "ret",
            Self::Call => "call",
            Self::Callvirt => "callvirt",
            Self::Newobj => "newobj",
            Self::Ldfld => "ldfld",
            Self::Stfld => "stfld",
            Self::Ldsfld => "ldsfld",
            Self::Stsfld => "stsfld",
            Self::Newarr => "newarr",
            Self::LdelemRef => "ldelem.ref",
            Self::StelemRef => "stelem.ref",
        }
    }

    /// Operand shape carried by this opcode
    pub fn operand_kind(self) -> OperandKind {
        match self {
            Self::LdargS | Self::LdlocS | Self::StlocS => OperandKind::Slot,
            Self::LdcI4S => OperandKind::ShortInt32,
            Self::LdcI4 => OperandKind::Int32,
            Self::LdcI8 => OperandKind::Int64,
            Self::LdcR4 => OperandKind::Float32,
            Self::LdcR8 => OperandKind::Float64,
            Self::Ldstr => OperandKind::String,
            Self::Box | Self::Newarr => OperandKind::Type,
            Self::Br | Self::Brtrue | Self::Brfalse => OperandKind::Branch,
            Self::Call | Self::Callvirt | Self::Newobj => OperandKind::Method,
            Self::Ldfld | Self::Stfld | Self::Ldsfld | Self::Stsfld => OperandKind::Field,
            _ => OperandKind::None,
        }
    }

    /// Check if this opcode is a branch instruction
    pub fn is_branch(self) -> bool {
        matches!(self, Self::Br | Self::Brtrue | Self::Brfalse)
    }

    /// Check if this opcode is a conditional branch
    pub fn is_conditional_branch(self) -> bool {
        matches!(self, Self::Brtrue | Self::Brfalse)
    }

    /// Check if this opcode is a call instruction
    pub fn is_call(self) -> bool {
        matches!(self, Self::Call | Self::Callvirt | Self::Newobj)
    }

    /// Check if this opcode pushes an int32 literal
    pub fn is_int32_literal(self) -> bool {
        matches!(
            self,
            Self::LdcI4_0
                | Self::LdcI4_1
                | Self::LdcI4_2
                | Self::LdcI4_3
                | Self::LdcI4_4
                | Self::LdcI4_5
                | Self::LdcI4_6
                | Self::LdcI4_7
                | Self::LdcI4_8
                | Self::LdcI4S
                | Self::LdcI4
        )
    }

    /// Check if control never falls through to the next instruction
    pub fn is_terminator(self) -> bool {
        matches!(self, Self::Br | Self::Ret)
    }
}
