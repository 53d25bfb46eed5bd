//! Structured instructions
//!
//! Method bodies are stored as a list of [`Instruction`]s rather than raw
//! bytes. Branch operands hold the index of the target instruction, so
//! inserting instructions requires shifting targets (see
//! [`MethodBody::insert`](crate::module::MethodBody::insert)).

use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};
use crate::opcode::{Opcode, OperandKind};
use crate::signature::{FieldRef, MethodRef, TypeSig};
use std::fmt;

/// Instruction operand
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand
    None,
    /// 32-bit integer literal
    Int32(i32),
    /// 64-bit integer literal
    Int64(i64),
    /// 32-bit float literal
    Float32(f32),
    /// 64-bit float literal
    Float64(f64),
    /// String literal
    String(String),
    /// Argument or local slot
    Slot(u8),
    /// Field reference
    Field(FieldRef),
    /// Method reference
    Method(MethodRef),
    /// Type token
    Type(TypeSig),
    /// Index of the target instruction
    Branch(usize),
}

impl Operand {
    /// Operand kind this value satisfies
    ///
    /// `Int32` satisfies both the short and the fixed int32 forms.
    pub fn matches(&self, kind: OperandKind) -> bool {
        matches!(
            (self, kind),
            (Operand::None, OperandKind::None)
                | (Operand::Int32(_), OperandKind::Int32 | OperandKind::ShortInt32)
                | (Operand::Int64(_), OperandKind::Int64)
                | (Operand::Float32(_), OperandKind::Float32)
                | (Operand::Float64(_), OperandKind::Float64)
                | (Operand::String(_), OperandKind::String)
                | (Operand::Slot(_), OperandKind::Slot)
                | (Operand::Field(_), OperandKind::Field)
                | (Operand::Method(_), OperandKind::Method)
                | (Operand::Type(_), OperandKind::Type)
                | (Operand::Branch(_), OperandKind::Branch)
        )
    }
}

/// A single instruction
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// Operation
    pub opcode: Opcode,
    /// Operand, which must agree with the opcode's operand kind
    pub operand: Operand,
}

impl Instruction {
    /// Instruction without an operand
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            operand: Operand::None,
        }
    }

    /// Instruction with an operand
    pub fn with(opcode: Opcode, operand: Operand) -> Self {
        Self { opcode, operand }
    }

    /// Field operand, if any
    pub fn field(&self) -> Option<&FieldRef> {
        match &self.operand {
            Operand::Field(field) => Some(field),
            _ => None,
        }
    }

    /// Method operand, if any
    pub fn method(&self) -> Option<&MethodRef> {
        match &self.operand {
            Operand::Method(method) => Some(method),
            _ => None,
        }
    }

    /// Target index of a branch operand
    pub fn branch_target(&self) -> Option<usize> {
        match self.operand {
            Operand::Branch(target) => Some(target),
            _ => None,
        }
    }

    /// Append every module scope referenced by the operand
    pub fn collect_scopes(&self, out: &mut Vec<String>) {
        match &self.operand {
            Operand::Field(field) => field.collect_scopes(out),
            Operand::Method(method) => method.collect_scopes(out),
            Operand::Type(sig) => sig.collect_scopes(out),
            _ => {}
        }
    }

    pub(crate) fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_opcode(self.opcode);
        match (&self.operand, self.opcode.operand_kind()) {
            (Operand::Int32(v), OperandKind::ShortInt32) => writer.emit_varint_i32(*v),
            (Operand::Int32(v), _) => writer.emit_i32(*v),
            (Operand::Int64(v), _) => writer.emit_i64(*v),
            (Operand::Float32(v), _) => writer.emit_f32(*v),
            (Operand::Float64(v), _) => writer.emit_f64(*v),
            (Operand::String(s), _) => writer.emit_string(s),
            (Operand::Slot(slot), _) => writer.emit_u8(*slot),
            (Operand::Field(field), _) => field.encode(writer),
            (Operand::Method(method), _) => method.encode(writer),
            (Operand::Type(sig), _) => sig.encode(writer),
            (Operand::Branch(target), _) => writer.emit_u32(*target as u32),
            (Operand::None, _) => {}
        }
    }

    pub(crate) fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let opcode = reader.read_opcode()?;
        let operand = match opcode.operand_kind() {
            OperandKind::None => Operand::None,
            OperandKind::ShortInt32 => Operand::Int32(reader.read_varint_i32()?),
            OperandKind::Int32 => Operand::Int32(reader.read_i32()?),
            OperandKind::Int64 => Operand::Int64(reader.read_i64()?),
            OperandKind::Float32 => Operand::Float32(reader.read_f32()?),
            OperandKind::Float64 => Operand::Float64(reader.read_f64()?),
            OperandKind::String => Operand::String(reader.read_string()?),
            OperandKind::Slot => Operand::Slot(reader.read_u8()?),
            OperandKind::Field => Operand::Field(FieldRef::decode(reader)?),
            OperandKind::Method => Operand::Method(MethodRef::decode(reader)?),
            OperandKind::Type => Operand::Type(TypeSig::decode(reader)?),
            OperandKind::Branch => Operand::Branch(reader.read_u32()? as usize),
        };
        Ok(Self { opcode, operand })
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.opcode.name())?;
        match &self.operand {
            Operand::None => Ok(()),
            Operand::Int32(v) => write!(f, " {}", v),
            Operand::Int64(v) => write!(f, " {}", v),
            Operand::Float32(v) => write!(f, " {}", v),
            Operand::Float64(v) => write!(f, " {}", v),
            Operand::String(s) => write!(f, " {:?}", s),
            Operand::Slot(slot) => write!(f, " {}", slot),
            Operand::Field(field) => write!(f, " {}", field),
            Operand::Method(method) => write!(f, " {}", method),
            Operand::Type(sig) => write!(f, " {}", sig),
            Operand::Branch(target) => write!(f, " IL_{:04}", target),
        }
    }
}

/// Render instructions one per line, prefixed with their index
pub fn disassemble(instructions: &[Instruction]) -> String {
    instructions
        .iter()
        .enumerate()
        .map(|(i, instr)| format!("IL_{:04}: {}\n", i, instr))
        .collect()
}
