//! Instruction builder layer
//!
//! Literal pushes, opcode classification, and an append-only instruction
//! list with forward labels used by the generator tasks to assemble method
//! bodies before they are swapped into the module.

use crate::error::{Result, WeaveError};
use semweave_bytecode::{Constant, Instruction, Opcode, Operand};

/// Most compact instruction pushing an int32 literal
///
/// 0 through 8 use the dedicated zero-operand opcodes; every other value,
/// negative ones included, uses `ldc.i4.s` carrying the value.
pub fn push_int32(value: i32) -> Instruction {
    let opcode = match value {
        0 => Opcode::LdcI4_0,
        1 => Opcode::LdcI4_1,
        2 => Opcode::LdcI4_2,
        3 => Opcode::LdcI4_3,
        4 => Opcode::LdcI4_4,
        5 => Opcode::LdcI4_5,
        6 => Opcode::LdcI4_6,
        7 => Opcode::LdcI4_7,
        8 => Opcode::LdcI4_8,
        _ => return Instruction::with(Opcode::LdcI4S, Operand::Int32(value)),
    };
    Instruction::new(opcode)
}

/// True for all eleven int32 literal forms
pub fn is_load_int32(instr: &Instruction) -> bool {
    instr.opcode.is_int32_literal()
}

pub fn has_opcode(instr: &Instruction, opcode: Opcode) -> bool {
    instr.opcode == opcode
}

/// Load argument `index`, using the short forms for 0 through 3
pub fn load_arg(index: u8) -> Instruction {
    match index {
        0 => Instruction::new(Opcode::Ldarg0),
        1 => Instruction::new(Opcode::Ldarg1),
        2 => Instruction::new(Opcode::Ldarg2),
        3 => Instruction::new(Opcode::Ldarg3),
        _ => Instruction::with(Opcode::LdargS, Operand::Slot(index)),
    }
}

pub fn load_local(index: u8) -> Instruction {
    match index {
        0 => Instruction::new(Opcode::Ldloc0),
        1 => Instruction::new(Opcode::Ldloc1),
        2 => Instruction::new(Opcode::Ldloc2),
        3 => Instruction::new(Opcode::Ldloc3),
        _ => Instruction::with(Opcode::LdlocS, Operand::Slot(index)),
    }
}

pub fn store_local(index: u8) -> Instruction {
    match index {
        0 => Instruction::new(Opcode::Stloc0),
        1 => Instruction::new(Opcode::Stloc1),
        2 => Instruction::new(Opcode::Stloc2),
        3 => Instruction::new(Opcode::Stloc3),
        _ => Instruction::with(Opcode::StlocS, Operand::Slot(index)),
    }
}

pub fn load_string(value: &str) -> Instruction {
    Instruction::with(Opcode::Ldstr, Operand::String(value.to_string()))
}

/// Instructions pushing an attribute constant as a default value
///
/// Returns `None` for constant kinds that have no literal form here.
pub fn push_constant(constant: &Constant) -> Option<Vec<Instruction>> {
    let instructions = match *constant {
        Constant::String(ref s) => vec![load_string(s)],
        Constant::Bool(b) => vec![push_int32(i32::from(b))],
        Constant::I16(v) => vec![push_int32(i32::from(v))],
        Constant::U16(v) => vec![push_int32(i32::from(v))],
        Constant::I32(v) => vec![push_int32(v)],
        Constant::U32(v) => vec![push_int32(v as i32)],
        Constant::I64(v) => match i32::try_from(v) {
            Ok(small) => vec![push_int32(small), Instruction::new(Opcode::ConvI8)],
            Err(_) => vec![Instruction::with(Opcode::LdcI8, Operand::Int64(v))],
        },
        Constant::U64(v) => match u32::try_from(v) {
            Ok(small) => vec![push_int32(small as i32), Instruction::new(Opcode::ConvU8)],
            Err(_) => vec![Instruction::with(Opcode::LdcI8, Operand::Int64(v as i64))],
        },
        Constant::F32(v) => vec![Instruction::with(Opcode::LdcR4, Operand::Float32(v))],
        Constant::F64(v) => vec![Instruction::with(Opcode::LdcR8, Operand::Float64(v))],
        _ => return None,
    };
    Some(instructions)
}

/// Forward-referencable position in an [`InstructionList`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label {
    id: usize,
}

/// Append-only instruction sequence with labels
///
/// Branches to a label are recorded as fixups and resolved to instruction
/// indices by [`InstructionList::finish`].
#[derive(Debug, Default)]
pub struct InstructionList {
    instructions: Vec<Instruction>,
    labels: Vec<Option<usize>>,
    fixups: Vec<(usize, Label)>,
}

impl InstructionList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn push(&mut self, instr: Instruction) -> &mut Self {
        self.instructions.push(instr);
        self
    }

    pub fn emit(&mut self, opcode: Opcode) -> &mut Self {
        self.push(Instruction::new(opcode))
    }

    pub fn emit_with(&mut self, opcode: Opcode, operand: Operand) -> &mut Self {
        self.push(Instruction::with(opcode, operand))
    }

    pub fn extend(&mut self, instructions: impl IntoIterator<Item = Instruction>) -> &mut Self {
        self.instructions.extend(instructions);
        self
    }

    pub fn define_label(&mut self) -> Label {
        self.labels.push(None);
        Label {
            id: self.labels.len() - 1,
        }
    }

    /// Bind `label` to the next instruction appended
    pub fn mark(&mut self, label: Label) -> &mut Self {
        self.labels[label.id] = Some(self.instructions.len());
        self
    }

    /// Append a branch to `label`
    pub fn branch(&mut self, opcode: Opcode, label: Label) -> &mut Self {
        self.fixups.push((self.instructions.len(), label));
        self.emit_with(opcode, Operand::Branch(usize::MAX))
    }

    /// Resolve labels and return the finished sequence
    pub fn finish(mut self) -> Result<Vec<Instruction>> {
        for (index, label) in self.fixups {
            let target = self.labels[label.id].ok_or(WeaveError::UnboundLabel(label.id))?;
            self.instructions[index].operand = Operand::Branch(target);
        }
        Ok(self.instructions)
    }
}
