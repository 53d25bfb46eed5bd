//! Method body verification
//!
//! Bodies are checked by abstract interpretation of the evaluation stack:
//! every reachable instruction is visited with a known stack depth, and
//! every path into an instruction must agree on that depth.

use crate::instruction::{Instruction, Operand};
use crate::module::{MethodBody, MethodDef, Module};
use crate::opcode::Opcode;

/// Bytecode verification errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    /// Operand shape does not match the opcode
    #[error("Operand mismatch for {opcode} at IL_{offset:04}")]
    OperandMismatch {
        /// Mnemonic of the offending instruction
        opcode: &'static str,
        /// Instruction index
        offset: usize,
    },

    /// Stack underflow
    #[error("Stack underflow at IL_{0:04}")]
    StackUnderflow(usize),

    /// Two paths reach an instruction with different stack depths
    #[error("Inconsistent stack depth at IL_{offset:04}: {first} vs {second}")]
    StackMismatch {
        /// Instruction index where the paths meet
        offset: usize,
        /// Depth recorded first
        first: usize,
        /// Conflicting depth
        second: usize,
    },

    /// Stack not empty at a `ret` of a void method, or empty for a value method
    #[error("Unbalanced stack at return IL_{offset:04} (depth {depth})")]
    UnbalancedReturn {
        /// Index of the `ret`
        offset: usize,
        /// Stack depth at the `ret`
        depth: usize,
    },

    /// Invalid branch target
    #[error("Invalid branch target {target} at IL_{offset:04}")]
    InvalidJumpTarget {
        /// Branch target index
        target: usize,
        /// Index of the branch
        offset: usize,
    },

    /// Invalid local variable reference
    #[error("Invalid local variable reference: index {index} (max {max}) at IL_{offset:04}")]
    InvalidLocalRef {
        /// Local slot used
        index: usize,
        /// Number of declared locals
        max: usize,
        /// Instruction index
        offset: usize,
    },

    /// Invalid argument reference
    #[error("Invalid argument reference: index {index} (max {max}) at IL_{offset:04}")]
    InvalidArgRef {
        /// Argument slot used
        index: usize,
        /// Number of argument slots
        max: usize,
        /// Instruction index
        offset: usize,
    },

    /// Execution falls off end
    #[error("Execution falls off end of method at IL_{0:04}")]
    FallOffEnd(usize),

    /// Body has no instructions
    #[error("Method body is empty")]
    EmptyBody,

    /// Declared max stack lower than required
    #[error("Declared max stack {declared} is below required depth {required}")]
    MaxStackTooSmall {
        /// Declared bound
        declared: u16,
        /// Depth reached by the body
        required: usize,
    },

    /// Error inside a specific method
    #[error("{method}: {source}")]
    InMethod {
        /// Qualified method name
        method: String,
        /// Underlying error
        #[source]
        source: Box<VerifyError>,
    },
}

/// Shape of the method a body belongs to
#[derive(Debug, Clone, Copy)]
pub struct BodyShape {
    /// Number of argument slots, including `this`
    pub arg_count: usize,
    /// Method returns a value
    pub returns_value: bool,
}

impl BodyShape {
    /// Shape of a method definition
    pub fn of(method: &MethodDef) -> Self {
        Self {
            arg_count: method.arg_count(),
            returns_value: !method.return_type.is_void(),
        }
    }
}

/// Verify every method body in a module
pub fn verify_module(module: &Module) -> Result<(), VerifyError> {
    for ty in &module.types {
        for method in &ty.methods {
            verify_method(method).map_err(|e| VerifyError::InMethod {
                method: format!("{}::{}", ty.full_name(), method.name),
                source: Box::new(e),
            })?;
        }
    }
    Ok(())
}

/// Verify one method; methods without a body always pass
pub fn verify_method(method: &MethodDef) -> Result<(), VerifyError> {
    match &method.body {
        Some(body) => verify_body(body, BodyShape::of(method)),
        None => Ok(()),
    }
}

/// Verify a body and check its declared max stack
pub fn verify_body(body: &MethodBody, shape: BodyShape) -> Result<(), VerifyError> {
    let required = compute_max_stack(body, shape)?;
    if usize::from(body.max_stack) < required {
        return Err(VerifyError::MaxStackTooSmall {
            declared: body.max_stack,
            required,
        });
    }
    Ok(())
}

/// Compute the maximum evaluation stack depth of a body
///
/// Fails if the body is not well formed: bad operands, out-of-range
/// slots or branch targets, underflow, inconsistent merge depths, or
/// control reaching past the last instruction.
pub fn compute_max_stack(body: &MethodBody, shape: BodyShape) -> Result<usize, VerifyError> {
    let instructions = &body.instructions;
    if instructions.is_empty() {
        return Err(VerifyError::EmptyBody);
    }

    let mut depths: Vec<Option<usize>> = vec![None; instructions.len()];
    let mut worklist = vec![0usize];
    depths[0] = Some(0);
    let mut max_depth = 0;

    while let Some(offset) = worklist.pop() {
        let instr = &instructions[offset];
        let depth = depths[offset].unwrap_or_default();

        check_operand(instr, offset)?;
        check_slots(instr, offset, shape.arg_count, body.locals.len())?;

        let (pops, pushes) = stack_effect(instr, shape);
        if instr.opcode == Opcode::Ret && depth != pops {
            return Err(VerifyError::UnbalancedReturn { offset, depth });
        }
        if depth < pops {
            return Err(VerifyError::StackUnderflow(offset));
        }
        let next_depth = depth - pops + pushes;
        max_depth = max_depth.max(next_depth);

        let mut successors = Vec::with_capacity(2);
        if let Some(target) = instr.branch_target() {
            if target >= instructions.len() {
                return Err(VerifyError::InvalidJumpTarget { target, offset });
            }
            successors.push(target);
        }
        if instr.opcode != Opcode::Ret && !instr.opcode.is_terminator() {
            if offset + 1 >= instructions.len() {
                return Err(VerifyError::FallOffEnd(offset));
            }
            successors.push(offset + 1);
        }

        for succ in successors {
            match depths[succ] {
                None => {
                    depths[succ] = Some(next_depth);
                    worklist.push(succ);
                }
                Some(existing) if existing != next_depth => {
                    return Err(VerifyError::StackMismatch {
                        offset: succ,
                        first: existing,
                        second: next_depth,
                    });
                }
                Some(_) => {}
            }
        }
    }

    Ok(max_depth)
}

fn check_operand(instr: &Instruction, offset: usize) -> Result<(), VerifyError> {
    if instr.operand.matches(instr.opcode.operand_kind()) {
        Ok(())
    } else {
        Err(VerifyError::OperandMismatch {
            opcode: instr.opcode.name(),
            offset,
        })
    }
}

fn check_slots(
    instr: &Instruction,
    offset: usize,
    arg_count: usize,
    local_count: usize,
) -> Result<(), VerifyError> {
    let slot = match instr.operand {
        Operand::Slot(slot) => Some(usize::from(slot)),
        _ => None,
    };
    let arg = match instr.opcode {
        Opcode::Ldarg0 => Some(0),
        Opcode::Ldarg1 => Some(1),
        Opcode::Ldarg2 => Some(2),
        Opcode::Ldarg3 => Some(3),
        Opcode::LdargS => slot,
        _ => None,
    };
    if let Some(index) = arg {
        if index >= arg_count {
            return Err(VerifyError::InvalidArgRef {
                index,
                max: arg_count,
                offset,
            });
        }
    }
    let local = match instr.opcode {
        Opcode::Ldloc0 | Opcode::Stloc0 => Some(0),
        Opcode::Ldloc1 | Opcode::Stloc1 => Some(1),
        Opcode::Ldloc2 | Opcode::Stloc2 => Some(2),
        Opcode::Ldloc3 | Opcode::Stloc3 => Some(3),
        Opcode::LdlocS | Opcode::StlocS => slot,
        _ => None,
    };
    if let Some(index) = local {
        if index >= local_count {
            return Err(VerifyError::InvalidLocalRef {
                index,
                max: local_count,
                offset,
            });
        }
    }
    Ok(())
}

/// Number of values popped and pushed by an instruction
fn stack_effect(instr: &Instruction, shape: BodyShape) -> (usize, usize) {
    use Opcode::*;
    match instr.opcode {
        Nop | Br => (0, 0),
        Ldarg0 | Ldarg1 | Ldarg2 | Ldarg3 | LdargS => (0, 1),
        Ldloc0 | Ldloc1 | Ldloc2 | Ldloc3 | LdlocS => (0, 1),
        Stloc0 | Stloc1 | Stloc2 | Stloc3 | StlocS => (1, 0),
        Ldnull | LdcI4_0 | LdcI4_1 | LdcI4_2 | LdcI4_3 | LdcI4_4 | LdcI4_5 | LdcI4_6
        | LdcI4_7 | LdcI4_8 | LdcI4S | LdcI4 | LdcI8 | LdcR4 | LdcR8 | Ldstr => (0, 1),
        Dup => (1, 2),
        Pop => (1, 0),
        Ceq => (2, 1),
        ConvI8 | ConvU8 | Box => (1, 1),
        Brtrue | Brfalse => (1, 0),
        Ret => (usize::from(shape.returns_value), 0),
        Call | Callvirt => match instr.method() {
            Some(m) => (m.pop_count(), usize::from(m.returns_value())),
            None => (0, 0),
        },
        Newobj => match instr.method() {
            Some(m) => (m.parameters.len(), 1),
            None => (0, 1),
        },
        Ldfld => (1, 1),
        Stfld => (2, 0),
        Ldsfld => (0, 1),
        Stsfld => (1, 0),
        Newarr => (1, 1),
        LdelemRef => (2, 1),
        StelemRef => (3, 0),
    }
}
