//! Semweave Bytecode Definitions
//!
//! This crate provides the instruction set, the metadata model and binary
//! module format, and the stack verifier used by the semweave weaver.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod encoder;
pub mod instruction;
pub mod module;
pub mod opcode;
pub mod signature;
pub mod verify;

pub use encoder::{BytecodeReader, BytecodeWriter, DecodeError};
pub use instruction::{disassemble, Instruction, Operand};
pub use module::{
    Constant, CustomAttribute, FieldDef, MethodBody, MethodDef, Module, ModuleError, ParamDef,
    PropertyDef, TypeDef,
};
pub use opcode::{Opcode, OperandKind};
pub use signature::{FieldRef, MethodRef, TypeRef, TypeSig};
pub use verify::{compute_max_stack, verify_body, verify_method, verify_module, BodyShape, VerifyError};
