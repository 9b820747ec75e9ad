//! Bytecode definitions for method bodies
//!
//! The compiler frontend is external; this module fixes the instruction
//! encoding it must produce (16-bit symbol ids, 8-bit field indices, a
//! constant slot for every super call) and provides an assembler for hosts
//! and tests.

mod function;
mod opcode;

pub use function::{Constant, Function, FunctionBuilder};
pub use opcode::Opcode;
