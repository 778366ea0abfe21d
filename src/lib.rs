//! chronal-vm library
//!
//! Interpreter for the chronal wrist-device register machine: a fixed
//! 16-opcode instruction set over a small integer register file, with an
//! optional register bound to the instruction pointer for control flow.

pub mod isa;
pub mod machine;
pub mod parser;
pub mod samples;
