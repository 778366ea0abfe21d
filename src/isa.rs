//! Chronal instruction set.
//!
//! Sixteen opcodes over a small integer register file. Every opcode reads
//! up to two operands and writes one destination register:
//!
//! - **Arithmetic**: addr/addi, mulr/muli
//! - **Bitwise**: banr/bani, borr/bori
//! - **Assignment**: setr/seti
//! - **Comparison**: gtir/gtri/gtrr, eqir/eqri/eqrr (write 0 or 1)
//!
//! The mnemonic suffix encodes the operand kinds: `r` means the operand
//! is a register index whose value is used, `i` means the operand is the
//! literal value itself. The destination `C` is always a register index.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::machine::RegisterFile;

/// Error for a mnemonic that is not one of the 16 opcodes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown opcode mnemonic: {0:?}")]
pub struct UnknownMnemonic(pub String);

/// How an operand slot is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// The operand is a register index; its value is read.
    Register,
    /// The operand is used as a literal value.
    Immediate,
    /// The operand is not used by the opcode.
    Ignored,
}

/// One of the 16 fixed operation tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Addr,
    Addi,
    Mulr,
    Muli,
    Banr,
    Bani,
    Borr,
    Bori,
    Setr,
    Seti,
    Gtir,
    Gtri,
    Gtrr,
    Eqir,
    Eqri,
    Eqrr,
}

impl Opcode {
    /// All 16 opcodes, in canonical mnemonic order.
    pub const ALL: [Opcode; 16] = [
        Opcode::Addr,
        Opcode::Addi,
        Opcode::Mulr,
        Opcode::Muli,
        Opcode::Banr,
        Opcode::Bani,
        Opcode::Borr,
        Opcode::Bori,
        Opcode::Setr,
        Opcode::Seti,
        Opcode::Gtir,
        Opcode::Gtri,
        Opcode::Gtrr,
        Opcode::Eqir,
        Opcode::Eqri,
        Opcode::Eqrr,
    ];

    /// The canonical four-letter mnemonic.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Addr => "addr",
            Opcode::Addi => "addi",
            Opcode::Mulr => "mulr",
            Opcode::Muli => "muli",
            Opcode::Banr => "banr",
            Opcode::Bani => "bani",
            Opcode::Borr => "borr",
            Opcode::Bori => "bori",
            Opcode::Setr => "setr",
            Opcode::Seti => "seti",
            Opcode::Gtir => "gtir",
            Opcode::Gtri => "gtri",
            Opcode::Gtrr => "gtrr",
            Opcode::Eqir => "eqir",
            Opcode::Eqri => "eqri",
            Opcode::Eqrr => "eqrr",
        }
    }

    /// Operand kinds for the A and B slots.
    ///
    /// C is always a register index and is not reported here.
    pub fn operand_kinds(self) -> (OperandKind, OperandKind) {
        use OperandKind::{Ignored, Immediate, Register};
        match self {
            Opcode::Addr | Opcode::Mulr | Opcode::Banr | Opcode::Borr => (Register, Register),
            Opcode::Addi | Opcode::Muli | Opcode::Bani | Opcode::Bori => (Register, Immediate),
            Opcode::Setr => (Register, Ignored),
            Opcode::Seti => (Immediate, Ignored),
            Opcode::Gtrr | Opcode::Eqrr => (Register, Register),
            Opcode::Gtri | Opcode::Eqri => (Register, Immediate),
            Opcode::Gtir | Opcode::Eqir => (Immediate, Register),
        }
    }
}

impl FromStr for Opcode {
    type Err = UnknownMnemonic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Opcode::ALL
            .into_iter()
            .find(|op| op.mnemonic() == s)
            .ok_or_else(|| UnknownMnemonic(s.to_string()))
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// A single decoded instruction.
///
/// `a` and `b` are interpreted per [`Opcode::operand_kinds`]; `c` is
/// always the destination register index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub a: i64,
    pub b: i64,
    pub c: usize,
}

impl Instruction {
    pub fn new(opcode: Opcode, a: i64, b: i64, c: usize) -> Self {
        Self { opcode, a, b, c }
    }

    /// Evaluate this instruction against a register file.
    ///
    /// Pure: returns a new register file identical to the input except
    /// that register `c` holds the computed result. Register-form
    /// operands must be valid indices (enforced at program load).
    pub fn eval(&self, regs: &RegisterFile) -> RegisterFile {
        let mut out = regs.clone();
        out[self.c] = self.result(regs);
        out
    }

    /// The value this instruction writes into register `c`.
    fn result(&self, r: &RegisterFile) -> i64 {
        let (a, b) = (self.a, self.b);
        // Register-form shorthands; only used by the arms whose operand
        // kind is Register.
        let ra = || r[a as usize];
        let rb = || r[b as usize];

        match self.opcode {
            Opcode::Addr => ra() + rb(),
            Opcode::Addi => ra() + b,
            Opcode::Mulr => ra() * rb(),
            Opcode::Muli => ra() * b,
            Opcode::Banr => ra() & rb(),
            Opcode::Bani => ra() & b,
            Opcode::Borr => ra() | rb(),
            Opcode::Bori => ra() | b,
            Opcode::Setr => ra(),
            Opcode::Seti => a,
            Opcode::Gtir => (a > rb()) as i64,
            Opcode::Gtri => (ra() > b) as i64,
            Opcode::Gtrr => (ra() > rb()) as i64,
            Opcode::Eqir => (a == rb()) as i64,
            Opcode::Eqri => (ra() == b) as i64,
            Opcode::Eqrr => (ra() == rb()) as i64,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} {}", self.opcode, self.a, self.b, self.c)
    }
}
