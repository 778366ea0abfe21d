//! Execution engine for chronal programs.
//!
//! The engine drives a fetch-evaluate-advance loop over an immutable
//! [`Program`]. A program may bind one register to the instruction
//! pointer: the current pc is copied into that register before each
//! instruction evaluates, and copied back out afterwards, so programs
//! branch by writing to the bound register.
//!
//! The only normal termination condition is the pc leaving the program's
//! instruction range; there is no halt opcode. Some valid programs run
//! for billions of steps (or never halt), so callers needing a bound use
//! [`Machine::run_bounded`] rather than [`Machine::run`].

use std::fmt;
use std::ops::{Index, IndexMut};

use smallvec::SmallVec;
use thiserror::Error;

use crate::isa::{Instruction, OperandKind};

/// A fixed-length file of signed 64-bit registers.
///
/// Sized by the caller at the start of a run (typically 4-6 registers)
/// and never resized during execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterFile {
    regs: SmallVec<[i64; 8]>,
}

impl RegisterFile {
    /// A zeroed register file with `count` registers.
    pub fn zeroed(count: usize) -> Self {
        Self {
            regs: SmallVec::from_elem(0, count),
        }
    }

    pub fn from_slice(vals: &[i64]) -> Self {
        Self {
            regs: SmallVec::from_slice(vals),
        }
    }

    pub fn len(&self) -> usize {
        self.regs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regs.is_empty()
    }

    pub fn as_slice(&self) -> &[i64] {
        &self.regs
    }
}

impl Index<usize> for RegisterFile {
    type Output = i64;

    #[inline]
    fn index(&self, index: usize) -> &i64 {
        &self.regs[index]
    }
}

impl IndexMut<usize> for RegisterFile {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut i64 {
        &mut self.regs[index]
    }
}

impl fmt::Display for RegisterFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, v) in self.regs.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", v)?;
        }
        write!(f, "]")
    }
}

/// A loaded program: an instruction sequence plus an optional register
/// bound to the instruction pointer. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    pub instructions: Vec<Instruction>,
    pub ip_register: Option<usize>,
}

impl Program {
    pub fn new(instructions: Vec<Instruction>, ip_register: Option<usize>) -> Self {
        Self {
            instructions,
            ip_register,
        }
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Check that every register reference fits a register file of
    /// `register_count` registers.
    ///
    /// Well-formedness is a property of the program against a concrete
    /// file size; violations are fatal configuration errors, never
    /// recovered from mid-run.
    pub fn validate(&self, register_count: usize) -> Result<(), LoadError> {
        if let Some(ip) = self.ip_register {
            if ip >= register_count {
                return Err(LoadError::BoundRegisterOutOfRange {
                    register: ip,
                    register_count,
                });
            }
        }

        for (address, inst) in self.instructions.iter().enumerate() {
            if inst.c >= register_count {
                return Err(LoadError::DestinationOutOfRange {
                    address,
                    register: inst.c,
                    register_count,
                });
            }

            let (kind_a, kind_b) = inst.opcode.operand_kinds();
            for (slot, kind, value) in [("A", kind_a, inst.a), ("B", kind_b, inst.b)] {
                if kind == OperandKind::Register
                    && !(0..register_count as i64).contains(&value)
                {
                    return Err(LoadError::SourceOutOfRange {
                        address,
                        slot,
                        register: value,
                        register_count,
                    });
                }
            }
        }

        Ok(())
    }
}

/// Fatal program-load error.
///
/// Raised before execution starts; the engine never begins a run over a
/// malformed program.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error(
        "instruction {address}: destination register {register} out of range \
         (register file has {register_count} registers)"
    )]
    DestinationOutOfRange {
        address: usize,
        register: usize,
        register_count: usize,
    },

    #[error(
        "instruction {address}: operand {slot} names register {register}, out of range \
         (register file has {register_count} registers)"
    )]
    SourceOutOfRange {
        address: usize,
        slot: &'static str,
        register: i64,
        register_count: usize,
    },

    #[error("bound instruction-pointer register {register} out of range (register file has {register_count} registers)")]
    BoundRegisterOutOfRange {
        register: usize,
        register_count: usize,
    },
}

/// Why a bounded run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The pc left the instruction range; normal termination.
    Halted,
    /// The caller's step budget was exhausted before the program halted.
    StepLimit,
}

/// Execution state for one run of a program.
///
/// Owns the register file and program counter exclusively for the
/// duration of the run; the program itself is borrowed read-only, so
/// independent runs over the same program need no coordination.
#[derive(Debug)]
pub struct Machine<'a> {
    program: &'a Program,
    regs: RegisterFile,
    pc: i64,
    steps: u64,
}

impl<'a> Machine<'a> {
    /// Create a machine over `program` with the given initial registers.
    ///
    /// Validates the program against the register file size; a malformed
    /// program is rejected here, before any instruction executes.
    pub fn new(program: &'a Program, regs: RegisterFile) -> Result<Self, LoadError> {
        program.validate(regs.len())?;
        Ok(Self {
            program,
            regs,
            pc: 0,
            steps: 0,
        })
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.regs
    }

    /// Current program counter. Signed: bound-register writes can drive
    /// it negative, which halts on the next fetch check.
    pub fn pc(&self) -> i64 {
        self.pc
    }

    /// Steps executed so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// The instruction the next step would execute, if the machine has
    /// not halted.
    pub fn current_instruction(&self) -> Option<&Instruction> {
        usize::try_from(self.pc)
            .ok()
            .and_then(|pc| self.program.instructions.get(pc))
    }

    /// Whether the pc is outside the instruction range.
    pub fn halted(&self) -> bool {
        self.current_instruction().is_none()
    }

    /// Execute one instruction.
    ///
    /// Returns `false` if the machine was already halted (the pc is
    /// outside the instruction range), `true` after executing a step.
    ///
    /// The bound-register protocol is an explicit two-phase copy, and the
    /// ordering is load-bearing: pc is written into the bound register
    /// before evaluation, read back after, and only then incremented. An
    /// instruction that writes `V` into the bound register therefore
    /// resumes at `V + 1`.
    pub fn step(&mut self) -> bool {
        let inst = match self.current_instruction() {
            Some(inst) => *inst,
            None => return false,
        };

        if let Some(ip_reg) = self.program.ip_register {
            self.regs[ip_reg] = self.pc;
        }

        self.regs = inst.eval(&self.regs);

        if let Some(ip_reg) = self.program.ip_register {
            self.pc = self.regs[ip_reg];
        }
        self.pc += 1;
        self.steps += 1;

        log::trace!("step {}: {} -> pc={} regs={}", self.steps, inst, self.pc, self.regs);
        true
    }

    /// Run until the program halts, returning the final registers.
    ///
    /// Non-termination is a property of the input program, not an engine
    /// error; use [`run_bounded`](Self::run_bounded) for a step budget.
    pub fn run(&mut self) -> &RegisterFile {
        while self.step() {}
        &self.regs
    }

    /// Run until the program halts or `max_steps` further steps have
    /// executed, whichever comes first.
    pub fn run_bounded(&mut self, max_steps: u64) -> Outcome {
        for _ in 0..max_steps {
            if !self.step() {
                return Outcome::Halted;
            }
        }
        if self.halted() {
            Outcome::Halted
        } else {
            Outcome::StepLimit
        }
    }

    /// Consume the machine, yielding the register file.
    pub fn into_registers(self) -> RegisterFile {
        self.regs
    }
}

/// Run `program` from `regs` to completion.
///
/// Convenience wrapper over [`Machine`] for callers that only need the
/// final register file.
pub fn run(program: &Program, regs: RegisterFile) -> Result<RegisterFile, LoadError> {
    let mut machine = Machine::new(program, regs)?;
    machine.run();
    Ok(machine.into_registers())
}
