//! Opcode identification from observed samples.
//!
//! Device dumps carry instructions whose opcode is a bare numeric code
//! rather than a mnemonic, together with samples recording the register
//! file before and after one such instruction executed. Because every
//! opcode's evaluation is pure and total, each sample can be replayed
//! against all 16 opcodes to see which ones reproduce the observed
//! effect; intersecting those candidate sets across samples pins each
//! code to a single opcode.

use thiserror::Error;

use crate::isa::{Instruction, Opcode};
use crate::machine::RegisterFile;

/// Number of distinct numeric opcodes, equal to the instruction set size.
pub const CODE_COUNT: usize = 16;

/// An instruction whose opcode is still a numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawInstruction {
    pub code: usize,
    pub a: i64,
    pub b: i64,
    pub c: usize,
}

impl RawInstruction {
    /// Reinterpret with a concrete opcode.
    fn with_opcode(self, opcode: Opcode) -> Instruction {
        Instruction::new(opcode, self.a, self.b, self.c)
    }
}

/// One observed execution: registers before, the raw instruction, and
/// registers after.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub before: RegisterFile,
    pub instr: RawInstruction,
    pub after: RegisterFile,
}

/// Error while deducing the numeric code assignment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeduceError {
    #[error("numeric opcode {code} out of range (expected 0..{CODE_COUNT})")]
    CodeOutOfRange { code: usize },

    #[error("sample for code {code} matches no opcode; samples are contradictory")]
    NoCandidate { code: usize },

    #[error("samples leave code {code} ambiguous ({candidates} candidates remain)")]
    Ambiguous { code: usize, candidates: usize },

    #[error("destination register {register} invalid for sample register file of {register_count}")]
    BadSample {
        register: usize,
        register_count: usize,
    },
}

/// All opcodes whose evaluation maps the sample's `before` registers to
/// its `after` registers.
///
/// Register-form operands that fall outside the sample's register file
/// disqualify an opcode rather than erroring: the sample simply cannot
/// have been produced by it.
pub fn matching_opcodes(sample: &Sample) -> Vec<Opcode> {
    Opcode::ALL
        .into_iter()
        .filter(|&op| opcode_matches(sample, op))
        .collect()
}

fn opcode_matches(sample: &Sample, opcode: Opcode) -> bool {
    let inst = sample.instr.with_opcode(opcode);
    let count = sample.before.len();

    if inst.c >= count {
        return false;
    }
    let (kind_a, kind_b) = opcode.operand_kinds();
    for (kind, value) in [(kind_a, inst.a), (kind_b, inst.b)] {
        if kind == crate::isa::OperandKind::Register && !(0..count as i64).contains(&value) {
            return false;
        }
    }

    inst.eval(&sample.before) == sample.after
}

/// Count the samples that behave like at least three opcodes.
pub fn count_ambiguous(samples: &[Sample]) -> usize {
    samples
        .iter()
        .filter(|s| matching_opcodes(s).len() >= 3)
        .count()
}

/// A resolved assignment of numeric codes to opcodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpcodeTable {
    codes: [Opcode; CODE_COUNT],
}

impl OpcodeTable {
    /// Look up the opcode assigned to a numeric code.
    pub fn opcode(&self, code: usize) -> Result<Opcode, DeduceError> {
        self.codes
            .get(code)
            .copied()
            .ok_or(DeduceError::CodeOutOfRange { code })
    }

    /// Decode a raw program into executable instructions.
    pub fn decode(&self, raw: &[RawInstruction]) -> Result<Vec<Instruction>, DeduceError> {
        raw.iter()
            .map(|r| Ok(r.with_opcode(self.opcode(r.code)?)))
            .collect()
    }
}

/// Deduce the code-to-opcode assignment from observed samples.
///
/// Each sample narrows its code's candidate set to the opcodes that
/// reproduce it; codes with a single candidate are then fixed and
/// eliminated from the other sets until all 16 are assigned.
pub fn deduce_mapping(samples: &[Sample]) -> Result<OpcodeTable, DeduceError> {
    // candidates[code] is a bitmask over Opcode::ALL positions.
    let mut candidates = [u16::MAX; CODE_COUNT];

    for sample in samples {
        let code = sample.instr.code;
        if code >= CODE_COUNT {
            return Err(DeduceError::CodeOutOfRange { code });
        }

        let mut mask = 0u16;
        for (bit, &op) in Opcode::ALL.iter().enumerate() {
            if opcode_matches(sample, op) {
                mask |= 1 << bit;
            }
        }

        candidates[code] &= mask;
        if candidates[code] == 0 {
            return Err(DeduceError::NoCandidate { code });
        }
    }

    // Constraint propagation: a code with one candidate claims that
    // opcode and removes it from every other set.
    let mut assigned: [Option<Opcode>; CODE_COUNT] = [None; CODE_COUNT];
    loop {
        let Some(code) = (0..CODE_COUNT)
            .find(|&c| assigned[c].is_none() && candidates[c].count_ones() == 1)
        else {
            break;
        };

        let bit = candidates[code].trailing_zeros() as usize;
        assigned[code] = Some(Opcode::ALL[bit]);

        for (other, cand) in candidates.iter_mut().enumerate() {
            if other != code {
                *cand &= !(1 << bit);
                if *cand == 0 && assigned[other].is_none() {
                    return Err(DeduceError::NoCandidate { code: other });
                }
            }
        }
    }

    let mut codes = [Opcode::Addr; CODE_COUNT];
    for (code, slot) in assigned.into_iter().enumerate() {
        codes[code] = slot.ok_or(DeduceError::Ambiguous {
            code,
            candidates: candidates[code].count_ones() as usize,
        })?;
    }

    Ok(OpcodeTable { codes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::{run, Program};

    fn regs(vals: &[i64]) -> RegisterFile {
        RegisterFile::from_slice(vals)
    }

    /// The literal sample from the puzzle text.
    fn classic_sample() -> Sample {
        Sample {
            before: regs(&[3, 2, 1, 1]),
            instr: RawInstruction {
                code: 9,
                a: 2,
                b: 1,
                c: 2,
            },
            after: regs(&[3, 2, 2, 1]),
        }
    }

    #[test]
    fn test_classic_sample_matches_three_opcodes() {
        let matches = matching_opcodes(&classic_sample());
        assert_eq!(matches, vec![Opcode::Addi, Opcode::Mulr, Opcode::Seti]);
    }

    #[test]
    fn test_count_ambiguous() {
        // 5 + 3 = 8 is reproduced by addr alone: every other opcode's
        // result over these operands differs.
        let unambiguous = Sample {
            before: regs(&[5, 3, 0, 0]),
            instr: RawInstruction {
                code: 0,
                a: 0,
                b: 1,
                c: 2,
            },
            after: regs(&[5, 3, 8, 0]),
        };
        assert_eq!(matching_opcodes(&unambiguous), vec![Opcode::Addr]);

        let samples = vec![classic_sample(), unambiguous];
        assert_eq!(count_ambiguous(&samples), 1);
    }

    /// Build a sample that pins `code` to exactly `op` by choosing
    /// operands whose result is unique to that opcode.
    fn pinning_samples(code: usize, op: Opcode) -> Vec<Sample> {
        // Replay the opcode over operand sets chosen so that no two
        // opcodes agree on all of them; together the samples eliminate
        // every other candidate.
        let cases: [(&[i64], i64, i64); 6] = [
            (&[7, 3, 0, 0], 0, 1),
            (&[2, 5, 1, 9], 1, 0),
            (&[0, -4, 6, 2], 2, 1),
            (&[4, 9, 0, 0], 0, 1),
            (&[1, 7, 0, 0], 0, 1),
            (&[5, 5, 0, 0], 0, 1),
        ];
        cases
            .into_iter()
            .map(|(before, a, b)| {
                let before = regs(before);
                let instr = RawInstruction { code, a, b, c: 3 };
                let after = instr.with_opcode(op).eval(&before);
                Sample {
                    before,
                    instr,
                    after,
                }
            })
            .collect()
    }

    #[test]
    fn test_deduce_full_mapping() {
        // Assign code i to opcode ALL[15 - i] and generate enough samples
        // to make every assignment unambiguous.
        let mut samples = Vec::new();
        for (code, &op) in Opcode::ALL.iter().rev().enumerate() {
            samples.extend(pinning_samples(code, op));
        }

        let table = deduce_mapping(&samples).expect("mapping should resolve");
        for (code, &op) in Opcode::ALL.iter().rev().enumerate() {
            assert_eq!(table.opcode(code).unwrap(), op, "code {}", code);
        }
    }

    #[test]
    fn test_deduce_ambiguous_without_samples() {
        assert!(matches!(
            deduce_mapping(&[]),
            Err(DeduceError::Ambiguous { .. })
        ));
    }

    #[test]
    fn test_deduce_contradictory_samples() {
        // A sample whose after-state no opcode can produce.
        let sample = Sample {
            before: regs(&[0, 0, 0, 0]),
            instr: RawInstruction {
                code: 3,
                a: 0,
                b: 0,
                c: 0,
            },
            after: regs(&[123, 0, 0, 0]),
        };
        assert_eq!(
            deduce_mapping(&[sample]),
            Err(DeduceError::NoCandidate { code: 3 })
        );
    }

    #[test]
    fn test_code_out_of_range() {
        let mut sample = classic_sample();
        sample.instr.code = 16;
        assert_eq!(
            deduce_mapping(&[sample]),
            Err(DeduceError::CodeOutOfRange { code: 16 })
        );
    }

    #[test]
    fn test_decode_and_run() {
        let mut samples = Vec::new();
        for (code, &op) in Opcode::ALL.iter().enumerate() {
            samples.extend(pinning_samples(code, op));
        }
        let table = deduce_mapping(&samples).unwrap();

        // seti 5 -> r1; addi r1+2 -> r0 (codes follow ALL order: seti is
        // code 9, addi is code 1).
        let raw = [
            RawInstruction {
                code: 9,
                a: 5,
                b: 0,
                c: 1,
            },
            RawInstruction {
                code: 1,
                a: 1,
                b: 2,
                c: 0,
            },
        ];
        let decoded = table.decode(&raw).unwrap();
        let program = Program::new(decoded, None);
        let finals = run(&program, RegisterFile::zeroed(4)).unwrap();
        assert_eq!(finals[0], 7);
        assert_eq!(finals[1], 5);
    }
}
