//! Text formats for chronal programs.
//!
//! Two input shapes appear in the wild:
//!
//! - **Program listings**: an optional `#ip N` directive binding register
//!   N to the instruction pointer, then one instruction per line as
//!   whitespace-separated `<mnemonic> <A> <B> <C>` tokens.
//! - **Device dumps**: observed samples (`Before: [..]` / numeric
//!   instruction / `After: [..]` blocks) followed, after a blank gap, by
//!   a program whose opcodes are numeric codes that still need to be
//!   identified (see [`crate::samples`]).
//!
//! Parsing produces the core's input types; the engine never sees text.

use std::num::ParseIntError;

use thiserror::Error;

use crate::isa::{Instruction, Opcode};
use crate::machine::{Program, RegisterFile};
use crate::samples::{RawInstruction, Sample};

/// Error while parsing program text. Line numbers are 1-based.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("line {line}: unknown opcode mnemonic {mnemonic:?}")]
    UnknownOpcode { line: usize, mnemonic: String },

    #[error("line {line}: expected `<opcode> <A> <B> <C>`, got {text:?}")]
    MalformedInstruction { line: usize, text: String },

    #[error("line {line}: malformed `#ip` directive: {text:?}")]
    MalformedDirective { line: usize, text: String },

    #[error("line {line}: malformed sample line: {text:?}")]
    MalformedSample { line: usize, text: String },

    #[error("line {line}: bad integer {token:?}")]
    BadInteger {
        line: usize,
        token: String,
        #[source]
        source: ParseIntError,
    },
}

fn parse_int<T>(line: usize, token: &str) -> Result<T, ParseError>
where
    T: std::str::FromStr<Err = ParseIntError>,
{
    token.parse().map_err(|source| ParseError::BadInteger {
        line,
        token: token.to_string(),
        source,
    })
}

/// Parse a program listing into a [`Program`].
///
/// Blank lines are skipped. A `#ip N` directive may appear on the first
/// non-blank line; anywhere later it is malformed.
pub fn parse_program(text: &str) -> Result<Program, ParseError> {
    let mut instructions = Vec::new();
    let mut ip_register = None;

    for (idx, raw) in text.lines().enumerate() {
        let line = idx + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(rest) = trimmed.strip_prefix("#ip") {
            if !instructions.is_empty() || ip_register.is_some() {
                return Err(ParseError::MalformedDirective {
                    line,
                    text: trimmed.to_string(),
                });
            }
            ip_register = Some(parse_int(line, rest.trim())?);
            continue;
        }

        instructions.push(parse_instruction(line, trimmed)?);
    }

    Ok(Program::new(instructions, ip_register))
}

/// Parse one `<mnemonic> <A> <B> <C>` line.
fn parse_instruction(line: usize, text: &str) -> Result<Instruction, ParseError> {
    let mut tokens = text.split_whitespace();
    let (Some(mnemonic), Some(a), Some(b), Some(c), None) = (
        tokens.next(),
        tokens.next(),
        tokens.next(),
        tokens.next(),
        tokens.next(),
    ) else {
        return Err(ParseError::MalformedInstruction {
            line,
            text: text.to_string(),
        });
    };

    let opcode: Opcode = mnemonic.parse().map_err(|_| ParseError::UnknownOpcode {
        line,
        mnemonic: mnemonic.to_string(),
    })?;

    Ok(Instruction::new(
        opcode,
        parse_int(line, a)?,
        parse_int(line, b)?,
        parse_int(line, c)?,
    ))
}

/// Parse a `<code> <A> <B> <C>` line with a numeric opcode.
fn parse_raw_instruction(line: usize, text: &str) -> Result<RawInstruction, ParseError> {
    let mut tokens = text.split_whitespace();
    let (Some(code), Some(a), Some(b), Some(c), None) = (
        tokens.next(),
        tokens.next(),
        tokens.next(),
        tokens.next(),
        tokens.next(),
    ) else {
        return Err(ParseError::MalformedInstruction {
            line,
            text: text.to_string(),
        });
    };

    Ok(RawInstruction {
        code: parse_int(line, code)?,
        a: parse_int(line, a)?,
        b: parse_int(line, b)?,
        c: parse_int(line, c)?,
    })
}

/// Parse a numeric-coded program, one instruction per line.
pub fn parse_raw_program(text: &str) -> Result<Vec<RawInstruction>, ParseError> {
    text.lines()
        .enumerate()
        .filter(|(_, raw)| !raw.trim().is_empty())
        .map(|(idx, raw)| parse_raw_instruction(idx + 1, raw.trim()))
        .collect()
}

/// Parse a `Before: [3, 2, 1, 1]` / `After: [...]` register line.
fn parse_register_line(line: usize, text: &str, prefix: &str) -> Result<RegisterFile, ParseError> {
    let malformed = || ParseError::MalformedSample {
        line,
        text: text.to_string(),
    };

    let rest = text.strip_prefix(prefix).ok_or_else(malformed)?;
    let inner = rest
        .trim()
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(malformed)?;

    let values = inner
        .split(',')
        .map(|tok| parse_int(line, tok.trim()))
        .collect::<Result<Vec<i64>, _>>()?;

    Ok(RegisterFile::from_slice(&values))
}

/// Parse a sequence of observed samples.
///
/// Each sample is three consecutive non-blank lines: `Before: [..]`, a
/// numeric instruction, `After: [..]`.
pub fn parse_samples(text: &str) -> Result<Vec<Sample>, ParseError> {
    let numbered: Vec<(usize, &str)> = text
        .lines()
        .enumerate()
        .map(|(idx, raw)| (idx + 1, raw.trim()))
        .filter(|(_, l)| !l.is_empty())
        .collect();

    let mut samples = Vec::new();
    for chunk in numbered.chunks(3) {
        let [(l1, before), (l2, instr), (l3, after)] = chunk else {
            let (line, text) = chunk[0];
            return Err(ParseError::MalformedSample {
                line,
                text: text.to_string(),
            });
        };

        samples.push(Sample {
            before: parse_register_line(*l1, before, "Before:")?,
            instr: parse_raw_instruction(*l2, instr)?,
            after: parse_register_line(*l3, after, "After:")?,
        });
    }

    Ok(samples)
}

/// Parse a full device dump: samples, then (after a blank gap) a
/// numeric-coded program. The program part may be absent.
pub fn parse_device_dump(text: &str) -> Result<(Vec<Sample>, Vec<RawInstruction>), ParseError> {
    // Samples end at the first blank gap of two or more lines.
    match text.split_once("\n\n\n") {
        Some((sample_text, program_text)) => Ok((
            parse_samples(sample_text)?,
            parse_raw_program(program_text)?,
        )),
        None => Ok((parse_samples(text)?, Vec::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = "\
#ip 0
seti 5 0 1
seti 6 0 2
addi 0 1 0
addr 1 2 3
setr 1 0 0
seti 8 0 4
seti 9 0 5
";

    #[test]
    fn test_parse_listing_with_directive() {
        let program = parse_program(EXAMPLE).unwrap();
        assert_eq!(program.ip_register, Some(0));
        assert_eq!(program.len(), 7);
        assert_eq!(program.instructions[0].to_string(), "seti 5 0 1");
        assert_eq!(program.instructions[3].to_string(), "addr 1 2 3");
    }

    #[test]
    fn test_parse_listing_without_directive() {
        let program = parse_program("addi 0 1 0\nmuli 0 2 1\n").unwrap();
        assert_eq!(program.ip_register, None);
        assert_eq!(program.len(), 2);
    }

    #[test]
    fn test_negative_immediates() {
        let program = parse_program("seti -3 -1 0\n").unwrap();
        assert_eq!(program.instructions[0].a, -3);
        assert_eq!(program.instructions[0].b, -1);
    }

    #[test]
    fn test_unknown_mnemonic() {
        let err = parse_program("seti 1 0 0\nhalt 0 0 0\n").unwrap_err();
        assert!(matches!(
            err,
            ParseError::UnknownOpcode { line: 2, ref mnemonic } if mnemonic == "halt"
        ));
    }

    #[test]
    fn test_malformed_instruction() {
        assert!(matches!(
            parse_program("seti 1 0\n").unwrap_err(),
            ParseError::MalformedInstruction { line: 1, .. }
        ));
        assert!(matches!(
            parse_program("seti 1 0 0 0\n").unwrap_err(),
            ParseError::MalformedInstruction { line: 1, .. }
        ));
    }

    #[test]
    fn test_late_directive_rejected() {
        let err = parse_program("seti 1 0 0\n#ip 2\n").unwrap_err();
        assert!(matches!(err, ParseError::MalformedDirective { line: 2, .. }));
    }

    #[test]
    fn test_parse_samples() {
        let text = "\
Before: [3, 2, 1, 1]
9 2 1 2
After:  [3, 2, 2, 1]

Before: [0, 0, 0, 0]
5 0 2 1
After:  [0, 2, 0, 0]
";
        let samples = parse_samples(text).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].before.as_slice(), &[3, 2, 1, 1]);
        assert_eq!(samples[0].instr.code, 9);
        assert_eq!(samples[0].after.as_slice(), &[3, 2, 2, 1]);
        assert_eq!(samples[1].instr.a, 0);
    }

    #[test]
    fn test_truncated_sample() {
        let text = "Before: [1, 2, 3, 4]\n9 2 1 2\n";
        assert!(matches!(
            parse_samples(text).unwrap_err(),
            ParseError::MalformedSample { .. }
        ));
    }

    #[test]
    fn test_parse_device_dump() {
        let text = "\
Before: [3, 2, 1, 1]
9 2 1 2
After:  [3, 2, 2, 1]


9 0 0 3
9 3 2 1
";
        let (samples, program) = parse_device_dump(text).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(program.len(), 2);
        assert_eq!(program[1].c, 1);
    }
}
