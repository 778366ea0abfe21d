//! chronal-vm: interpreter for the chronal wrist-device register machine

use std::env;
use std::fs;

use anyhow::{bail, Context};

use chronal_vm::machine::{Machine, Outcome, Program, RegisterFile};
use chronal_vm::parser::{parse_device_dump, parse_program};
use chronal_vm::samples::{count_ambiguous, deduce_mapping};

const USAGE: &str = "\
Usage:
  chronal-vm <program.txt> [options]     run a program listing
  chronal-vm --samples <dump.txt>        identify opcodes from a device dump

Options:
  --registers N     size of the register file (default 6)
  --reg I=V         preset register I to V (repeatable)
  --limit STEPS     stop after STEPS steps instead of running to halt
  --trace           print pc, instruction, and registers each step
";

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() || args.iter().any(|a| a == "--help" || a == "-h") {
        print!("{}", USAGE);
        return Ok(());
    }

    // Parse options
    let mut path = None;
    let mut samples_mode = false;
    let mut register_count = 6usize;
    let mut presets: Vec<(usize, i64)> = Vec::new();
    let mut limit: Option<u64> = None;
    let mut trace = false;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--samples" => samples_mode = true,
            "--trace" => trace = true,
            "--registers" => {
                let value = iter.next().context("--registers needs a value")?;
                register_count = value.parse().context("--registers needs an integer")?;
            }
            "--limit" => {
                let value = iter.next().context("--limit needs a value")?;
                limit = Some(value.parse().context("--limit needs an integer")?);
            }
            "--reg" => {
                let value = iter.next().context("--reg needs I=V")?;
                let (idx, val) = value
                    .split_once('=')
                    .context("--reg needs the form I=V")?;
                presets.push((
                    idx.parse().context("--reg index must be an integer")?,
                    val.parse().context("--reg value must be an integer")?,
                ));
            }
            other if other.starts_with('-') => bail!("unknown option: {}", other),
            other => path = Some(other.to_string()),
        }
    }

    let path = path.context("no input file given (see --help)")?;
    let text = fs::read_to_string(&path).with_context(|| format!("reading {}", path))?;

    if samples_mode {
        run_samples(&text)
    } else {
        run_listing(&text, register_count, &presets, limit, trace)
    }
}

/// Run a program listing and print the final register file.
fn run_listing(
    text: &str,
    register_count: usize,
    presets: &[(usize, i64)],
    limit: Option<u64>,
    trace: bool,
) -> anyhow::Result<()> {
    let program = parse_program(text)?;

    let mut regs = RegisterFile::zeroed(register_count);
    for &(idx, val) in presets {
        if idx >= register_count {
            bail!("--reg {}={} out of range for {} registers", idx, val, register_count);
        }
        regs[idx] = val;
    }

    let mut machine = Machine::new(&program, regs)?;

    if let Some(ip) = program.ip_register {
        log::debug!("instruction pointer bound to register {}", ip);
    }

    let outcome = if trace {
        run_traced(&mut machine, limit)
    } else {
        match limit {
            Some(max) => machine.run_bounded(max),
            None => {
                machine.run();
                Outcome::Halted
            }
        }
    };

    match outcome {
        Outcome::Halted => println!(
            "halted after {} steps: {}",
            machine.steps(),
            machine.registers()
        ),
        Outcome::StepLimit => println!(
            "step limit reached after {} steps: {}",
            machine.steps(),
            machine.registers()
        ),
    }

    Ok(())
}

/// Step the machine by hand, printing each instruction as it executes.
fn run_traced(machine: &mut Machine<'_>, limit: Option<u64>) -> Outcome {
    loop {
        if let Some(max) = limit {
            if machine.steps() >= max {
                return Outcome::StepLimit;
            }
        }
        let Some(inst) = machine.current_instruction() else {
            return Outcome::Halted;
        };
        println!("{:4}  {:16} {}", machine.pc(), inst.to_string(), machine.registers());
        machine.step();
    }
}

/// The device-dump workflow: count ambiguous samples, deduce the opcode
/// table, and run the numeric program from zeroed registers.
fn run_samples(text: &str) -> anyhow::Result<()> {
    let (samples, raw_program) = parse_device_dump(text)?;
    println!("{} samples", samples.len());
    println!(
        "{} samples behave like three or more opcodes",
        count_ambiguous(&samples)
    );

    let table = deduce_mapping(&samples).context("deducing opcode assignment")?;
    log::debug!("opcode table: {:?}", table);

    if raw_program.is_empty() {
        println!("no program section in dump");
        return Ok(());
    }

    let instructions = table.decode(&raw_program)?;
    let register_count = samples
        .first()
        .map(|s| s.before.len())
        .context("dump has no samples")?;

    let program = Program::new(instructions, None);
    let finals = chronal_vm::machine::run(&program, RegisterFile::zeroed(register_count))?;
    println!("program halted: {}", finals);

    Ok(())
}
