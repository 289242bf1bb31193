//! File-based driver for the Functasy interpreter.
//!
//! Runs a program against an input file, writes the program's output bytes to
//! stdout, and optionally saves or resumes engine snapshots around the tick
//! budget. Exit code 0 means the program finished, 2 means the budget ran out
//! and 1 means anything went wrong.

use std::env;
use std::fs;
use std::io::Write;
use std::process::ExitCode;

use functasy::{ByteIo, Engine, RunOutcome};

const DEFAULT_TICKS: u64 = 100_000;

const USAGE: &str = "\
Usage: functasy [OPTIONS] <src-file> [input-file]
       functasy [OPTIONS] --resume <state-file> [input-file]

Options:
  --ticks <N>        Tick budget, 0 for unlimited (default 100000)
  --sequential       Read input bits without presence padding
  --snapshot <FILE>  Save the engine state to FILE if the budget runs out
  --resume <FILE>    Resume from a saved engine state instead of parsing
  -h, --help         Print this help
";

struct Args {
    src: Option<String>,
    input: Option<String>,
    ticks: u64,
    sequential: bool,
    snapshot: Option<String>,
    resume: Option<String>,
}

fn parse_args() -> Result<Args, String> {
    let mut args = env::args().skip(1);
    let mut positional = Vec::new();
    let mut ticks = DEFAULT_TICKS;
    let mut sequential = false;
    let mut snapshot = None;
    let mut resume = None;

    let value_of = |args: &mut dyn Iterator<Item = String>, opt: &str| {
        args.next().ok_or_else(|| format!("{opt} needs a value"))
    };

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--ticks" => {
                let value = value_of(&mut args, "--ticks")?;
                ticks = value
                    .parse()
                    .map_err(|_| format!("invalid tick count: {value}"))?;
            }
            "--sequential" => sequential = true,
            "--snapshot" => snapshot = Some(value_of(&mut args, "--snapshot")?),
            "--resume" => resume = Some(value_of(&mut args, "--resume")?),
            "-h" | "--help" => {
                print!("{USAGE}");
                std::process::exit(0);
            }
            _ if arg.starts_with('-') => return Err(format!("unknown option: {arg}")),
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    let src = if resume.is_some() {
        None
    } else {
        Some(positional.next().ok_or("missing source file")?)
    };
    let input = positional.next();
    if let Some(extra) = positional.next() {
        return Err(format!("unexpected argument: {extra}"));
    }

    Ok(Args {
        src,
        input,
        ticks,
        sequential,
        snapshot,
        resume,
    })
}

fn run(args: &Args) -> Result<ExitCode, String> {
    let mut engine = if let Some(path) = &args.resume {
        let bytes =
            fs::read(path).map_err(|err| format!("cannot read {path}: {err}"))?;
        Engine::load(&bytes).map_err(|err| format!("cannot load {path}: {err}"))?
    } else {
        let path = args.src.as_deref().unwrap_or_default();
        let src = fs::read_to_string(path)
            .map_err(|err| format!("cannot read {path}: {err}"))?;
        Engine::new(&src).map_err(|err| format!("\n{err}"))?
    };

    let input = match &args.input {
        Some(path) => fs::read(path).map_err(|err| format!("cannot read {path}: {err}"))?,
        None => Vec::new(),
    };

    let budget = (args.ticks != 0).then_some(args.ticks);
    let mut io = ByteIo::new(input, !args.sequential);
    let outcome = engine.run(&mut io, budget);

    std::io::stdout()
        .write_all(&io.into_output())
        .map_err(|err| format!("cannot write output: {err}"))?;

    match outcome {
        RunOutcome::Complete => Ok(ExitCode::SUCCESS),
        RunOutcome::BudgetExceeded => {
            if let Some(path) = &args.snapshot {
                fs::write(path, engine.save())
                    .map_err(|err| format!("cannot write {path}: {err}"))?;
                eprintln!("functasy: budget exceeded, state saved to {path}");
            } else {
                eprintln!("functasy: budget exceeded after {} ticks", args.ticks);
            }
            Ok(ExitCode::from(2))
        }
    }
}

fn main() -> ExitCode {
    let args = match parse_args() {
        Ok(args) => args,
        Err(err) => {
            eprintln!("functasy: {err}");
            eprint!("{USAGE}");
            return ExitCode::FAILURE;
        }
    };

    match run(&args) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("functasy: {err}");
            ExitCode::FAILURE
        }
    }
}
